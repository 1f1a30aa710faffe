use std::fmt::{self, Display};

use super::{Chunks, ChunksError};

/// Errors produced while reading events.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The underlying body failed.
    ChunksError(ChunksError),
    /// The stream is not a valid event stream.
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(err) => write!(f, "{err}"),
            Error::InvalidPayload => write!(f, "invalid event stream payload"),
        }
    }
}

impl std::error::Error for Error {}

/// A dispatched server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Event {
    /// The event type, if the server named one.
    pub event: Option<String>,
    /// The last event id seen in this event.
    pub id: Option<String>,
    /// The data lines of the event, joined by line feeds.
    pub data: String,
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    chunks: Chunks,
}

impl Sse {
    /// Creates a reader on top of `chunks`.
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            chunks,
        }
    }

    /// Reads the next event that carries data.
    ///
    /// Returns `Ok(None)` when the stream ends. Data left in the buffer
    /// without a terminating blank line is discarded.
    pub async fn next_event(&mut self) -> Result<Option<Event>, Error> {
        loop {
            // Drain complete events already buffered before reading more.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            let Ok(s) = std::str::from_utf8(&bytes) else {
                return Err(Error::InvalidPayload);
            };
            if s.contains('\r') {
                self.buf.push_str(&s.replace("\r\n", "\n"));
            } else {
                self.buf.push_str(s);
            }
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<Event>, Error> {
        // For `end-of-line`, carriage returns are normalized away when
        // the chunk is buffered.
        //
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        while let Some(eol_idx) = self.buf.find("\n\n") {
            let block: String = self.buf.drain(0..eol_idx + 2).collect();

            let mut event = Event::default();
            let mut has_data = false;
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (name, value) = match line.split_once(':') {
                    Some((name, value)) => {
                        (name, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                match name {
                    "data" => {
                        if has_data {
                            event.data.push('\n');
                        }
                        event.data.push_str(value);
                        has_data = true;
                    }
                    "event" => event.event = Some(value.to_owned()),
                    "id" => event.id = Some(value.to_owned()),
                    "retry" => {}
                    _ => return Err(Error::InvalidPayload),
                }
            }

            // Blocks with comments only are keep-alives.
            if has_data {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}
