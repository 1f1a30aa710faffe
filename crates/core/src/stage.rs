//! Progress surfaces that receive streamed output.
//!
//! A [`Progress`] is owned by the caller of an agent turn. The agent writes
//! the assistant text into it as soon as it arrives, and opens one labeled
//! [`Segment`] per dispatched tool call. Every operation is best effort and
//! must not fail the turn.

use std::sync::{Arc, Mutex, PoisonError};

use turnloop_model::Attachment;

/// Something that streamed text and attachments can be written into.
pub trait ContentSink: Send + Sync {
    /// Appends a piece of text.
    fn append_text(&self, text: &str);

    /// Adds an attachment. The default implementation discards it.
    fn add_attachment(&self, attachment: &Attachment) {
        let _ = attachment;
    }
}

/// A labeled sub-region of the progress surface, dedicated to one tool
/// call.
pub trait Segment: ContentSink {
    /// Marks the segment as finished. Calling it more than once is allowed.
    fn close(&self);
}

/// The top-level progress surface of a conversation turn.
pub trait Progress: ContentSink {
    /// Opens a new segment with the given label.
    fn open_segment(&self, label: &str) -> Arc<dyn Segment>;
}

/// A progress surface that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgress;

impl ContentSink for NoopProgress {
    #[inline]
    fn append_text(&self, _text: &str) {}
}

impl Segment for NoopProgress {
    #[inline]
    fn close(&self) {}
}

impl Progress for NoopProgress {
    #[inline]
    fn open_segment(&self, _label: &str) -> Arc<dyn Segment> {
        Arc::new(NoopProgress)
    }
}

/// A snapshot of a segment recorded by [`MemoryProgress`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentRecord {
    /// The label the segment was opened with.
    pub label: String,
    /// All text appended to the segment.
    pub text: String,
    /// All attachments added to the segment.
    pub attachments: Vec<Attachment>,
    /// Whether the segment has been closed.
    pub closed: bool,
}

#[derive(Default)]
struct Record {
    text: String,
    attachments: Vec<Attachment>,
    segments: Vec<SegmentRecord>,
}

/// A progress surface that keeps everything in memory.
///
/// Clones share the same record, which makes it handy for inspecting the
/// output after a turn, or for collecting the output of a nested model.
#[derive(Clone, Default)]
pub struct MemoryProgress {
    record: Arc<Mutex<Record>>,
}

impl MemoryProgress {
    /// Creates an empty progress surface.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the top-level text written so far.
    pub fn text(&self) -> String {
        self.with_record(|record| record.text.clone())
    }

    /// Returns the top-level attachments added so far.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.with_record(|record| record.attachments.clone())
    }

    /// Returns the segments opened so far, in opening order.
    pub fn segments(&self) -> Vec<SegmentRecord> {
        self.with_record(|record| record.segments.clone())
    }

    fn with_record<R>(&self, f: impl FnOnce(&mut Record) -> R) -> R {
        let mut record =
            self.record.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut record)
    }
}

impl ContentSink for MemoryProgress {
    fn append_text(&self, text: &str) {
        self.with_record(|record| record.text.push_str(text));
    }

    fn add_attachment(&self, attachment: &Attachment) {
        self.with_record(|record| record.attachments.push(attachment.clone()));
    }
}

impl Progress for MemoryProgress {
    fn open_segment(&self, label: &str) -> Arc<dyn Segment> {
        let idx = self.with_record(|record| {
            record.segments.push(SegmentRecord {
                label: label.to_owned(),
                ..Default::default()
            });
            record.segments.len() - 1
        });
        Arc::new(MemorySegment {
            progress: self.clone(),
            idx,
        })
    }
}

struct MemorySegment {
    progress: MemoryProgress,
    idx: usize,
}

impl MemorySegment {
    fn with_segment(&self, f: impl FnOnce(&mut SegmentRecord)) {
        self.progress.with_record(|record| {
            if let Some(segment) = record.segments.get_mut(self.idx) {
                f(segment);
            }
        });
    }
}

impl ContentSink for MemorySegment {
    fn append_text(&self, text: &str) {
        self.with_segment(|segment| segment.text.push_str(text));
    }

    fn add_attachment(&self, attachment: &Attachment) {
        self.with_segment(|segment| {
            segment.attachments.push(attachment.clone())
        });
    }
}

impl Segment for MemorySegment {
    fn close(&self) {
        self.with_segment(|segment| segment.closed = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_progress() {
        let progress = MemoryProgress::new();
        progress.append_text("Hello, ");
        let first = progress.open_segment("calc");
        let second = progress.open_segment("clock");
        progress.append_text("world!");
        second.append_text("12:00");
        first.append_text("4");
        first.add_attachment(&Attachment {
            mime_type: Some("image/png".to_owned()),
            title: None,
            url: Some("https://example.com/plot.png".to_owned()),
        });
        first.close();
        first.close();

        assert_eq!(progress.text(), "Hello, world!");
        let segments = progress.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].label, "calc");
        assert_eq!(segments[0].text, "4");
        assert_eq!(segments[0].attachments.len(), 1);
        assert!(segments[0].closed);
        assert_eq!(segments[1].text, "12:00");
        assert!(!segments[1].closed);
    }
}
