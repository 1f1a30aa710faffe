use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use turnloop_model::{ErrorKind, ModelFragment, ModelResponse};
use turnloop_sse::{Error as SseError, Sse};

use crate::Error;
use crate::proto::{self, ChatCompletionChunk};

struct PartialState {
    sse: Sse,
    id: Option<String>,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextFragment = Result<(Option<ModelFragment>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_fragment_fut: Option<PinnedFuture<NextFragment>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState { sse, id: None };
        let next_fragment_fut =
            async move { next_fragment(partial_state).await };
        Self {
            next_fragment_fut: Some(Box::pin(next_fragment_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelFragment>, Self::Error>> {
        let this = self.project();
        let Some(next_fragment_fut) = this.next_fragment_fut else {
            // The stream has been exhausted.
            return Poll::Ready(Ok(None));
        };
        let (fragment, partial_state) =
            match ready!(next_fragment_fut.as_mut().poll(cx)) {
                Ok((Some(fragment), partial_state)) => (fragment, partial_state),
                Ok((None, _)) => {
                    *this.next_fragment_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_fragment_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next fragment.
        let next_fragment_fut =
            async move { next_fragment(partial_state).await };
        *this.next_fragment_fut = Some(Box::pin(next_fragment_fut));

        Poll::Ready(Ok(Some(fragment)))
    }
}

async fn next_fragment(
    mut partial_state: PartialState,
) -> Result<(Option<ModelFragment>, PartialState), Error> {
    loop {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event.data,
            Ok(None) => break,
            Err(err @ SseError::ChunksError(_)) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Transport));
            }
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Protocol));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            break;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Protocol))?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Protocol));
        };

        // Usage-only chunks carry no choices.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };
        if let Some(fragment) = proto::create_fragment(choice) {
            return Ok((Some(fragment), partial_state));
        }
    }

    Ok((None, partial_state))
}
