use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use futures_util::{Stream, stream};
use tracing::Instrument;
use turnloop_model::{
    AssistantTurn, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse,
};

use crate::Error;
use crate::stage::ContentSink;
use crate::stream::{FragmentResult, reconstruct};

type BoxedFragmentStream = Pin<Box<dyn Stream<Item = FragmentResult> + Send>>;
type OpenResult = Result<BoxedFragmentStream, Box<dyn ModelProviderError>>;
type BoxedOpenFuture = Pin<Box<dyn Future<Output = OpenResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest, RetryPolicy) -> BoxedOpenFuture + Send + Sync>;

/// Controls how opening a model response is retried.
///
/// Only errors whose kind is retryable (rate limits and transport
/// failures) are retried. Once a response has started streaming, errors
/// are never retried since text may already have been shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The delay before the first retry.
    pub initial_interval: Duration,
    /// The upper bound of a single delay.
    pub max_interval: Duration,
    /// Gives up once this much time has passed since the first attempt.
    pub max_elapsed_time: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[inline]
    pub fn disabled() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            max_elapsed_time: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(Some(self.max_elapsed_time))
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Duration::from_secs(60),
        }
    }
}

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    /// Wraps the provider with the default retry policy.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let provider = Arc::new(provider);
        let handler_fn: HandlerFn = Arc::new(move |req, retry_policy| {
            let provider = Arc::clone(&provider);
            Box::pin(
                async move {
                    trace!("got a request: {req:?}");
                    let resp =
                        open_response(&*provider, &req, retry_policy).await?;
                    trace!("start receiving fragments");
                    Ok(into_fragment_stream(resp))
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sends a request and reconstructs the complete assistant turn.
    ///
    /// Text is written into `sink` while the response is streaming.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// fragments when this operation is cancelled.
    pub async fn send_request<S: ContentSink + ?Sized>(
        &self,
        req: ModelRequest,
        sink: &S,
    ) -> Result<AssistantTurn, Error> {
        let fragments = (self.handler_fn)(req, self.retry_policy)
            .await
            .map_err(Error::Model)?;
        let turn = reconstruct(fragments, sink).await?;
        trace!("finished a request");
        Ok(turn)
    }
}

async fn open_response<P: ModelProvider>(
    provider: &P,
    req: &ModelRequest,
    retry_policy: RetryPolicy,
) -> Result<P::Response, Box<dyn ModelProviderError>> {
    backoff::future::retry(retry_policy.backoff(), || {
        let fut = provider.send_request(req);
        async move {
            fut.await.map_err(|err| {
                let kind = err.kind();
                let err: Box<dyn ModelProviderError> = Box::new(err);
                if kind.is_retryable() {
                    warn!("model request failed, retrying: {err}");
                    backoff::Error::transient(err)
                } else {
                    error!("got an error: {err}");
                    backoff::Error::permanent(err)
                }
            })
        }
    })
    .await
}

fn into_fragment_stream<R: ModelResponse>(resp: R) -> BoxedFragmentStream {
    let mut resp = Box::pin(resp);
    Box::pin(stream::poll_fn(move |cx| {
        resp.as_mut().poll_next_fragment(cx).map(|res| match res {
            Ok(fragment) => fragment.map(Ok),
            Err(err) => Some(Err(Box::new(err) as Box<dyn ModelProviderError>)),
        })
    }))
}
