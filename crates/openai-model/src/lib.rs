//! A model provider for OpenAI-compatible APIs.

#[macro_use]
extern crate tracing;

mod config;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, StatusCode, header};
use turnloop_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use turnloop_sse::{Chunks, Sse};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use response::OpenAIResponse;

const CONVERSATION_ID_HEADER: &str = "X-Conversation-Id";

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = match err.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => ErrorKind::RateLimitExceeded,
            Some(status) if status.is_server_error() => ErrorKind::Transport,
            Some(_) => ErrorKind::Other,
            None if err.is_connect() || err.is_timeout() => ErrorKind::Transport,
            None => ErrorKind::Other,
        };
        Self::new(format!("{err}"), kind)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let openai_req = proto::create_request(req, &self.config);
        let deployment = req.deployment.as_deref().unwrap_or(&self.config.model);
        let api_key = if req.identity.api_key.is_empty() {
            &self.config.api_key
        } else {
            &req.identity.api_key
        };

        let mut builder = self
            .client
            .post(self.config.completions_url(deployment))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream");
        builder = if self.config.api_version.is_some() {
            builder.header("Api-Key", api_key)
        } else {
            builder.header(header::AUTHORIZATION, format!("Bearer {api_key}"))
        };
        if !req.identity.conversation_id.is_empty() {
            builder = builder
                .header(CONVERSATION_ID_HEADER, &req.identity.conversation_id);
        }
        let resp_fut = builder.json(&openai_req).send();

        async move {
            let resp = resp_fut
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(Error::from_reqwest)?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Protocol,
                ));
            }

            debug!("response stream opened");
            let sse = Sse::new(Chunks::from_response(resp));
            Ok(OpenAIResponse::from_sse(sse))
        }
    }
}
