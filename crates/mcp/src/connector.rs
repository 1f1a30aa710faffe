use async_trait::async_trait;
use rmcp::model::{
    ClientCapabilities, ClientInfo, Implementation, LoggingLevel,
    LoggingMessageNotificationParam, ProtocolVersion,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, RoleClient};

use crate::Error;

/// A running client session, as returned by a [`Connector`].
pub type ClientService = RunningService<RoleClient, SessionHandler>;

/// The client side of a session.
///
/// Announces the client during the handshake and forwards server log
/// messages to `tracing`. Requests sent by the server, such as `ping`, are
/// answered by the session itself.
#[derive(Clone, Debug)]
pub struct SessionHandler {
    info: ClientInfo,
}

impl SessionHandler {
    /// Creates a handler announcing this crate as the client.
    pub fn new() -> Self {
        Self {
            info: ClientInfo {
                protocol_version: ProtocolVersion::LATEST,
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: "turnloop".to_owned(),
                    title: None,
                    version: env!("CARGO_PKG_VERSION").to_owned(),
                    icons: None,
                    website_url: None,
                },
            },
        }
    }
}

impl Default for SessionHandler {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHandler for SessionHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let logger = params.logger.as_deref().unwrap_or("server");
        match params.level {
            LoggingLevel::Debug => debug!("[{logger}] {}", params.data),
            LoggingLevel::Info | LoggingLevel::Notice => {
                info!("[{logger}] {}", params.data)
            }
            LoggingLevel::Warning => warn!("[{logger}] {}", params.data),
            _ => error!("[{logger}] {}", params.data),
        }
    }
}

/// Establishes sessions with one server.
///
/// The returned service has completed the handshake.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens the transport and runs the handshake with `handler`.
    async fn connect(
        &self,
        handler: SessionHandler,
    ) -> Result<ClientService, Error>;

    /// Returns a human readable locator of the server, used in logs.
    fn locator(&self) -> &str;
}

/// A [`Connector`] for servers speaking streamable HTTP.
pub struct HttpConnector {
    url: String,
}

impl HttpConnector {
    /// Creates a connector for the given endpoint URL.
    #[inline]
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        handler: SessionHandler,
    ) -> Result<ClientService, Error> {
        let transport =
            StreamableHttpClientTransport::from_uri(self.url.as_str());
        rmcp::serve_client(handler, transport)
            .await
            .map_err(|err| Error::Transport(format!("handshake failed: {err}")))
    }

    #[inline]
    fn locator(&self) -> &str {
        &self.url
    }
}
