use std::fmt::{self, Display};
use std::sync::{Mutex, PoisonError};

use rmcp::RoleClient;
use rmcp::model::{CallToolRequestParam, ReadResourceRequestParam};
use rmcp::service::Peer;
use serde_json::{Map, Value};
use tracing::Instrument;

use crate::Error;
use crate::connector::{
    ClientService, Connector, HttpConnector, SessionHandler,
};
use crate::types::{self, Resource, ToolDescriptor};

/// The lifecycle state of an [`McpClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientStatus {
    /// No session yet, or the last connect attempt failed.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The session is ready.
    Connected,
    /// The client has been closed and cannot be used again.
    Closed,
}

impl Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Disconnected => write!(f, "disconnected"),
            ClientStatus::Connecting => write!(f, "connecting"),
            ClientStatus::Connected => write!(f, "connected"),
            ClientStatus::Closed => write!(f, "closed"),
        }
    }
}

enum State {
    Disconnected,
    Connecting,
    Connected(ClientService),
    Closed,
}

impl State {
    fn status(&self) -> ClientStatus {
        match self {
            State::Disconnected => ClientStatus::Disconnected,
            State::Connecting => ClientStatus::Connecting,
            State::Connected(_) => ClientStatus::Connected,
            State::Closed => ClientStatus::Closed,
        }
    }
}

/// A client of one remote tool server.
///
/// The client is safe to share between tasks. Requests run concurrently
/// on the same session, while `connect` and `close` are serialized.
pub struct McpClient {
    connector: Box<dyn Connector>,
    connect_lock: tokio::sync::Mutex<()>,
    state: Mutex<State>,
}

impl McpClient {
    /// Creates a disconnected client for the given connector.
    pub fn new<C: Connector + 'static>(connector: C) -> Self {
        Self {
            connector: Box::new(connector),
            connect_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(State::Disconnected),
        }
    }

    /// Creates a disconnected client for a streamable HTTP endpoint.
    #[inline]
    pub fn with_url<S: Into<String>>(url: S) -> Self {
        Self::new(HttpConnector::new(url))
    }

    /// Creates a client and connects it.
    pub async fn connect_to<S: Into<String>>(url: S) -> Result<Self, Error> {
        let client = Self::with_url(url);
        client.connect().await?;
        Ok(client)
    }

    /// Returns the current lifecycle state.
    #[inline]
    pub fn status(&self) -> ClientStatus {
        self.with_state(|state| state.status())
    }

    /// Returns the server locator.
    #[inline]
    pub fn locator(&self) -> &str {
        self.connector.locator()
    }

    /// Opens a session and completes the handshake.
    ///
    /// Does nothing if the client is already connected. A failed attempt
    /// leaves the client disconnected, so it may be retried.
    pub async fn connect(&self) -> Result<(), Error> {
        let _guard = self.connect_lock.lock().await;
        match self.status() {
            ClientStatus::Connected => return Ok(()),
            ClientStatus::Closed => {
                return Err(Error::SessionState(ClientStatus::Closed));
            }
            ClientStatus::Disconnected | ClientStatus::Connecting => {}
        }
        self.set_state(State::Connecting);

        let span = debug_span!("mcp connect", server = self.locator());
        let result = self
            .connector
            .connect(SessionHandler::new())
            .instrument(span)
            .await;

        match result {
            Ok(service) => {
                info!("connected to {}", self.locator());
                self.set_state(State::Connected(service));
                Ok(())
            }
            Err(err) => {
                warn!("failed to connect to {}: {err}", self.locator());
                self.set_state(State::Disconnected);
                Err(err)
            }
        }
    }

    /// Lists every tool of the server, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let peer = self.peer()?;
        let tools: Vec<ToolDescriptor> = peer
            .list_all_tools()
            .await?
            .into_iter()
            .map(ToolDescriptor::from)
            .collect();
        debug!("server offers {} tools", tools.len());
        Ok(tools)
    }

    /// Calls a tool and joins its content parts into one text.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, Error> {
        let peer = self.peer()?;
        let params = CallToolRequestParam {
            name: name.to_owned().into(),
            arguments: Some(arguments),
        };
        let result = peer
            .call_tool(params)
            .instrument(debug_span!("mcp call", tool = name))
            .await?;
        let text = types::joined_text(&result);
        if result.is_error.unwrap_or(false) {
            return Err(Error::ToolReported(text));
        }
        Ok(text)
    }

    /// Reads a resource by its URI.
    pub async fn get_resource(&self, uri: &str) -> Result<Resource, Error> {
        let peer = self.peer()?;
        let params = ReadResourceRequestParam {
            uri: uri.to_owned(),
        };
        let result = peer.read_resource(params).await?;
        types::into_resource(result)
    }

    /// Cancels the session and closes the transport.
    ///
    /// Closing is final and idempotent. Teardown failures are logged but
    /// not reported.
    pub async fn close(&self) {
        let _guard = self.connect_lock.lock().await;
        let previous =
            self.with_state(|state| std::mem::replace(state, State::Closed));
        if let State::Connected(service) = previous {
            match service.cancel().await {
                Ok(reason) => debug!("session ended: {reason:?}"),
                Err(err) => warn!("failed to shut the session down: {err}"),
            }
            info!("disconnected from {}", self.locator());
        }
    }

    fn peer(&self) -> Result<Peer<RoleClient>, Error> {
        self.with_state(|state| match state {
            State::Connected(service) => Ok(service.peer().clone()),
            state => Err(Error::SessionState(state.status())),
        })
    }

    fn set_state(&self, new_state: State) {
        self.with_state(|state| *state = new_state);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state =
            self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}
