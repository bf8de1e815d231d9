//! Client side of the TCP transport.

use super::codec::{read_frame, write_frame, Frame};
use super::{ActionTransport, ConnectionState};
use crate::config::ClientConfig;
use crate::error::{DispatchError, Result};
use crate::message::{IntoMessage, Message};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Sends messages to a remote [`ActionListener`](super::ActionListener).
///
/// Connects lazily on the first call. One request is in flight at a time;
/// concurrent callers queue on the connection. Any connection failure drops the
/// socket, moves the client back to [`ConnectionState::Disconnected`] and
/// surfaces as [`DispatchError::Transport`]. There is no automatic retry; the next
/// call reconnects.
pub struct RemoteClient {
    config: ClientConfig,
    connection: Mutex<Option<TcpStream>>,
    state: StdMutex<ConnectionState>,
    next_id: AtomicU64,
}

impl RemoteClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            state: StdMutex::new(ConnectionState::Disconnected),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Sends `message` and waits for its reply.
    #[tracing::instrument(skip(self, message), fields(addr = %self.config.address()))]
    pub async fn act(&self, message: impl IntoMessage) -> Result<Value> {
        let message = message.into_message()?;
        debug!(%message, "Sending request");

        let mut connection = self.connection.lock().await;
        // The stream only goes back into the slot after a completed exchange.
        let mut in_flight = InFlight::new(self);
        let mut stream = match connection.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };
        let outcome = self.exchange(&mut stream, message).await;
        in_flight.finish();

        match outcome {
            Ok(result) => {
                *connection = Some(stream);
                self.set_state(ConnectionState::Connected);
                result
            }
            Err(e) => {
                warn!(error = %e, "Connection failed, disconnecting");
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Drops the connection, if any. The next call reconnects.
    pub async fn close(&self) {
        let mut connection = self.connection.lock().await;
        if connection.take().is_some() {
            info!(addr = %self.config.address(), "Closed connection");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.config.address();
        self.set_state(ConnectionState::Connecting);
        info!(%addr, "Connecting");

        let connected = tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                DispatchError::Transport(format!(
                    "connect to {addr} timed out after {}ms",
                    self.config.connect_timeout_ms
                ))
            })
            .and_then(|r| {
                r.map_err(|e| DispatchError::Transport(format!("connect to {addr} failed: {e}")))
            });

        match connected {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY: {}", e);
                }
                self.set_state(ConnectionState::Connected);
                info!(%addr, "Connected");
                Ok(stream)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// One request/reply round trip. The outer `Result` is the connection, the
    /// inner one is the remote action's outcome.
    async fn exchange(&self, stream: &mut TcpStream, message: Message) -> Result<Result<Value>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let max = self.config.max_frame_size;

        self.set_state(ConnectionState::Sending);
        write_frame(stream, &Frame::Request { id, message }, max).await?;

        self.set_state(ConnectionState::AwaitingReply);
        let reply = tokio::time::timeout(self.config.request_timeout(), read_frame(stream, max))
            .await
            .map_err(|_| {
                DispatchError::Transport(format!(
                    "no reply within {}ms",
                    self.config.request_timeout_ms
                ))
            })??;

        match reply {
            Some(Frame::Reply { id: reply_id, outcome }) if reply_id == id => Ok(outcome),
            Some(Frame::Reply { id: reply_id, .. }) => Err(DispatchError::Transport(format!(
                "reply id {reply_id} does not match request {id}"
            ))),
            Some(Frame::Request { .. }) => Err(DispatchError::Transport(
                "peer sent a request instead of a reply".into(),
            )),
            None => Err(DispatchError::Transport("connection closed by peer".into())),
        }
    }
}

/// Resets the client to `Disconnected` if a call is dropped before it finishes.
struct InFlight<'a> {
    client: &'a RemoteClient,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn new(client: &'a RemoteClient) -> Self {
        Self {
            client,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Call abandoned, dropping connection");
            self.client.set_state(ConnectionState::Disconnected);
        }
    }
}

#[async_trait]
impl ActionTransport for RemoteClient {
    async fn act(&self, message: Message) -> Result<Value> {
        RemoteClient::act(self, message).await
    }
}
