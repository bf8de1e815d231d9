//! TCP listener that serves a [`Dispatcher`] to remote clients.

use super::codec::{encode_frame, read_frame, write_encoded, Frame};
use crate::config::ListenerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, Result};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A bound listener. Each accepted connection gets its own task; requests on a
/// connection are answered in order. Dropping the handle stops the listener too.
pub struct ActionListener {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ActionListener {
    /// Binds `config.host:config.port` (port 0 picks a free port) and starts
    /// accepting connections.
    pub async fn bind(config: &ListenerConfig, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(config.address()).await.map_err(|e| {
            DispatchError::Transport(format!("failed to bind {}: {e}", config.address()))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DispatchError::Transport(format!("failed to read local address: {e}")))?;
        info!(addr = %local_addr, "Listening");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let max_frame_size = config.max_frame_size;
        let task = tokio::spawn(accept_loop(listener, dispatcher, shutdown_rx, max_frame_size));

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, closes open connections and waits for the accept task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Listener task ended abnormally");
        }
        info!(addr = %self.local_addr, "Listener stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
    max_frame_size: usize,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, "Failed to set TCP_NODELAY: {}", e);
                    }
                    debug!(%peer, "Accepted connection");
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        dispatcher.clone(),
                        shutdown.clone(),
                        max_frame_size,
                    ));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
    max_frame_size: usize,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            frame = read_frame(&mut stream, max_frame_size) => frame,
        };

        let (id, message) = match frame {
            Ok(Some(Frame::Request { id, message })) => (id, message),
            Ok(Some(Frame::Reply { id, .. })) => {
                warn!(%peer, id, "Unexpected reply frame from client, closing");
                break;
            }
            Ok(None) => {
                debug!(%peer, "Connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "Dropping connection");
                break;
            }
        };

        let outcome = dispatcher.act(message).await;
        let Some(bytes) = encode_reply(id, outcome, max_frame_size) else {
            warn!(%peer, id, "Reply could not be encoded, closing");
            break;
        };
        if let Err(e) = write_encoded(&mut stream, &bytes).await {
            warn!(%peer, id, error = %e, "Failed to send reply");
            break;
        }
        debug!(%peer, id, bytes = bytes.len(), "Sent reply");
    }
}

/// Encodes the reply for request `id`. A reply that cannot be encoded is replaced
/// by one carrying the encoding error, so the caller still hears back.
fn encode_reply(id: u64, outcome: Result<serde_json::Value>, max_frame_size: usize) -> Option<Vec<u8>> {
    match encode_frame(&Frame::Reply { id, outcome }, max_frame_size) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(id, error = %e, "Reply too large or not encodable, sending error instead");
            encode_frame(&Frame::Reply { id, outcome: Err(e) }, max_frame_size).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_FRAME_SIZE;
    use serde_json::json;

    fn decode(bytes: &[u8]) -> Frame {
        serde_json::from_slice(&bytes[4..]).unwrap()
    }

    #[test]
    fn test_oversized_reply_becomes_error_reply() {
        let bytes = encode_reply(7, Ok(json!("x".repeat(500))), 200).unwrap();
        match decode(&bytes) {
            Frame::Reply { id, outcome } => {
                assert_eq!(id, 7);
                assert!(outcome.unwrap_err().is_transport());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_small_reply_is_sent_as_is() {
        let bytes = encode_reply(1, Ok(json!({"id": 1})), DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(
            decode(&bytes),
            Frame::Reply {
                id: 1,
                outcome: Ok(json!({"id": 1}))
            }
        );
    }
}
