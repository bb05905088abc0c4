use super::pool::Endpoint;
use crate::buffer::Batch;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("connect to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: Endpoint, timeout_ms: u64 },
    #[error("connect to {endpoint} failed: {source}")]
    Io {
        endpoint: Endpoint,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("send attempted without an established connection")]
    NotConnected,
    #[error("write timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of the one TCP connection the agent holds. A tagged enum, not a
/// nullable handle: sending without a live stream is unrepresentable.
#[derive(Debug)]
pub enum ConnectionState {
    Disconnected,
    Connecting { endpoint: Endpoint },
    Connected { endpoint: Endpoint, stream: TcpStream },
    Failed { endpoint: Endpoint },
}

/// Owns the connection to the currently selected endpoint: connect with a
/// bounded timeout, full-payload writes, unconditional teardown. Retry and
/// failover policy live in the forwarding loop, not here.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl Connection {
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connect_timeout,
            write_timeout,
        }
    }

    pub fn is_connected_to(&self, endpoint: &Endpoint) -> bool {
        matches!(&self.state, ConnectionState::Connected { endpoint: ep, .. } if ep == endpoint)
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        match &self.state {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting { endpoint }
            | ConnectionState::Connected { endpoint, .. }
            | ConnectionState::Failed { endpoint } => Some(endpoint),
        }
    }

    /// TCP handshake (including name resolution) with a bounded timeout.
    /// Failure leaves the state `Failed`; the caller decides whether to
    /// fail over. No internal retry.
    pub async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), ConnectError> {
        self.state = ConnectionState::Connecting {
            endpoint: endpoint.clone(),
        };
        let attempt = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        match timeout(self.connect_timeout, attempt).await {
            Ok(Ok(stream)) => {
                debug!(%endpoint, "connection established");
                self.state = ConnectionState::Connected {
                    endpoint: endpoint.clone(),
                    stream,
                };
                Ok(())
            }
            Ok(Err(source)) => {
                self.state = ConnectionState::Failed {
                    endpoint: endpoint.clone(),
                };
                Err(ConnectError::Io {
                    endpoint: endpoint.clone(),
                    source,
                })
            }
            Err(_) => {
                self.state = ConnectionState::Failed {
                    endpoint: endpoint.clone(),
                };
                Err(ConnectError::Timeout {
                    endpoint: endpoint.clone(),
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Writes the whole batch payload, retrying partial writes internally
    /// (`write_all`), bounded by the write timeout. Any error poisons the
    /// connection; a fresh [`connect`](Self::connect) is required after.
    pub async fn send(&mut self, batch: &Batch) -> Result<(), SendError> {
        let ConnectionState::Connected { endpoint, stream } = &mut self.state else {
            return Err(SendError::NotConnected);
        };
        let endpoint = endpoint.clone();

        let write = async {
            stream.write_all(batch.payload()).await?;
            stream.flush().await
        };
        let result = match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SendError::Io(e)),
            Err(_) => Err(SendError::Timeout {
                timeout_ms: self.write_timeout.as_millis() as u64,
            }),
        };

        if result.is_err() {
            self.state = ConnectionState::Failed { endpoint };
        }
        result
    }

    /// Unconditional teardown. The stream is dropped, never reused.
    pub fn close(&mut self) {
        if let ConnectionState::Connected { endpoint, .. } = &self.state {
            debug!(%endpoint, "closing connection");
        }
        self.state = ConnectionState::Disconnected;
    }
}
