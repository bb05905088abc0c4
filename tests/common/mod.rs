#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tail_forwarder::forwarder::ForwarderSettings;
use tail_forwarder::sender::{Endpoint, PickStrategy, ServerPool, WireFormat};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// In-process stand-in for the collection server: accepts TCP connections
/// and records every byte in arrival order.
pub struct Collector {
    addr: SocketAddr,
    data: Arc<Mutex<Vec<u8>>>,
    connections: Arc<AtomicUsize>,
}

impl Collector {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener)
    }

    /// Starts a collector on a specific port (for recovery tests).
    pub async fn spawn_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let data = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&data);
        let conns = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                conns.fetch_add(1, Ordering::SeqCst);
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    loop {
                        match sock.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => sink.lock().await.extend_from_slice(&buf[..n]),
                        }
                    }
                });
            }
        });

        Self {
            addr,
            data,
            connections,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.addr.port())
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Received events, decoded from the newline-delimited JSON wire.
    pub async fn events(&self) -> Vec<serde_json::Value> {
        let data = self.data.lock().await.clone();
        String::from_utf8_lossy(&data)
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Polls until at least `n` events arrived or the deadline passes.
    pub async fn wait_for(&self, n: usize, deadline: Duration) -> Vec<serde_json::Value> {
        let start = std::time::Instant::now();
        loop {
            let events = self.events().await;
            if events.len() >= n {
                return events;
            }
            assert!(
                start.elapsed() < deadline,
                "expected {n} events, got {} before deadline: {events:?}",
                events.len()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// A port that refuses connections: bound once, then released.
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Engine settings tuned for fast tests: JSON wire (easy to decode), short
/// timeouts, tight idle loop.
pub fn test_settings() -> ForwarderSettings {
    ForwarderSettings {
        tag: "test.tail".to_string(),
        format: WireFormat::Json,
        connect_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_secs(2),
        failover_backoff: Duration::from_millis(200),
        idle_wait: Duration::from_millis(10),
        ..ForwarderSettings::default()
    }
}

pub fn pool_of(primary: Vec<Endpoint>, secondary: Vec<Endpoint>) -> ServerPool {
    ServerPool::new(primary, secondary).unwrap()
}

/// Deterministic pick strategy: always the first live candidate.
pub struct FirstPick;

impl PickStrategy for FirstPick {
    fn pick(&mut self, _len: usize) -> usize {
        0
    }
}

/// Extracts the record field `key` from a decoded `[tag, ts, record]` event.
pub fn record_field(event: &serde_json::Value, key: &str) -> String {
    event[2][key].as_str().unwrap_or_default().to_string()
}
