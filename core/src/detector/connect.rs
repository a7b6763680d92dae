use std::net::SocketAddrV4;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{AliveStream, LivenessDetector};
use crate::pool::Scatter;

/// Full TCP handshakes through the OS, `workers` at a time.
pub struct ConnectDetector {
    scatter: Option<Scatter>,
    connect_timeout: Duration,
    alive_tx: Option<UnboundedSender<SocketAddrV4>>,
    alive_rx: Option<AliveStream>,
}

impl ConnectDetector {
    pub fn new(workers: usize, connect_timeout: Duration) -> Self {
        let (alive_tx, alive_rx) = mpsc::unbounded_channel();
        Self {
            scatter: Some(Scatter::new(workers)),
            connect_timeout,
            alive_tx: Some(alive_tx),
            alive_rx: Some(alive_rx),
        }
    }
}

/// Succeeds only on an established connection. Refusals and timeouts mean
/// closed or filtered.
pub async fn handshake_probe(endpoint: SocketAddrV4, connect_timeout: Duration) -> bool {
    match timeout(connect_timeout, TcpStream::connect(endpoint)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!("{endpoint} connect failed: {e}");
            false
        }
        Err(_elapsed) => {
            debug!("{endpoint} connect timed out");
            false
        }
    }
}

#[async_trait]
impl LivenessDetector for ConnectDetector {
    async fn send(&mut self, endpoint: SocketAddrV4) {
        let (Some(scatter), Some(alive_tx)) = (self.scatter.as_ref(), self.alive_tx.as_ref()) else {
            warn!("Probe to {endpoint} after wait, ignored");
            return;
        };
        let alive_tx = alive_tx.clone();
        let connect_timeout = self.connect_timeout;

        scatter
            .submit(async move {
                if handshake_probe(endpoint, connect_timeout).await {
                    let _ = alive_tx.send(endpoint);
                }
            })
            .await;
    }

    fn take_alive(&mut self) -> Option<AliveStream> {
        self.alive_rx.take()
    }

    async fn wait(&mut self) {
        if let Some(scatter) = self.scatter.take() {
            scatter.join().await;
        }
        // last sender; the stream ends once buffered endpoints are read
        self.alive_tx.take();
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
