//! The two-phase scan.
//!
//! Phase one feeds every `address:port` pair of the address space to the
//! configured [`LivenessDetector`] and collects the endpoints that answer.
//! Phase two runs the [`Socks5Validator`] over those endpoints only, with its
//! own concurrency bound, and keeps the ones that pass. Phase two never starts
//! before phase one has fully drained.
//!
//! Progress of the current phase is published on a `watch` channel so a UI
//! can follow along without being part of the pipeline.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use pnet::ipnetwork::Ipv4Network;
use proxyscan_common::network::interface;
use proxyscan_common::progress::{LogProgress, ProgressReporter};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::collector::Collector;
use crate::config::{ScanConfig, Strategy};
use crate::detector::{self, LivenessDetector};
use crate::enumerator::{AddressSpace, PROGRESS_INTERVAL};
use crate::error::DetectorError;
use crate::pool::Scatter;
use crate::validator::Socks5Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Phase1Running,
    Phase1Done,
    Phase2Running,
    Phase2Done,
}

pub struct Scanner {
    config: ScanConfig,
    progress: Arc<dyn ProgressReporter>,
    state: watch::Sender<ScanState>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            config,
            progress: Arc::new(LogProgress),
            state,
        }
    }

    /// Replaces the default log-line progress output.
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ScanState) {
        self.state.send_replace(state);
    }

    /// Phase one. Returns every endpoint that accepted a connection, once per
    /// successful probe.
    pub async fn find_alive(
        &self,
        prefixes: &[Ipv4Network],
        ports: &[u16],
    ) -> Result<Vec<SocketAddrV4>, DetectorError> {
        let space = AddressSpace::new(prefixes.to_vec())
            .with_progress(self.progress.clone(), PROGRESS_INTERVAL);
        let probes: u64 = space.total().saturating_mul(ports.len() as u64);
        if probes == 0 {
            self.set_state(ScanState::Phase1Done);
            return Ok(Vec::new());
        }

        let targets: Vec<Ipv4Addr> = space.prefixes().iter().map(|prefix| prefix.network()).collect();
        let first_target: Ipv4Addr = targets.first().copied().unwrap_or(Ipv4Addr::UNSPECIFIED);
        if self.config.strategy != Strategy::Connect && self.config.interface.is_none() {
            for (target, source) in interface::divergent_routes(&targets) {
                warn!("{target} routes from {source}, but probes leave from the route of {first_target}");
            }
        }
        let mut detector: Box<dyn LivenessDetector> =
            detector::open(&self.config, first_target).await?;

        self.set_state(ScanState::Phase1Running);
        info!(
            "Phase 1: {} TCP scan of {probes} endpoints",
            self.config.strategy
        );

        let collector: Collector<SocketAddrV4> = Collector::new();
        let forwarder = detector.take_alive().map(|mut alive| {
            let sink = collector.sink();
            tokio::spawn(async move {
                while let Some(endpoint) = alive.recv().await {
                    info!("{endpoint} alive.");
                    sink.send(endpoint);
                }
            })
        });

        for address in space.iter() {
            for &port in ports {
                detector.send(SocketAddrV4::new(address, port)).await;
            }
        }
        self.progress.report(100.0);

        info!("Wait for tcp scan.");
        detector.wait().await;
        if let Some(forwarder) = forwarder {
            if let Err(e) = forwarder.await {
                warn!("Alive forwarder failed: {e}");
            }
        }

        let alive: Vec<SocketAddrV4> = collector.drain().await;
        self.set_state(ScanState::Phase1Done);
        info!("Phase 1 done, {} endpoints alive", alive.len());
        Ok(alive)
    }

    /// Phase two. Keeps the endpoints that relay the test request.
    pub async fn find_proxies(&self, alive: Vec<SocketAddrV4>) -> Vec<SocketAddrV4> {
        if alive.is_empty() {
            self.set_state(ScanState::Phase2Done);
            return Vec::new();
        }
        self.set_state(ScanState::Phase2Running);
        info!(
            "Phase 2: testing {} endpoints via {}",
            alive.len(),
            self.config.test_url
        );

        let validator = Arc::new(Socks5Validator::from_config(&self.config));
        let scatter = Scatter::new(self.config.validate_workers);
        let collector: Collector<SocketAddrV4> = Collector::new();

        for endpoint in alive {
            let validator = validator.clone();
            let sink = collector.sink();
            scatter
                .submit(async move {
                    if validator.validate(endpoint).await {
                        info!("Found {endpoint} socks5 alive");
                        sink.send(endpoint);
                    }
                })
                .await;
        }
        scatter.join().await;

        let proxies: Vec<SocketAddrV4> = collector.drain().await;
        self.set_state(ScanState::Phase2Done);
        info!("Phase 2 done, {} working proxies", proxies.len());
        proxies
    }

    /// Both phases back to back.
    pub async fn scan_all(
        &self,
        prefixes: &[Ipv4Network],
        ports: &[u16],
    ) -> Result<Vec<SocketAddrV4>, DetectorError> {
        let alive = self.find_alive(prefixes, ports).await?;
        Ok(self.find_proxies(alive).await)
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
