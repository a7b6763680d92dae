//! Machinery shared by the SYN-based detectors.
//!
//! A probe is a single SYN from one fixed source port whose sequence number
//! is a keyed hash of the destination. A SYN-ACK is accepted only when it
//! acknowledges that hash plus one and a probe to its sender is still
//! unanswered, so stray traffic and duplicate replies never count.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{self, Duration};

use async_trait::async_trait;
use proxyscan_protocols::tcp;
use rand::Rng;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::{AliveStream, LivenessDetector};
use crate::error::DetectorError;

/// Source ports are drawn from the upper half of the port space, clear of the
/// usual well-known services.
const SOURCE_PORTS: std::ops::RangeInclusive<u16> = 40000..=59999;
/// How often `wait` checks whether every probe has been answered.
const WAIT_POLL: Duration = Duration::from_millis(100);
/// Registrations between two sweeps of expired probes.
const SWEEP_EVERY: u32 = 1024;

/// Unanswered probes to one endpoint.
struct Pending {
    count: u32,
    last_sent: time::Instant,
}

#[derive(Default)]
struct PendingTable {
    probes: HashMap<SocketAddrV4, Pending>,
    since_sweep: u32,
}

impl PendingTable {
    fn consume(&mut self, endpoint: SocketAddrV4) -> bool {
        let Some(pending) = self.probes.get_mut(&endpoint) else {
            return false;
        };
        pending.count -= 1;
        if pending.count == 0 {
            self.probes.remove(&endpoint);
        }
        true
    }

    fn sweep(&mut self, linger: Duration) {
        self.since_sweep = 0;
        self.probes.retain(|_, pending| pending.last_sent.elapsed() < linger);
    }
}

/// Matches SYN-ACKs to the probes that caused them.
///
/// A probe with no reply within `linger` of its send is given up on and
/// dropped, so the table holds roughly `rate * linger` entries however
/// large the scan.
pub(crate) struct Correlator {
    secret: u64,
    local: SocketAddrV4,
    linger: Duration,
    pending: Mutex<PendingTable>,
}

impl Correlator {
    pub(crate) fn new(source: Ipv4Addr, linger: Duration) -> Self {
        let port: u16 = rand::rng().random_range(SOURCE_PORTS);
        Self::with_secret(SocketAddrV4::new(source, port), rand::random()).with_linger(linger)
    }

    pub(crate) fn with_secret(local: SocketAddrV4, secret: u64) -> Self {
        Self {
            secret,
            local,
            linger: Duration::MAX,
            pending: Mutex::new(PendingTable::default()),
        }
    }

    pub(crate) fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub(crate) fn local(&self) -> SocketAddrV4 {
        self.local
    }

    fn pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a probe to `endpoint` and returns the sequence number to send.
    pub(crate) fn register(&self, endpoint: SocketAddrV4) -> u32 {
        let mut table = self.pending();
        let now = time::Instant::now();
        let pending = table.probes.entry(endpoint).or_insert(Pending {
            count: 0,
            last_sent: now,
        });
        pending.count += 1;
        pending.last_sent = now;

        table.since_sweep += 1;
        if table.since_sweep >= SWEEP_EVERY {
            table.sweep(self.linger);
        }
        tcp::sequence_cookie(self.secret, endpoint)
    }

    /// Forgets one probe to `endpoint`, for sends that never left the host.
    pub(crate) fn release(&self, endpoint: SocketAddrV4) {
        self.pending().consume(endpoint);
    }

    /// Drops every probe sent more than `linger` ago.
    pub(crate) fn expire(&self) {
        self.pending().sweep(self.linger);
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.pending().probes.len()
    }

    /// Checks a TCP segment from `remote` and consumes one pending probe if it
    /// is the SYN-ACK for it.
    pub(crate) fn claim(&self, remote: Ipv4Addr, segment: &[u8]) -> Option<SocketAddrV4> {
        let reply = tcp::parse_syn_ack(segment)?;
        let endpoint = tcp::correlate(self.secret, self.local.port(), remote, &reply)?;
        self.pending().consume(endpoint).then_some(endpoint)
    }
}

/// Puts one SYN on the wire.
pub trait Emitter: Send + 'static {
    fn emit(&mut self, local: SocketAddrV4, dst: SocketAddrV4, seq: u32) -> io::Result<()>;
}

/// Background thread reading replies until told to stop.
pub(crate) struct Listener {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Listener {
    /// Runs `body` on its own thread. `body` must return soon after the flag
    /// it is given turns true.
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self, DetectorError>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(&flag))
            .map_err(|e| DetectorError::channel("listener", e))?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub(crate) async fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let Some(thread) = self.thread.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Listener thread panicked"),
            Err(e) => warn!("Failed to join listener thread: {e}"),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// A SYN scanner over some [`Emitter`], paced to a fixed packet rate.
pub struct SynDetector<E> {
    emitter: E,
    correlator: Arc<Correlator>,
    listener: Listener,
    alive: Option<AliveStream>,
    period: Duration,
    pacer: Option<Interval>,
    linger: Duration,
    last_send: Option<Instant>,
    finished: bool,
}

impl<E: Emitter> SynDetector<E> {
    pub(crate) fn new(
        emitter: E,
        correlator: Arc<Correlator>,
        listener: Listener,
        alive: AliveStream,
        rate: usize,
        linger: Duration,
    ) -> Self {
        let period = Duration::from_secs_f64(1.0 / rate.max(1) as f64).max(Duration::from_nanos(1));
        Self {
            emitter,
            correlator,
            listener,
            alive: Some(alive),
            period,
            pacer: None,
            linger,
            last_send: None,
            finished: false,
        }
    }

    async fn pace(&mut self) {
        let period = self.period;
        let pacer = self.pacer.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            // catch up after a stall instead of lowering the average rate
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            interval
        });
        pacer.tick().await;
    }
}

#[async_trait]
impl<E: Emitter> LivenessDetector for SynDetector<E> {
    async fn send(&mut self, endpoint: SocketAddrV4) {
        if self.finished {
            warn!("Probe to {endpoint} after wait, ignored");
            return;
        }
        self.pace().await;

        let local = self.correlator.local();
        let seq = self.correlator.register(endpoint);
        if let Err(e) = self.emitter.emit(local, endpoint, seq) {
            debug!("SYN to {endpoint} failed: {e}");
            self.correlator.release(endpoint);
        }
        self.last_send = Some(Instant::now());
    }

    fn take_alive(&mut self) -> Option<AliveStream> {
        self.alive.take()
    }

    async fn wait(&mut self) {
        if self.finished {
            return;
        }
        if let Some(last_send) = self.last_send {
            let deadline = last_send + self.linger;
            loop {
                self.correlator.expire();
                if self.correlator.outstanding() == 0 {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                tokio::time::sleep(WAIT_POLL.min(deadline - now)).await;
            }
        }
        self.listener.shutdown().await;
        self.finished = true;
        debug!("{} probes left unanswered", self.correlator.outstanding());
        self.correlator.expire();
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
