//! Lazy walk over a set of IPv4 prefixes.
//!
//! Addresses come out prefix by prefix, in input order, each prefix from its
//! network address up to and including its broadcast address. Nothing is
//! materialised, so a /8 costs the same memory as a /32. Overlapping prefixes
//! are walked once each.

use std::net::Ipv4Addr;
use std::slice;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pnet::ipnetwork::Ipv4Network;
use proxyscan_common::network::range::prefix_size;
use proxyscan_common::progress::ProgressReporter;

/// Default cadence for progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Clone)]
struct Progress {
    reporter: Arc<dyn ProgressReporter>,
    interval: Duration,
}

/// A restartable address space. Every call to [`AddressSpace::iter`] starts
/// from the first address again.
#[derive(Clone)]
pub struct AddressSpace {
    prefixes: Vec<Ipv4Network>,
    progress: Option<Progress>,
}

impl AddressSpace {
    pub fn new(prefixes: Vec<Ipv4Network>) -> Self {
        Self {
            prefixes,
            progress: None,
        }
    }

    /// Reports completion to `reporter` at most once per `interval` while
    /// iterating.
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>, interval: Duration) -> Self {
        self.progress = Some(Progress { reporter, interval });
        self
    }

    pub fn prefixes(&self) -> &[Ipv4Network] {
        &self.prefixes
    }

    /// Number of addresses the walk yields, counting overlaps twice.
    pub fn total(&self) -> u64 {
        self.prefixes.iter().map(prefix_size).sum()
    }

    pub fn iter(&self) -> Addresses<'_> {
        Addresses {
            prefixes: self.prefixes.iter(),
            current: None,
            visited: 0,
            total: self.total(),
            progress: self.progress.as_ref(),
            last_report: Instant::now(),
        }
    }
}

impl<'a> IntoIterator for &'a AddressSpace {
    type Item = Ipv4Addr;
    type IntoIter = Addresses<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Addresses<'a> {
    prefixes: slice::Iter<'a, Ipv4Network>,
    /// Next address and exclusive end of the prefix being walked. Kept as u64
    /// so the end of 255.255.255.255/x does not wrap.
    current: Option<(u64, u64)>,
    visited: u64,
    total: u64,
    progress: Option<&'a Progress>,
    last_report: Instant,
}

impl Addresses<'_> {
    fn report_progress(&mut self) {
        let Some(progress) = self.progress else {
            return;
        };
        if self.last_report.elapsed() < progress.interval {
            return;
        }
        self.last_report = Instant::now();
        let percent: f64 = self.visited as f64 / self.total as f64 * 100.0;
        progress.reporter.report(percent);
    }
}

impl Iterator for Addresses<'_> {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        loop {
            if let Some((next, end)) = self.current {
                if next < end {
                    self.current = Some((next + 1, end));
                    self.visited += 1;
                    self.report_progress();
                    return Some(Ipv4Addr::from(next as u32));
                }
            }
            let prefix: &Ipv4Network = self.prefixes.next()?;
            let start: u64 = u32::from(prefix.network()) as u64;
            self.current = Some((start, start + prefix_size(prefix)));
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn net(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    #[test]
    fn prefix_yields_two_to_the_host_bits() {
        for bits in [32u8, 31, 30, 24, 20] {
            let space = AddressSpace::new(vec![Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), bits).unwrap()]);
            let expected: u64 = 1 << (32 - bits);
            assert_eq!(space.iter().count() as u64, expected, "/{bits}");
            assert_eq!(space.total(), expected);
        }
    }

    #[test]
    fn addresses_start_at_network_and_strictly_increase() {
        // host bits set on purpose: the walk starts from the masked address
        let space = AddressSpace::new(vec![net("192.168.7.77/29")]);
        let addrs: Vec<Ipv4Addr> = space.iter().collect();
        assert_eq!(addrs.first(), Some(&Ipv4Addr::new(192, 168, 7, 72)));
        assert_eq!(addrs.last(), Some(&Ipv4Addr::new(192, 168, 7, 79)));
        assert!(addrs.windows(2).all(|w| u32::from(w[0]) < u32::from(w[1])));
    }

    #[test]
    fn overlapping_prefixes_are_not_deduplicated() {
        let space = AddressSpace::new(vec![net("10.0.0.0/30"), net("10.0.0.0/31")]);
        assert_eq!(space.total(), 6);
        let addrs: Vec<Ipv4Addr> = space.iter().collect();
        assert_eq!(addrs.len(), 6);
        assert_eq!(addrs[4], Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn prefixes_are_walked_in_input_order() {
        let space = AddressSpace::new(vec![net("10.0.0.8/31"), net("10.0.0.0/31")]);
        let addrs: Vec<Ipv4Addr> = space.iter().collect();
        assert_eq!(
            addrs,
            vec![
                Ipv4Addr::new(10, 0, 0, 8),
                Ipv4Addr::new(10, 0, 0, 9),
                Ipv4Addr::new(10, 0, 0, 0),
                Ipv4Addr::new(10, 0, 0, 1),
            ]
        );
    }

    #[test]
    fn top_of_address_space_does_not_wrap() {
        let space = AddressSpace::new(vec![net("255.255.255.252/30")]);
        let addrs: Vec<Ipv4Addr> = space.iter().collect();
        assert_eq!(addrs.len(), 4);
        assert_eq!(addrs[3], Ipv4Addr::BROADCAST);
    }

    #[test]
    fn whole_internet_total_fits() {
        let space = AddressSpace::new(vec![net("0.0.0.0/0"), net("0.0.0.0/0")]);
        assert_eq!(space.total(), 2 * (1u64 << 32));
    }

    #[test]
    fn iteration_is_restartable() {
        let space = AddressSpace::new(vec![net("172.16.0.0/30")]);
        let first: Vec<Ipv4Addr> = space.iter().collect();
        let second: Vec<Ipv4Addr> = (&space).into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_space_yields_nothing() {
        let space = AddressSpace::new(Vec::new());
        assert_eq!(space.total(), 0);
        assert_eq!(space.iter().next(), None);
    }

    #[test]
    fn progress_reports_visited_share() {
        let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = move |percent: f64| sink.lock().unwrap().push(percent);

        let space = AddressSpace::new(vec![net("10.0.0.0/30")])
            .with_progress(Arc::new(reporter), Duration::ZERO);
        assert_eq!(space.iter().count(), 4);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn progress_is_throttled_by_interval() {
        let seen: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let reporter = move |_: f64| *sink.lock().unwrap() += 1;

        let space = AddressSpace::new(vec![net("10.0.0.0/24")])
            .with_progress(Arc::new(reporter), Duration::from_secs(3600));
        assert_eq!(space.iter().count(), 256);
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
