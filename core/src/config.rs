use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a tunnelled test request proves a working proxy.
///
/// `None` means the request never produced a response.
pub type SuccessPredicate = Arc<dyn Fn(Option<&reqwest::Response>) -> bool + Send + Sync>;

pub const DEFAULT_SCAN_RATE: usize = 3000;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_VALIDATE_WORKERS: usize = 128;
pub const DEFAULT_REPLY_LINGER: Duration = Duration::from_secs(3);

/// How phase one decides that a port is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Full TCP handshake through the OS socket API.
    #[default]
    Connect,
    /// SYN probes over a layer 4 raw socket.
    RawSocket,
    /// SYN probes injected and captured at the link layer.
    Capture,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Connect => "connect",
            Strategy::RawSocket => "raw",
            Strategy::Capture => "capture",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct ScanConfig {
    pub strategy: Strategy,
    /// Worker count for [`Strategy::Connect`], packets per second otherwise.
    pub scan_rate: usize,
    pub connect_timeout: Duration,
    pub test_url: String,
    pub test_timeout: Duration,
    pub success_predicate: SuccessPredicate,
    pub validate_workers: usize,
    /// How long the packet detectors keep listening after the last probe.
    pub reply_linger: Duration,
    pub interface: Option<String>,
    pub gateway: Option<Ipv4Addr>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            scan_rate: DEFAULT_SCAN_RATE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            test_url: DEFAULT_TEST_URL.to_string(),
            test_timeout: DEFAULT_TEST_TIMEOUT,
            success_predicate: default_predicate(),
            validate_workers: DEFAULT_VALIDATE_WORKERS,
            reply_linger: DEFAULT_REPLY_LINGER,
            interface: None,
            gateway: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("strategy", &self.strategy)
            .field("scan_rate", &self.scan_rate)
            .field("connect_timeout", &self.connect_timeout)
            .field("test_url", &self.test_url)
            .field("test_timeout", &self.test_timeout)
            .field("validate_workers", &self.validate_workers)
            .field("reply_linger", &self.reply_linger)
            .field("interface", &self.interface)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

/// Accepts any 2xx response.
pub fn default_predicate() -> SuccessPredicate {
    Arc::new(|response: Option<&reqwest::Response>| {
        response.is_some_and(|r| r.status().is_success())
    })
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

    fn response(status: u16) -> reqwest::Response {
        let inner = http::Response::builder().status(status).body("").unwrap();
        reqwest::Response::from(inner)
    }

    #[test]
    fn default_predicate_accepts_only_2xx() {
        let predicate = default_predicate();
        assert!(predicate(Some(&response(200))));
        assert!(predicate(Some(&response(204))));
        assert!(predicate(Some(&response(299))));
        assert!(!predicate(Some(&response(199))));
        assert!(!predicate(Some(&response(301))));
        assert!(!predicate(Some(&response(407))));
        assert!(!predicate(None));
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.strategy, Strategy::Connect);
        assert_eq!(cfg.scan_rate, 3000);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));
        assert_eq!(cfg.test_url, "http://www.gstatic.com/generate_204");
        assert_eq!(cfg.test_timeout, Duration::from_secs(15));
        assert_eq!(cfg.validate_workers, 128);
        assert!(cfg.interface.is_none());
    }

    #[test]
    fn strategy_names() {
        assert_eq!(Strategy::Connect.to_string(), "connect");
        assert_eq!(Strategy::RawSocket.to_string(), "raw");
        assert_eq!(Strategy::Capture.to_string(), "capture");
    }
}
