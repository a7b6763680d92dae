pub mod scan;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use proxyscan_core::config::{
    DEFAULT_SCAN_RATE, DEFAULT_TEST_URL, DEFAULT_VALIDATE_WORKERS, ScanConfig, Strategy,
};

#[derive(Parser, Debug)]
#[command(name = "proxyscan")]
#[command(version, about = "Finds working SOCKS5 proxies in IPv4 ranges.")]
pub struct CommandLine {
    /// CIDR, address, or range (10.0.0.1-20, 10.0.0.1-10.0.3.255), comma separated
    #[arg(required = true, value_name = "TARGETS")]
    pub targets: Vec<String>,

    /// Ports to probe, e.g. 1080,8000-8010
    #[arg(short, long, default_value = "1080")]
    pub ports: String,

    /// How to find open ports
    #[arg(short, long, value_enum, default_value_t = Mode::Connect)]
    pub strategy: Mode,

    /// Concurrent connects, or SYN packets per second for raw/capture
    #[arg(short, long, default_value_t = DEFAULT_SCAN_RATE)]
    pub rate: usize,

    #[arg(long, value_name = "MS", default_value_t = 3000)]
    pub connect_timeout: u64,

    /// URL fetched through each candidate proxy
    #[arg(long, default_value = DEFAULT_TEST_URL)]
    pub test_url: String,

    #[arg(long, value_name = "SECS", default_value_t = 15)]
    pub test_timeout: u64,

    /// Concurrent SOCKS5 checks
    #[arg(long, default_value_t = DEFAULT_VALIDATE_WORKERS)]
    pub validators: usize,

    /// How long raw/capture keep listening after the last SYN
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    pub linger: u64,

    /// Interface for raw/capture probes. Without it the route to the first
    /// target decides, and every probe leaves from that route's address
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Next hop for off-link capture probes, defaults to the system gateway
    #[arg(long)]
    pub gateway: Option<Ipv4Addr>,

    /// Also write working proxies to FILE, one per line
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Less output; repeat to keep only warnings and results
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(long)]
    pub no_banner: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Full TCP handshake, no privileges needed
    Connect,
    /// SYN probes over a raw socket
    Raw,
    /// SYN probes injected and captured on the interface
    Capture,
}

impl From<Mode> for Strategy {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Connect => Strategy::Connect,
            Mode::Raw => Strategy::RawSocket,
            Mode::Capture => Strategy::Capture,
        }
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn to_config(&self) -> ScanConfig {
        ScanConfig {
            strategy: self.strategy.into(),
            scan_rate: self.rate,
            connect_timeout: Duration::from_millis(self.connect_timeout),
            test_url: self.test_url.clone(),
            test_timeout: Duration::from_secs(self.test_timeout),
            validate_workers: self.validators,
            reply_linger: Duration::from_millis(self.linger),
            interface: self.interface.clone(),
            gateway: self.gateway,
            ..ScanConfig::default()
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
