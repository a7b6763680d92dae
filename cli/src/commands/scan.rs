use std::fs;
use std::net::SocketAddrV4;
use std::sync::Arc;

use anyhow::Context;
use is_root::is_root;
use pnet::ipnetwork::Ipv4Network;
use proxyscan_common::network::ports::parse_ports;
use proxyscan_common::network::range::prefix_size;
use proxyscan_common::network::target::parse_targets;
use proxyscan_common::progress::{LogProgress, ProgressReporter};
use proxyscan_core::{ScanConfig, Scanner, Strategy};
use tracing::{Instrument, info_span, warn};

use crate::commands::CommandLine;
use crate::terminal::print;
use crate::terminal::progress::BarProgress;

pub async fn scan(args: &CommandLine) -> anyhow::Result<Vec<SocketAddrV4>> {
    let prefixes: Vec<Ipv4Network> = parse_targets(&args.targets).context("invalid target")?;
    let ports: Vec<u16> = parse_ports(&args.ports).context("invalid port list")?;
    let config: ScanConfig = args.to_config();

    if config.strategy != Strategy::Connect && !is_root() {
        warn!(
            "The {} strategy opens raw sockets, expect a permission error without root or CAP_NET_RAW",
            config.strategy
        );
    }

    print::header("scan settings", args.quiet);
    summary(&prefixes, &ports, &config, args.quiet);

    let span = info_span!("scan");
    let reporter: Arc<dyn ProgressReporter> = if args.quiet == 0 {
        Arc::new(BarProgress::new(span.clone()))
    } else {
        Arc::new(LogProgress)
    };
    let scanner = Scanner::new(config).with_progress(reporter);

    print::header("scanning", args.quiet);
    let proxies: Vec<SocketAddrV4> = scanner
        .scan_all(&prefixes, &ports)
        .instrument(span)
        .await?;

    report(&proxies, args)?;
    Ok(proxies)
}

fn summary(prefixes: &[Ipv4Network], ports: &[u16], config: &ScanConfig, q_level: u8) {
    if q_level > 0 {
        return;
    }
    let addresses: u64 = prefixes.iter().map(prefix_size).sum();
    print::aligned_line("Addresses", addresses);
    print::aligned_line("Ports", ports.len());
    print::aligned_line("Strategy", config.strategy);
    print::aligned_line("Rate", config.scan_rate);
    print::aligned_line("Validators", config.validate_workers);
    print::aligned_line("Test URL", &config.test_url);
}

fn report(proxies: &[SocketAddrV4], args: &CommandLine) -> anyhow::Result<()> {
    print::header("results", args.quiet);
    if proxies.is_empty() {
        print::no_results(args.quiet);
    }
    for (idx, proxy) in proxies.iter().enumerate() {
        print::endpoint_line(idx + 1, &proxy.to_string());
    }

    for proxy in proxies {
        println!("{proxy}");
    }

    if let Some(path) = &args.output {
        let mut contents: String = proxies
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        print::print_status(format!("Saved {} proxies to {}", proxies.len(), path.display()));
    }
    Ok(())
}
