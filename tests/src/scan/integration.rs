#![cfg(test)]
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use pnet::ipnetwork::Ipv4Network;
use proxyscan_common::progress::NoProgress;
use proxyscan_core::{ScanConfig, ScanState, Scanner};

use crate::utils::{self, LISTEN_ADDR, TEST_URL};

fn scanner() -> Scanner {
    let config = ScanConfig {
        scan_rate: 16,
        connect_timeout: Duration::from_millis(500),
        test_url: TEST_URL.to_string(),
        test_timeout: Duration::from_secs(3),
        validate_workers: 4,
        ..ScanConfig::default()
    };
    Scanner::new(config).with_progress(Arc::new(NoProgress))
}

fn loopback_slash_30() -> Vec<Ipv4Network> {
    vec![Ipv4Network::new(Ipv4Addr::new(127, 0, 0, 0), 30).unwrap()]
}

/// The connect scanner on a /30 with nothing listening finds nothing.
#[tokio::test]
#[cfg(target_os = "linux")]
async fn empty_range_yields_no_proxies() {
    let port: u16 = utils::free_port(LISTEN_ADDR).await.unwrap();
    let scanner = scanner();

    let result = scanner.scan_all(&loopback_slash_30(), &[port]).await;

    assert!(result.is_ok(), "Scan failed: {:?}", result.as_ref().err());
    assert!(result.unwrap().is_empty());
    assert_eq!(scanner.state(), ScanState::Phase2Done);
}

/// A SOCKS5 server in the range is reported, and only that endpoint.
#[tokio::test]
#[cfg(target_os = "linux")]
async fn socks5_server_is_found() {
    let proxy: SocketAddrV4 = utils::spawn_socks5_server(LISTEN_ADDR).await.unwrap();
    let scanner = scanner();

    let result = scanner
        .scan_all(&loopback_slash_30(), &[proxy.port()])
        .await
        .unwrap();

    assert_eq!(result, vec![proxy]);
    assert_eq!(result[0].to_string(), format!("127.0.0.2:{}", proxy.port()));
}

/// A plain TCP service passes phase one but not phase two.
#[tokio::test]
#[cfg(target_os = "linux")]
async fn plain_tcp_service_is_alive_but_rejected() {
    let service: SocketAddrV4 = utils::spawn_plain_server(LISTEN_ADDR).await.unwrap();
    let scanner = scanner();

    let alive = scanner
        .find_alive(&loopback_slash_30(), &[service.port()])
        .await
        .unwrap();
    assert!(alive.contains(&service), "{service} missing from {alive:?}");
    assert_eq!(scanner.state(), ScanState::Phase1Done);

    let proxies = scanner.find_proxies(alive).await;
    assert!(!proxies.contains(&service));
    assert_eq!(scanner.state(), ScanState::Phase2Done);
}

/// Both kinds side by side: only the SOCKS5 endpoint survives validation.
#[tokio::test]
#[cfg(target_os = "linux")]
async fn mixed_services_are_told_apart() {
    let proxy = utils::spawn_socks5_server(LISTEN_ADDR).await.unwrap();
    let plain = utils::spawn_plain_server(LISTEN_ADDR).await.unwrap();
    let scanner = scanner();

    let alive = scanner
        .find_alive(&loopback_slash_30(), &[proxy.port(), plain.port()])
        .await
        .unwrap();
    assert!(alive.contains(&proxy));
    assert!(alive.contains(&plain));

    let proxies = scanner.find_proxies(alive).await;
    assert_eq!(proxies, vec![proxy]);
}

/// Needs root. Same as `socks5_server_is_found` with raw SYN probes.
#[tokio::test]
#[ignore]
#[cfg(target_os = "linux")]
async fn socks5_server_is_found_with_raw_probes() {
    let proxy = utils::spawn_socks5_server(LISTEN_ADDR).await.unwrap();
    let config = ScanConfig {
        strategy: proxyscan_core::Strategy::RawSocket,
        scan_rate: 1000,
        reply_linger: Duration::from_millis(500),
        test_url: TEST_URL.to_string(),
        test_timeout: Duration::from_secs(3),
        ..ScanConfig::default()
    };
    let scanner = Scanner::new(config).with_progress(Arc::new(NoProgress));

    let result = scanner
        .scan_all(&loopback_slash_30(), &[proxy.port()])
        .await
        .unwrap();
    assert_eq!(result, vec![proxy]);
}
