//! Phase two: does a live endpoint actually relay traffic as a SOCKS5 proxy.
//!
//! The check is end to end. An HTTP GET for the test URL is sent through the
//! endpoint with remote name resolution (`socks5h`), and whatever comes back
//! is judged by the configured success predicate.

use std::net::SocketAddrV4;
use std::time::Duration;

use reqwest::{Client, Proxy, Response};
use tracing::debug;

use crate::config::{ScanConfig, SuccessPredicate};

#[derive(Clone)]
pub struct Socks5Validator {
    test_url: String,
    timeout: Duration,
    predicate: SuccessPredicate,
}

impl Socks5Validator {
    pub fn new(test_url: impl Into<String>, timeout: Duration, predicate: SuccessPredicate) -> Self {
        Self {
            test_url: test_url.into(),
            timeout,
            predicate,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.test_url.clone(),
            config.test_timeout,
            config.success_predicate.clone(),
        )
    }

    fn client_for(&self, endpoint: SocketAddrV4) -> reqwest::Result<Client> {
        let proxy = Proxy::all(format!("socks5h://{endpoint}"))?;
        Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()
    }

    /// Single attempt, no retry. Every failure is a plain `false`.
    pub async fn validate(&self, endpoint: SocketAddrV4) -> bool {
        let client: Client = match self.client_for(endpoint) {
            Ok(client) => client,
            Err(e) => {
                debug!("{endpoint} could not build SOCKS5 client: {e}");
                return false;
            }
        };

        let response: Option<Response> = match client.get(&self.test_url).send().await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!("{endpoint} test request failed: {e}");
                None
            }
        };

        let passed: bool = (self.predicate)(response.as_ref());
        if let Some(response) = &response {
            debug!("{endpoint} answered {}", response.status());
        }
        drop(response);
        drop(client);
        passed
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
