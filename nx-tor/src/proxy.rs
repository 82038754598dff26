use crate::config::TorConfig;
use crate::error::{Result, TorError};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

const PROXIED_SCHEMES: [&str; 2] = ["http", "https"];

/// Scheme-to-proxy mapping for routing HTTP traffic through the local SOCKS
/// listener. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorProxies {
    socks_addr: SocketAddr,
    proxies: BTreeMap<String, String>,
}

impl TorProxies {
    pub fn new(socks_addr: SocketAddr) -> Self {
        let uri = format!("socks5://{socks_addr}");
        let proxies = PROXIED_SCHEMES
            .iter()
            .map(|scheme| (scheme.to_string(), uri.clone()))
            .collect();
        Self {
            socks_addr,
            proxies,
        }
    }

    pub fn socks_addr(&self) -> SocketAddr {
        self.socks_addr
    }

    pub fn proxies(&self) -> &BTreeMap<String, String> {
        &self.proxies
    }

    pub fn get(&self, scheme: &str) -> Option<&str> {
        self.proxies.get(scheme).map(String::as_str)
    }

    /// Build a reqwest client that sends every mapped scheme through its proxy.
    #[tracing::instrument(level = "debug", skip_all, fields(socks_addr = %self.socks_addr))]
    pub fn build_http_client(&self, timeout: Duration) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        for (scheme, uri) in &self.proxies {
            let proxy = match scheme.as_str() {
                "http" => reqwest::Proxy::http(uri),
                "https" => reqwest::Proxy::https(uri),
                other => {
                    return Err(TorError::Config(format!(
                        "unsupported proxied scheme: {other}"
                    )));
                }
            }
            .map_err(|e| TorError::Config(format!("invalid proxy uri {uri}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| TorError::Http(format!("build proxied client: {e}")))
    }
}

impl Default for TorProxies {
    fn default() -> Self {
        Self::new(TorConfig::default().socks_addr)
    }
}
