//! Tor helper configuration.
//!
//! Every field has a default matching a stock local Tor daemon, so an empty
//! TOML document is a valid config.

use crate::error::{Result, TorError};
use reqwest::Url;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SOCKS_PORT: u16 = 9050;
pub const DEFAULT_CONTROL_PORT: u16 = 9051;
pub const DEFAULT_CHECK_IP_URL: &str = "http://httpbin.org/ip";

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TorConfig {
    /// Local SOCKS listener that outbound HTTP traffic is routed through.
    #[serde(default = "default_socks_addr")]
    pub socks_addr: SocketAddr,
    #[serde(default = "default_control_addr")]
    pub control_addr: SocketAddr,
    /// Used only when the daemon offers `HASHEDPASSWORD` authentication.
    #[serde(default)]
    pub control_password: Option<String>,
    #[serde(default = "default_check_ip_url")]
    pub check_ip_url: String,
    /// Upper bound for one whole control-port round trip.
    #[serde(default = "default_control_timeout_ms")]
    pub control_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_socks_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_SOCKS_PORT))
}

fn default_control_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_CONTROL_PORT))
}

fn default_check_ip_url() -> String {
    DEFAULT_CHECK_IP_URL.to_string()
}

fn default_control_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl std::fmt::Debug for TorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorConfig")
            .field("socks_addr", &self.socks_addr)
            .field("control_addr", &self.control_addr)
            .field(
                "control_password",
                &self.control_password.as_ref().map(|_| "<redacted>"),
            )
            .field("check_ip_url", &self.check_ip_url)
            .field("control_timeout_ms", &self.control_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_addr: default_socks_addr(),
            control_addr: default_control_addr(),
            control_password: None,
            check_ip_url: default_check_ip_url(),
            control_timeout_ms: default_control_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl TorConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: TorConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TorError::Config(format!("read config {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
            .map_err(|e| TorError::Config(format!("parse config {}: {e}", path.display())))
    }

    pub fn with_control_password(mut self, password: Option<String>) -> Self {
        self.control_password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(self.check_ip_url.trim())
            .map_err(|e| TorError::Config(format!("invalid check_ip_url: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(TorError::Config(format!(
                    "invalid check_ip_url scheme: {other}"
                )));
            }
        }
        if self.control_timeout_ms == 0 {
            return Err(TorError::Config(
                "control_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(TorError::Config(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_stock_daemon_defaults() {
        let cfg = TorConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(cfg, TorConfig::default());
        assert_eq!(cfg.socks_addr.to_string(), "127.0.0.1:9050");
        assert_eq!(cfg.control_addr.to_string(), "127.0.0.1:9051");
        assert_eq!(cfg.check_ip_url, "http://httpbin.org/ip");
        assert!(cfg.control_password.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = TorConfig::from_toml_str(
            r#"
socks_addr = "127.0.0.1:19050"
control_addr = "127.0.0.1:19051"
control_password = "hunter2"
check_ip_url = "https://api.ipify.org?format=json"
control_timeout_ms = 500
"#,
        )
        .expect("config parses");
        assert_eq!(cfg.socks_addr.port(), 19050);
        assert_eq!(cfg.control_addr.port(), 19051);
        assert_eq!(cfg.control_password.as_deref(), Some("hunter2"));
        assert_eq!(cfg.control_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            TorConfig::from_toml_str("check_ip_url = \"ftp://example.com/ip\""),
            Err(TorError::Config(_))
        ));
        assert!(matches!(
            TorConfig::from_toml_str("request_timeout_ms = 0"),
            Err(TorError::Config(_))
        ));
        assert!(matches!(
            TorConfig::from_toml_str("socks_port = 9050"),
            Err(TorError::Config(_))
        ));
    }

    #[test]
    fn debug_output_redacts_password() {
        let cfg = TorConfig::default().with_control_password(Some("hunter2".to_string()));
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn empty_password_is_treated_as_unset() {
        let cfg = TorConfig::default().with_control_password(Some(String::new()));
        assert!(cfg.control_password.is_none());
    }

    #[tokio::test]
    async fn load_reads_toml_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tor.toml");
        tokio::fs::write(&path, "control_timeout_ms = 2500\n")
            .await
            .expect("write config");

        let cfg = TorConfig::load(&path).await.expect("load config");
        assert_eq!(cfg.control_timeout_ms, 2500);

        let missing = TorConfig::load(dir.path().join("missing.toml")).await;
        assert!(matches!(missing, Err(TorError::Config(_))));
    }
}
