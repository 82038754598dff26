use crate::config::TorConfig;
use crate::control::ControlConnection;
use crate::error::{Result, TorError};
use crate::proxy::TorProxies;
use crate::types::{ProtocolInfo, Signal};
use std::future::Future;

/// Caller-owned handle to a local Tor daemon.
///
/// Holds the proxy mapping and a reqwest client routed through it. Control
/// port connections are opened per call and never shared.
#[derive(Debug, Clone)]
pub struct TorClient {
    config: TorConfig,
    proxies: TorProxies,
    http: reqwest::Client,
}

impl TorClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(config: TorConfig) -> Result<Self> {
        config.validate()?;
        let proxies = TorProxies::new(config.socks_addr);
        let http = proxies.build_http_client(config.request_timeout())?;
        Ok(Self {
            config,
            proxies,
            http,
        })
    }

    pub fn config(&self) -> &TorConfig {
        &self.config
    }

    pub fn proxies(&self) -> &TorProxies {
        &self.proxies
    }

    /// Client whose http and https traffic goes through the SOCKS listener.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Ask the daemon for clean circuits. Returns once `SIGNAL NEWNYM` is
    /// acknowledged; the new exit identity takes effect asynchronously.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn request_new_identity(&self) -> Result<()> {
        self.send_signal(Signal::NewNym).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(%signal))]
    pub async fn send_signal(&self, signal: Signal) -> Result<()> {
        let addr = self.config.control_addr;
        let password = self.config.control_password.as_deref();
        self.with_control_timeout("signal", async move {
            let mut conn = ControlConnection::connect(addr).await?;
            let result = async {
                let info = conn.protocol_info().await?;
                conn.authenticate(&info, password).await?;
                conn.signal(signal).await
            }
            .await;
            conn.close().await;
            result
        })
        .await?;
        tracing::info!(%signal, control_addr = %addr, "control signal accepted");
        Ok(())
    }

    /// Query auth methods and version without authenticating.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn protocol_info(&self) -> Result<ProtocolInfo> {
        let addr = self.config.control_addr;
        self.with_control_timeout("protocolinfo", async move {
            let mut conn = ControlConnection::connect(addr).await?;
            let result = conn.protocol_info().await;
            conn.close().await;
            result
        })
        .await
    }

    /// GET the configured what-is-my-ip endpoint through the proxy and return
    /// the parsed JSON body as-is.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn check_external_identity(&self) -> Result<serde_json::Value> {
        let response = self.http.get(&self.config.check_ip_url).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(%status, url = %self.config.check_ip_url, "egress check failed");
            return Err(TorError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)?;
        tracing::debug!(url = %self.config.check_ip_url, "egress check succeeded");
        Ok(parsed)
    }

    async fn with_control_timeout<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.control_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TorError::Timeout(format!(
                "control {op} on {} exceeded {}ms",
                self.config.control_addr,
                timeout.as_millis()
            ))),
        }
    }
}
