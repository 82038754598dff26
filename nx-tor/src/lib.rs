//! Tor routing helper for Nexum.
//!
//! Exposes the SOCKS proxy mapping for a local Tor daemon, asks the daemon for
//! a new exit identity over its control port, and reports the externally
//! visible address through a what-is-my-ip endpoint.
//!
//! Nothing here is global: build a [`TorClient`] and pass it to whatever needs
//! proxied HTTP.

mod client;
mod config;
mod control;
mod error;
mod proxy;
mod types;

pub use client::TorClient;
pub use config::{DEFAULT_CHECK_IP_URL, DEFAULT_CONTROL_PORT, DEFAULT_SOCKS_PORT, TorConfig};
pub use error::{Result, TorError};
pub use proxy::TorProxies;
pub use types::{AuthMethod, ControlReply, ProtocolInfo, Signal};
