use std::fmt;
use std::path::PathBuf;

/// Signals accepted by the control port's `SIGNAL` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Reload,
    Shutdown,
    Dump,
    Debug,
    Halt,
    /// Switch to clean circuits so new requests get a new exit identity.
    NewNym,
    ClearDnsCache,
    Heartbeat,
    Active,
    Dormant,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Reload => "RELOAD",
            Signal::Shutdown => "SHUTDOWN",
            Signal::Dump => "DUMP",
            Signal::Debug => "DEBUG",
            Signal::Halt => "HALT",
            Signal::NewNym => "NEWNYM",
            Signal::ClearDnsCache => "CLEARDNSCACHE",
            Signal::Heartbeat => "HEARTBEAT",
            Signal::Active => "ACTIVE",
            Signal::Dormant => "DORMANT",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Null,
    HashedPassword,
    Cookie,
    SafeCookie,
    Other(String),
}

impl AuthMethod {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NULL" => AuthMethod::Null,
            "HASHEDPASSWORD" => AuthMethod::HashedPassword,
            "COOKIE" => AuthMethod::Cookie,
            "SAFECOOKIE" => AuthMethod::SafeCookie,
            other => AuthMethod::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthMethod::Null => "NULL",
            AuthMethod::HashedPassword => "HASHEDPASSWORD",
            AuthMethod::Cookie => "COOKIE",
            AuthMethod::SafeCookie => "SAFECOOKIE",
            AuthMethod::Other(s) => s,
        }
    }
}

/// What the daemon reported in its `PROTOCOLINFO` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub protocol_version: Option<u32>,
    pub auth_methods: Vec<AuthMethod>,
    pub cookie_file: Option<PathBuf>,
    pub tor_version: Option<String>,
}

impl ProtocolInfo {
    pub fn supports(&self, method: &AuthMethod) -> bool {
        self.auth_methods.iter().any(|m| m == method)
    }
}

/// One complete control-port reply: a status code and its text lines.
///
/// Data blocks (`CCC+` lines) are folded into the owning line, joined by `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl ControlReply {
    pub fn is_ok(&self) -> bool {
        self.code == 250 || self.code == 251
    }

    /// Text of the final line, which carries the status message.
    pub fn message(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }
}
