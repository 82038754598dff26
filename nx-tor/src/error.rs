use thiserror::Error;

pub type Result<T> = std::result::Result<T, TorError>;

#[derive(Debug, Error)]
pub enum TorError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("signal rejected: status={code} message={message}")]
    SignalRejected { code: u16, message: String },

    #[error("control protocol error: {0}")]
    Protocol(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("http status={status} body={body}")]
    HttpStatus { status: u16, body: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl From<reqwest::Error> for TorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(e.to_string());
        }
        if e.is_connect() {
            return Self::Connect(e.to_string());
        }
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for TorError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}

impl From<toml::de::Error> for TorError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
