//! Minimal Tor control-port client.
//!
//! Covers what identity rotation needs: `PROTOCOLINFO`, `AUTHENTICATE`,
//! `SIGNAL` and `QUIT`. A connection lives for exactly one operation; callers
//! finish with [`ControlConnection::close`] and every error path drops the
//! socket, which closes it.

use crate::error::{Result, TorError};
use crate::types::{AuthMethod, ControlReply, ProtocolInfo, Signal};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const AUTH_COOKIE_LEN: usize = 32;

pub(crate) struct ControlConnection {
    addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ControlConnection {
    #[tracing::instrument(level = "debug", skip_all, fields(%addr))]
    pub(crate) async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TorError::Connect(format!("control port {addr}: {e}")))?;
        let (read, write) = stream.into_split();
        tracing::debug!(%addr, "control connection opened");
        Ok(Self {
            addr,
            reader: BufReader::new(read),
            writer: write,
        })
    }

    pub(crate) async fn protocol_info(&mut self) -> Result<ProtocolInfo> {
        let reply = self.request("PROTOCOLINFO 1").await?;
        if !reply.is_ok() {
            return Err(TorError::Protocol(format!(
                "PROTOCOLINFO rejected: status={} message={}",
                reply.code,
                reply.message()
            )));
        }
        let info = parse_protocol_info(&reply)?;
        tracing::debug!(
            auth_methods = ?info.auth_methods.iter().map(AuthMethod::as_str).collect::<Vec<_>>(),
            tor_version = ?info.tor_version,
            "protocol info received"
        );
        Ok(info)
    }

    pub(crate) async fn authenticate(
        &mut self,
        info: &ProtocolInfo,
        password: Option<&str>,
    ) -> Result<()> {
        let (method, credential) = select_credential(info, password).await?;
        let command = match credential {
            Some(credential) => format!("AUTHENTICATE {credential}"),
            None => "AUTHENTICATE".to_string(),
        };
        let reply = self.request(&command).await?;
        if !reply.is_ok() {
            return Err(TorError::Authentication(format!(
                "method={} status={} message={}",
                method.as_str(),
                reply.code,
                reply.message()
            )));
        }
        tracing::debug!(method = method.as_str(), "control connection authenticated");
        Ok(())
    }

    pub(crate) async fn signal(&mut self, signal: Signal) -> Result<()> {
        let reply = self.request(&format!("SIGNAL {signal}")).await?;
        if !reply.is_ok() {
            return Err(TorError::SignalRejected {
                code: reply.code,
                message: reply.message().to_string(),
            });
        }
        Ok(())
    }

    /// Say goodbye and shut the socket down. Failures here are logged only;
    /// the connection is released either way.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.request("QUIT").await {
            tracing::debug!(addr = %self.addr, %e, "control QUIT not acknowledged");
        }
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(addr = %self.addr, %e, "control socket shutdown failed");
        }
        tracing::debug!(addr = %self.addr, "control connection closed");
    }

    async fn request(&mut self, command: &str) -> Result<ControlReply> {
        self.send(command).await?;
        self.read_reply().await
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        let mut line = String::with_capacity(command.len() + 2);
        line.push_str(command);
        line.push_str("\r\n");
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TorError::Protocol(format!("write to {}: {e}", self.addr)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TorError::Protocol(format!("flush to {}: {e}", self.addr)))
    }

    async fn read_reply(&mut self) -> Result<ControlReply> {
        let mut parser = ReplyParser::default();
        loop {
            let mut buf = String::new();
            let n = self
                .reader
                .read_line(&mut buf)
                .await
                .map_err(|e| TorError::Protocol(format!("read from {}: {e}", self.addr)))?;
            if n == 0 {
                return Err(TorError::Protocol(format!(
                    "control connection {} closed before reply completed",
                    self.addr
                )));
            }
            let line = buf.trim_end_matches(['\r', '\n']);
            if let Some(reply) = parser.push(line)? {
                return Ok(reply);
            }
        }
    }
}

/// Incremental reply framing: `CCC-` mid lines, `CCC+` lines followed by a
/// dot-terminated data block, and a final `CCC ` line.
#[derive(Debug, Default)]
struct ReplyParser {
    lines: Vec<String>,
    in_data: bool,
}

impl ReplyParser {
    fn push(&mut self, line: &str) -> Result<Option<ControlReply>> {
        if self.in_data {
            if line == "." {
                self.in_data = false;
                return Ok(None);
            }
            let data = line.strip_prefix('.').unwrap_or(line);
            if let Some(last) = self.lines.last_mut() {
                last.push('\n');
                last.push_str(data);
            }
            return Ok(None);
        }

        let (Some(code), Some(sep)) = (line.get(..3), line.get(3..4)) else {
            return Err(TorError::Protocol(format!("malformed reply line: {line:?}")));
        };
        let code: u16 = code
            .parse()
            .map_err(|_| TorError::Protocol(format!("malformed status code: {line:?}")))?;
        let text = line.get(4..).unwrap_or("").to_string();

        match sep {
            "-" => {
                self.lines.push(text);
                Ok(None)
            }
            "+" => {
                self.lines.push(text);
                self.in_data = true;
                Ok(None)
            }
            " " => {
                self.lines.push(text);
                Ok(Some(ControlReply {
                    code,
                    lines: std::mem::take(&mut self.lines),
                }))
            }
            _ => Err(TorError::Protocol(format!(
                "malformed reply separator: {line:?}"
            ))),
        }
    }
}

fn parse_protocol_info(reply: &ControlReply) -> Result<ProtocolInfo> {
    let mut info = ProtocolInfo::default();
    for line in &reply.lines {
        let (keyword, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        match keyword {
            "PROTOCOLINFO" => info.protocol_version = rest.trim().parse().ok(),
            "AUTH" => {
                for (key, value) in parse_key_values(rest)? {
                    match key.as_str() {
                        "METHODS" => {
                            info.auth_methods = value
                                .split(',')
                                .filter(|m| !m.trim().is_empty())
                                .map(AuthMethod::parse)
                                .collect();
                        }
                        "COOKIEFILE" => info.cookie_file = Some(PathBuf::from(value)),
                        _ => {}
                    }
                }
            }
            "VERSION" => {
                for (key, value) in parse_key_values(rest)? {
                    if key == "Tor" {
                        info.tor_version = Some(value);
                    }
                }
            }
            _ => {}
        }
    }
    if info.auth_methods.is_empty() {
        return Err(TorError::Protocol(
            "PROTOCOLINFO reply has no AUTH METHODS".to_string(),
        ));
    }
    Ok(info)
}

/// Split `KEY=value KEY="quoted value"` pairs; quoted values honour
/// backslash escapes.
fn parse_key_values(input: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if_eq(&' ').is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ' ') {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            out.push((key, String::new()));
            continue;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => break,
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(TorError::Protocol(format!(
                    "unterminated quoted string: {input:?}"
                )));
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ' ') {
                value.push(c);
            }
        }
        out.push((key, value));
    }
    Ok(out)
}

/// Pick the credential to send, in the order: no auth, password, cookie file.
async fn select_credential(
    info: &ProtocolInfo,
    password: Option<&str>,
) -> Result<(AuthMethod, Option<String>)> {
    if info.supports(&AuthMethod::Null) {
        return Ok((AuthMethod::Null, None));
    }

    if info.supports(&AuthMethod::HashedPassword) {
        if let Some(password) = password {
            return Ok((AuthMethod::HashedPassword, Some(quote(password))));
        }
    }

    if info.supports(&AuthMethod::Cookie) {
        if let Some(path) = info.cookie_file.as_ref() {
            let cookie = tokio::fs::read(path).await.map_err(|e| {
                TorError::Authentication(format!("read cookie file {}: {e}", path.display()))
            })?;
            if cookie.len() != AUTH_COOKIE_LEN {
                return Err(TorError::Authentication(format!(
                    "cookie file {} is {} bytes, expected {AUTH_COOKIE_LEN}",
                    path.display(),
                    cookie.len()
                )));
            }
            let hex = cookie.iter().map(|b| format!("{b:02x}")).collect();
            return Ok((AuthMethod::Cookie, Some(hex)));
        }
    }

    if info.supports(&AuthMethod::HashedPassword) {
        return Err(TorError::Authentication(
            "daemon requires a control password but none is configured".to_string(),
        ));
    }

    Err(TorError::Authentication(format!(
        "no supported auth method offered: {}",
        info.auth_methods
            .iter()
            .map(AuthMethod::as_str)
            .collect::<Vec<_>>()
            .join(",")
    )))
}

fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
