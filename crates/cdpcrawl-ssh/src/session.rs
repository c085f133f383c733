//! Session seams: credentials, targets and the CLI session traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },
    #[error("Authentication rejected by {0}")]
    AuthRejected(String),
    #[error("Timed out on {host} waiting for output of {command:?}")]
    Timeout { host: String, command: String },
    #[error("No stable prompt from {0}")]
    PromptNotFound(String),
    #[error("Session to {0} closed unexpectedly")]
    Closed(String),
    #[error("SSH transport error: {0}")]
    Ssh(#[from] russh::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Username/password pair, assumed valid once the pre-flight check passes
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Shell flavour of the remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// IOS / IOS-XE switches and routers
    Ios,
    /// Wireless LAN controller (in-band User:/Password: login)
    Wlc,
}

impl Platform {
    /// Command that turns off `--More--` paging
    pub fn paging_command(&self) -> &'static str {
        match self {
            Platform::Ios => "terminal length 0",
            Platform::Wlc => "config paging disable",
        }
    }
}

/// Where to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    /// Host name as known to the crawl
    pub host: String,
    /// Pre-resolved address; the host name is dialled when absent
    pub address: Option<IpAddr>,
    pub platform: Platform,
}

impl SessionTarget {
    pub fn ios(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            address: None,
            platform: Platform::Ios,
        }
    }

    pub fn wlc(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            address: None,
            platform: Platform::Wlc,
        }
    }

    pub fn with_address(mut self, address: Option<IpAddr>) -> Self {
        self.address = address;
        self
    }

    /// String handed to the socket layer
    pub fn dial_host(&self) -> String {
        self.address
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.host.clone())
    }
}

/// An open remote CLI session
///
/// Commands run strictly one at a time; each call returns once the command's
/// output has been read up to the next prompt.
#[async_trait]
pub trait CliSession: Send {
    /// Host this session is connected to
    fn host(&self) -> &str;

    /// Read the current prompt
    async fn find_prompt(&mut self) -> Result<String, SessionError>;

    /// Run one command and return its output without echo or prompt
    async fn send_command(&mut self, command: &str) -> Result<String, SessionError>;

    /// Close the session
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens sessions to devices
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: &SessionTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn CliSession>, SessionError>;
}
