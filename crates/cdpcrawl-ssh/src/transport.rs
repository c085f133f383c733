//! Interactive-shell SSH transport built on russh
//!
//! Network gear rarely supports more than one exec channel per connection, so
//! a single PTY shell is opened and commands are written to it one at a time,
//! reading until the device prompt reappears.

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace};

use crate::session::{CliSession, Connector, Credentials, SessionError, SessionTarget};

/// Default SSH port
pub const SSH_PORT: u16 = 22;

/// Default time allowed for TCP connect plus key exchange
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default time allowed for one command's output
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

const PROMPT_ATTEMPTS: usize = 4;

/// Transport tuning
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            port: SSH_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }
}

/// Opens russh shell sessions
pub struct SshConnector {
    options: SshOptions,
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new(options: SshOptions) -> Self {
        let config = client::Config {
            inactivity_timeout: Some(options.command_timeout * 2),
            ..Default::default()
        };
        Self {
            options,
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        target: &SessionTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn CliSession>, SessionError> {
        let session =
            SshSession::open(target, credentials, &self.options, self.config.clone()).await?;
        Ok(Box::new(session))
    }
}

/// Host keys are not pinned; devices are addressed through inventory names
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One open shell on a device
pub struct SshSession {
    host: String,
    handle: Handle<ClientHandler>,
    channel: Channel<Msg>,
    prompt: String,
    command_timeout: Duration,
}

impl SshSession {
    /// Connect, authenticate, open a shell and disable paging
    pub async fn open(
        target: &SessionTarget,
        credentials: &Credentials,
        options: &SshOptions,
        config: Arc<client::Config>,
    ) -> Result<Self, SessionError> {
        let host = target.host.clone();
        let dial = target.dial_host();
        debug!(host = %host, addr = %dial, port = options.port, "Opening SSH session");

        let connect = client::connect(config, (dial.as_str(), options.port), ClientHandler);
        let mut handle = timeout(options.connect_timeout, connect)
            .await
            .map_err(|_| SessionError::Connect {
                host: host.clone(),
                reason: "connection timed out".to_string(),
            })?
            .map_err(|e| SessionError::Connect {
                host: host.clone(),
                reason: e.to_string(),
            })?;

        let auth = handle
            .authenticate_password(credentials.username(), credentials.password())
            .await?;
        if !auth.success() {
            return Err(SessionError::AuthRejected(host));
        }

        let channel = handle.channel_open_session().await?;
        channel
            .request_pty(false, "vt100", 511, 24, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;

        let mut session = Self {
            host,
            handle,
            channel,
            prompt: String::new(),
            command_timeout: options.command_timeout,
        };

        session.login(credentials).await?;
        session.send_command(target.platform.paging_command()).await?;

        debug!(host = %session.host, prompt = %session.prompt, "SSH session ready");
        Ok(session)
    }

    /// Answer any in-band login prompts and learn the device prompt
    async fn login(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        let mut sent_username = false;
        let mut sent_password = false;

        loop {
            let output = self.read_until("login", |buf| login_step(buf).is_some()).await?;
            match login_step(&output) {
                Some(LoginStep::Username) if !sent_username => {
                    self.write_line(credentials.username()).await?;
                    sent_username = true;
                }
                Some(LoginStep::Password) if !sent_password => {
                    self.write_line(credentials.password()).await?;
                    sent_password = true;
                }
                Some(LoginStep::Prompt(prompt)) => {
                    self.prompt = prompt;
                    return self.settle_prompt().await;
                }
                _ => return Err(SessionError::AuthRejected(self.host.clone())),
            }
        }
    }

    /// Re-read the prompt until two consecutive readings agree
    ///
    /// Banner text can trail the login exchange in separate chunks.
    async fn settle_prompt(&mut self) -> Result<(), SessionError> {
        let mut previous: Option<String> = None;
        for _ in 0..PROMPT_ATTEMPTS {
            self.write_line("").await?;
            let output = self.read_until("prompt", |buf| detect_prompt(buf).is_some()).await?;
            let current = detect_prompt(&output);
            if current.is_some() && current == previous {
                if let Some(prompt) = current {
                    trace!(host = %self.host, prompt = %prompt, "Prompt confirmed");
                    self.prompt = prompt;
                }
                return Ok(());
            }
            previous = current;
        }
        Err(SessionError::PromptNotFound(self.host.clone()))
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        let data = format!("{}\n", line);
        self.channel.data(data.as_bytes()).await?;
        Ok(())
    }

    /// Accumulate channel output until `done` accepts the buffer
    async fn read_until<F>(&mut self, context: &str, done: F) -> Result<String, SessionError>
    where
        F: Fn(&str) -> bool,
    {
        let deadline = Instant::now() + self.command_timeout;
        let mut buffer = String::new();

        while !done(&buffer) {
            let msg = timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| SessionError::Timeout {
                    host: self.host.clone(),
                    command: context.to_string(),
                })?;

            match msg {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    buffer.push_str(&String::from_utf8_lossy(&data));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(SessionError::Closed(self.host.clone()));
                }
                Some(_) => {}
            }
        }

        Ok(buffer)
    }
}

#[async_trait]
impl CliSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn find_prompt(&mut self) -> Result<String, SessionError> {
        self.write_line("").await?;
        let output = self.read_until("prompt", |buf| detect_prompt(buf).is_some()).await?;
        if let Some(prompt) = detect_prompt(&output) {
            self.prompt = prompt;
        }
        Ok(self.prompt.clone())
    }

    async fn send_command(&mut self, command: &str) -> Result<String, SessionError> {
        trace!(host = %self.host, command = %command, "Sending command");
        self.write_line(command).await?;

        let prompt = self.prompt.clone();
        let raw = self
            .read_until(command, |buf| ends_with_prompt(buf, &prompt))
            .await?;
        Ok(clean_output(&raw, command, &prompt))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let _ = self.channel.eof().await;
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        debug!(host = %self.host, "SSH session closed");
        Ok(())
    }
}

/// What the login exchange is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoginStep {
    Username,
    Password,
    Prompt(String),
}

fn last_line(buffer: &str) -> Option<&str> {
    buffer
        .split(|c| c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
}

fn login_step(buffer: &str) -> Option<LoginStep> {
    let last = last_line(buffer)?;
    let lower = last.to_ascii_lowercase();
    if lower.ends_with("user:") || lower.ends_with("username:") {
        Some(LoginStep::Username)
    } else if lower.ends_with("password:") {
        Some(LoginStep::Password)
    } else {
        detect_prompt(buffer).map(LoginStep::Prompt)
    }
}

/// Exec (`#`) or user (`>`) mode prompt on the last line of output
///
/// A prompt starts with the host name (or `(` on controllers); banner art such
/// as `#####` or `# Authorized access only #` does not.
fn detect_prompt(buffer: &str) -> Option<String> {
    let last = last_line(buffer)?;
    let starts_like_host = last
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '(')
        .unwrap_or(false);
    if starts_like_host && (last.ends_with('#') || last.ends_with('>')) {
        Some(last.to_string())
    } else {
        None
    }
}

fn ends_with_prompt(buffer: &str, prompt: &str) -> bool {
    last_line(buffer).map(|line| line == prompt).unwrap_or(false)
}

/// Strip the echoed command and the trailing prompt from raw shell output
fn clean_output(raw: &str, command: &str, prompt: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "");
    let mut lines: Vec<&str> = normalized.lines().collect();

    if lines
        .first()
        .map(|l| !command.is_empty() && l.trim_end().ends_with(command.trim()))
        .unwrap_or(false)
    {
        lines.remove(0);
    }
    while lines.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        lines.pop();
    }
    if lines.last().map(|l| l.trim() == prompt).unwrap_or(false) {
        lines.pop();
    }

    lines.join("\n")
}
