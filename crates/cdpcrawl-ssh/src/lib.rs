//! cdp-crawler SSH - Remote CLI sessions to network devices
//!
//! This crate wraps russh to provide one-command-at-a-time shell sessions
//! against switches, routers and wireless controllers. The `Connector` and
//! `CliSession` traits are the seam the discovery crate probes through.

pub mod session;
pub mod transport;

pub use session::{CliSession, Connector, Credentials, Platform, SessionError, SessionTarget};
pub use transport::{SshConnector, SshOptions, SshSession, SSH_PORT};
