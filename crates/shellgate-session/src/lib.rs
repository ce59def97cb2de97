pub mod broker;
pub mod registry;
pub mod session;
pub mod shell;
mod transport;

pub use broker::PasswordBroker;
pub use registry::SessionRegistry;
pub use session::Session;

use std::path::PathBuf;

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("command not allowed: {0}")]
    PolicyDenied(String),

    #[error("session not connected")]
    NotConnected,

    #[error("session '{0}' already exists")]
    DuplicateSession(String),

    #[error("session '{0}' not found")]
    NoSuchSession(String),

    #[error("authentication failed for {user}@{host}")]
    AuthFailed { user: String, host: String },

    #[error("connection timed out after {0} seconds")]
    ConnectTimeout(u64),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("key file not found: {}", .0.display())]
    KeyFileMissing(PathBuf),

    #[error("no authentication method available; provide auth parameters or configure a key path or default password")]
    NoAuthMethod,

    #[error("proxy command failed: {0}")]
    ProxyCommand(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Ssh(#[from] russh::Error),
}
