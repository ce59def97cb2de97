pub mod config;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Permissibility Level ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PermissibilityLevel {
    Low,
    Medium,
    High,
}

impl PermissibilityLevel {
    /// Parse a level name case-insensitively. Unknown values fall back
    /// to Medium.
    pub fn from_str_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for PermissibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

// ── Command Result ───────────────────────────────────────────────

/// Outcome of one command on one session. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub duration_ms: u64,
    pub truncated: bool,
    pub session_id: String,
}

// ── Session Info ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_used: DateTime<Utc>,
}

// ── Password Prompts ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Sudo,
    Interactive,
    Ssh,
    Login,
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sudo => write!(f, "sudo"),
            Self::Interactive => write!(f, "interactive"),
            Self::Ssh => write!(f, "ssh"),
            Self::Login => write!(f, "login"),
        }
    }
}

/// A pending out-of-band password request, as surfaced to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordRequestInfo {
    pub request_id: Uuid,
    pub prompt_text: String,
    pub prompt_type: PromptKind,
    pub session_id: String,
    pub host: String,
    pub username: String,
    pub command: String,
    pub created_at: DateTime<Utc>,
    pub timeout_seconds: u64,
}

// ── Authentication ───────────────────────────────────────────────

/// How a session authenticates. A key may be given as a file path or as a
/// base64-embedded PEM; `Password` carries the secret itself.
#[derive(Clone)]
pub enum AuthMethod {
    Key {
        key_path: Option<String>,
        key_pem_base64: Option<String>,
        passphrase: Option<SecretString>,
    },
    Password {
        password: SecretString,
    },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key { key_path, .. } => f
                .debug_struct("Key")
                .field("key_path", key_path)
                .finish_non_exhaustive(),
            Self::Password { .. } => f.debug_struct("Password").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(PermissibilityLevel::from_str_lossy("low"), PermissibilityLevel::Low);
        assert_eq!(PermissibilityLevel::from_str_lossy("LOW"), PermissibilityLevel::Low);
        assert_eq!(PermissibilityLevel::from_str_lossy("High"), PermissibilityLevel::High);
        assert_eq!(PermissibilityLevel::from_str_lossy("medium"), PermissibilityLevel::Medium);
        // Unknown values fall back to medium
        assert_eq!(PermissibilityLevel::from_str_lossy("paranoid"), PermissibilityLevel::Medium);
        assert_eq!(PermissibilityLevel::from_str_lossy(""), PermissibilityLevel::Medium);
    }

    #[test]
    fn test_level_display_roundtrip() {
        for level in [
            PermissibilityLevel::Low,
            PermissibilityLevel::Medium,
            PermissibilityLevel::High,
        ] {
            assert_eq!(PermissibilityLevel::from_str_lossy(&level.to_string()), level);
        }
    }
}
