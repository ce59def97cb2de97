//! Process configuration, read once from the environment at bootstrap.
//!
//! Every field has a default so the server starts with no configuration at
//! all. Passwords resolve with precedence: specific variable, then the
//! common `SHELLGATE_PASSWORD` fallback, then none.

use crate::PermissibilityLevel;
use secrecy::SecretString;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub security: SecurityConfig,
    pub ssh: SshConfig,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub permissibility_level: PermissibilityLevel,
    pub max_sessions: usize,
    pub session_ttl_hours: u64,
    pub command_timeout: Duration,
    pub max_output_bytes: usize,
    pub max_output_lines: usize,
    pub password_timeout: Duration,
}

#[derive(Clone)]
pub struct SshConfig {
    pub default_host: Option<String>,
    pub default_port: u16,
    pub default_username: Option<String>,
    pub key_path: Option<String>,
    pub proxy_command: Option<String>,
    pub connect_timeout: Duration,
    pub default_password: Option<SecretString>,
    pub sudo_password: Option<SecretString>,
    pub enable_interactive_password: bool,
    pub force_noninteractive_sudo: bool,
}

impl std::fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConfig")
            .field("default_host", &self.default_host)
            .field("default_port", &self.default_port)
            .field("default_username", &self.default_username)
            .field("key_path", &self.key_path)
            .field("proxy_command", &self.proxy_command)
            .field("connect_timeout", &self.connect_timeout)
            .field("default_password", &self.default_password.is_some())
            .field("sudo_password", &self.sudo_password.is_some())
            .field("enable_interactive_password", &self.enable_interactive_password)
            .field("force_noninteractive_sudo", &self.force_noninteractive_sudo)
            .finish()
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            permissibility_level: PermissibilityLevel::Medium,
            max_sessions: 20,
            session_ttl_hours: 8,
            command_timeout: Duration::from_secs(300),
            max_output_bytes: 10 * 1024 * 1024,
            max_output_lines: 10_000,
            password_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            default_host: None,
            default_port: 22,
            default_username: None,
            key_path: None,
            proxy_command: None,
            connect_timeout: Duration::from_secs(30),
            default_password: None,
            sudo_password: None,
            enable_interactive_password: true,
            force_noninteractive_sudo: false,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            ssh: SshConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Build configuration from `SHELLGATE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let security = SecurityConfig {
            permissibility_level: env_var("SHELLGATE_PERMISSIBILITY_LEVEL")
                .map(|v| PermissibilityLevel::from_str_lossy(&v))
                .unwrap_or(defaults.security.permissibility_level),
            max_sessions: env_parse("SHELLGATE_MAX_SESSIONS", defaults.security.max_sessions),
            session_ttl_hours: env_parse(
                "SHELLGATE_SESSION_TTL_HOURS",
                defaults.security.session_ttl_hours,
            ),
            command_timeout: Duration::from_secs(env_parse(
                "SHELLGATE_COMMAND_TIMEOUT",
                defaults.security.command_timeout.as_secs(),
            )),
            max_output_bytes: env_parse(
                "SHELLGATE_MAX_OUTPUT_BYTES",
                defaults.security.max_output_bytes,
            ),
            max_output_lines: env_parse(
                "SHELLGATE_MAX_OUTPUT_LINES",
                defaults.security.max_output_lines,
            ),
            password_timeout: Duration::from_secs(env_parse(
                "SHELLGATE_PASSWORD_TIMEOUT",
                defaults.security.password_timeout.as_secs(),
            )),
        };

        // The common fallback populates both passwords when the specific
        // variables are absent.
        let fallback = env_var("SHELLGATE_PASSWORD");
        let default_password = env_var("SHELLGATE_SSH_PASSWORD")
            .or_else(|| fallback.clone())
            .map(SecretString::new);
        let sudo_password = env_var("SHELLGATE_SUDO_PASSWORD")
            .or(fallback)
            .map(SecretString::new);

        let ssh = SshConfig {
            default_host: env_var("SHELLGATE_HOST"),
            default_port: env_parse("SHELLGATE_PORT", defaults.ssh.default_port),
            default_username: env_var("SHELLGATE_USER"),
            key_path: env_var("SHELLGATE_KEY"),
            proxy_command: env_var("SHELLGATE_PROXY_COMMAND"),
            connect_timeout: Duration::from_secs(env_parse(
                "SHELLGATE_CONNECT_TIMEOUT",
                defaults.ssh.connect_timeout.as_secs(),
            )),
            default_password,
            sudo_password,
            enable_interactive_password: env_parse(
                "SHELLGATE_INTERACTIVE_PASSWORD",
                defaults.ssh.enable_interactive_password,
            ),
            force_noninteractive_sudo: env_parse(
                "SHELLGATE_FORCE_NONINTERACTIVE_SUDO",
                defaults.ssh.force_noninteractive_sudo,
            ),
        };

        Self { security, ssh }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.security.permissibility_level, PermissibilityLevel::Medium);
        assert_eq!(config.security.max_sessions, 20);
        assert_eq!(config.security.session_ttl_hours, 8);
        assert_eq!(config.security.command_timeout, Duration::from_secs(300));
        assert_eq!(config.security.max_output_bytes, 10 * 1024 * 1024);
        assert_eq!(config.security.max_output_lines, 10_000);
        assert_eq!(config.ssh.default_port, 22);
        assert_eq!(config.ssh.connect_timeout, Duration::from_secs(30));
        assert!(config.ssh.enable_interactive_password);
        assert!(!config.ssh.force_noninteractive_sudo);
        assert!(config.ssh.default_password.is_none());
        assert!(config.ssh.sudo_password.is_none());
    }
}
