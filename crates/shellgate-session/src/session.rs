//! One persistent interactive shell on one remote host.
//!
//! A session moves `new -> connected -> disconnected`; `execute_command`
//! requires the connected state. Commands are serialized by the session's
//! own mutex; a separate meta record keeps `info()` responsive while a
//! command is running.

use crate::broker::{PasswordBroker, RequestContext};
use crate::shell::{self, ExecContext, PasswordHandler, ShellPatterns};
use crate::transport::ProxyCommandStream;
use crate::SessionError;
use chrono::{DateTime, Utc};
use russh::client::{self, Msg};
use russh::{Channel, Disconnect, Pty};
use secrecy::{ExposeSecret, SecretString};
use shellgate_policy::PolicyEngine;
use shellgate_types::config::GatewayConfig;
use shellgate_types::{AuthMethod, CommandResult, SessionInfo};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Upper bound on a caller-supplied command deadline.
const MAX_DEADLINE_MS: u64 = 24 * 60 * 60 * 1000;

struct ClientHandler;

#[async_trait::async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are auto-accepted; the operator explicitly configured
        // the target host.
        Ok(true)
    }
}

struct Connection {
    handle: client::Handle<ClientHandler>,
    channel: Channel<Msg>,
}

struct Meta {
    connected: bool,
    connected_at: Option<DateTime<Utc>>,
    last_used: DateTime<Utc>,
}

pub struct Session {
    id: String,
    host: String,
    port: u16,
    username: String,
    config: Arc<GatewayConfig>,
    policy: Arc<PolicyEngine>,
    broker: Arc<PasswordBroker>,
    patterns: ShellPatterns,
    // Serializes commands; the channel is owned by whoever holds this.
    state: Mutex<Option<Connection>>,
    meta: RwLock<Meta>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish()
    }
}

impl Session {
    pub fn new(
        id: String,
        host: String,
        port: u16,
        username: String,
        config: Arc<GatewayConfig>,
        policy: Arc<PolicyEngine>,
        broker: Arc<PasswordBroker>,
    ) -> Self {
        Self {
            id,
            host,
            port,
            username,
            config,
            policy,
            broker,
            patterns: ShellPatterns::new(),
            state: Mutex::new(None),
            meta: RwLock::new(Meta {
                connected: false,
                connected_at: None,
                last_used: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Establish the SSH connection and open the persistent shell.
    pub async fn connect(&self, auth: AuthMethod) -> Result<(), SessionError> {
        let ssh_config = Arc::new(client::Config::default());
        let connect_timeout = self.config.ssh.connect_timeout;

        let mut handle = if let Some(template) = &self.config.ssh.proxy_command {
            let stream = ProxyCommandStream::spawn(template, &self.host, self.port)?;
            tokio::time::timeout(
                connect_timeout,
                client::connect_stream(ssh_config, stream, ClientHandler),
            )
            .await
            .map_err(|_| SessionError::ConnectTimeout(connect_timeout.as_secs()))??
        } else {
            tokio::time::timeout(
                connect_timeout,
                client::connect(ssh_config, (self.host.as_str(), self.port), ClientHandler),
            )
            .await
            .map_err(|_| SessionError::ConnectTimeout(connect_timeout.as_secs()))??
        };

        let authenticated = match &auth {
            AuthMethod::Password { password } => {
                handle
                    .authenticate_password(&self.username, password.expose_secret())
                    .await?
            }
            AuthMethod::Key {
                key_path,
                key_pem_base64,
                passphrase,
            } => {
                let key_pair = load_key(key_path.as_deref(), key_pem_base64.as_deref(), passphrase)?;
                handle
                    .authenticate_publickey(&self.username, Arc::new(key_pair))
                    .await?
            }
        };
        if !authenticated {
            return Err(SessionError::AuthFailed {
                user: self.username.clone(),
                host: self.host.clone(),
            });
        }

        // Persistent shell on a fixed-geometry PTY with echo disabled.
        let mut channel = handle.channel_open_session().await?;
        channel
            .request_pty(false, "xterm", 120, 30, 0, 0, &[(Pty::ECHO, 0)])
            .await?;
        channel.request_shell(false).await?;

        shell::wait_for_prompt(&mut channel, &self.patterns, Duration::from_secs(10)).await;
        shell::send_prelude(&mut channel).await?;

        *self.state.lock().await = Some(Connection { handle, channel });
        let mut meta = self.meta.write().await;
        meta.connected = true;
        meta.connected_at = Some(Utc::now());
        meta.last_used = Utc::now();

        tracing::info!(
            session_id = %self.id,
            "connected to {}@{}:{}",
            self.username,
            self.host,
            self.port
        );
        Ok(())
    }

    /// Close the connection. The session stays in the registry but no
    /// longer accepts commands.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let connection = self.state.lock().await.take();
        self.meta.write().await.connected = false;

        if let Some(connection) = connection {
            connection
                .handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await?;
            tracing::info!(session_id = %self.id, "disconnected");
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.meta.read().await.connected
    }

    /// Run one command through the interaction loop.
    pub async fn execute_command(
        &self,
        command: &str,
        input_data: Option<String>,
        timeout_ms: Option<u64>,
        max_bytes: Option<usize>,
        sudo_password: Option<SecretString>,
    ) -> Result<CommandResult, SessionError> {
        // Policy is consulted before any session state is touched, so a
        // denied command leaves the session pristine.
        let verdict = self.policy.validate_command(command);
        if !verdict.allowed {
            return Err(SessionError::PolicyDenied(verdict.reason));
        }
        let sanitized = verdict
            .sanitized
            .unwrap_or_else(|| command.trim().to_string());

        let ctx = self.build_context(command, sanitized, input_data, timeout_ms, max_bytes, sudo_password);

        let mut state = self.state.lock().await;
        let result = match state.as_mut() {
            Some(connection) => {
                shell::run_command(&mut connection.channel, &self.patterns, &self.policy, &ctx)
                    .await
            }
            None => return Err(SessionError::NotConnected),
        };

        match result {
            Ok(result) => {
                drop(state);
                self.meta.write().await.last_used = Utc::now();
                self.log_execution(command, &result);
                Ok(result)
            }
            Err(e) => {
                // Transport-level failures are fatal for this session only.
                if matches!(e, SessionError::Transport(_) | SessionError::Ssh(_)) {
                    if let Some(connection) = state.take() {
                        let _ = connection
                            .handle
                            .disconnect(Disconnect::ByApplication, "", "en")
                            .await;
                    }
                    drop(state);
                    self.meta.write().await.connected = false;
                    tracing::warn!(session_id = %self.id, "session lost mid-command: {e}");
                }
                Err(e)
            }
        }
    }

    pub async fn info(&self) -> SessionInfo {
        let meta = self.meta.read().await;
        SessionInfo {
            session_id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            connected: meta.connected,
            connected_at: meta.connected_at,
            last_used: meta.last_used,
        }
    }

    fn build_context(
        &self,
        command: &str,
        sanitized: String,
        input_data: Option<String>,
        timeout_ms: Option<u64>,
        max_bytes: Option<usize>,
        sudo_password: Option<SecretString>,
    ) -> ExecContext {
        // Explicit parameter wins over the configured password (which in
        // turn already absorbed the common fallback).
        let sudo_password = sudo_password.or_else(|| self.config.ssh.sudo_password.clone());

        let mut handlers = Vec::new();
        if let Some(password) = sudo_password {
            handlers.push(PasswordHandler::Sudo { password });
        }
        if self.config.ssh.enable_interactive_password {
            handlers.push(PasswordHandler::Interactive {
                broker: self.broker.clone(),
            });
        }

        ExecContext {
            command: command.to_string(),
            sanitized,
            input_data,
            deadline_ms: timeout_ms
                .unwrap_or(self.config.security.command_timeout.as_millis() as u64)
                .min(MAX_DEADLINE_MS),
            cap_bytes: max_bytes.unwrap_or(self.config.security.max_output_bytes),
            max_lines: self.config.security.max_output_lines,
            handlers,
            is_sudo: command.trim().starts_with("sudo"),
            force_noninteractive_sudo: self.config.ssh.force_noninteractive_sudo,
            broker_timeout: self.config.security.password_timeout,
            request_context: RequestContext {
                session_id: self.id.clone(),
                host: self.host.clone(),
                username: self.username.clone(),
                command: command.to_string(),
            },
        }
    }

    fn log_execution(&self, command: &str, result: &CommandResult) {
        if self.policy.should_log_command(command) {
            tracing::info!(
                session_id = %self.id,
                command = %command,
                exit_status = ?result.exit_status,
                duration_ms = result.duration_ms,
                "command executed"
            );
        } else {
            let identifier = command.trim().split_whitespace().next().unwrap_or("");
            tracing::info!(
                session_id = %self.id,
                command = %identifier,
                exit_status = ?result.exit_status,
                duration_ms = result.duration_ms,
                "sensitive command executed (arguments withheld)"
            );
        }
    }
}

fn load_key(
    key_path: Option<&str>,
    key_pem_base64: Option<&str>,
    passphrase: &Option<SecretString>,
) -> Result<russh_keys::key::KeyPair, SessionError> {
    let passphrase = passphrase.as_ref().map(|p| p.expose_secret().as_str());

    if let Some(path) = key_path {
        if !Path::new(path).exists() {
            return Err(SessionError::KeyFileMissing(path.into()));
        }
        russh_keys::load_secret_key(path, passphrase)
            .map_err(|e| SessionError::InvalidKey(e.to_string()))
    } else if let Some(encoded) = key_pem_base64 {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| SessionError::InvalidKey(format!("base64 decode failed: {e}")))?;
        let pem = String::from_utf8(bytes)
            .map_err(|e| SessionError::InvalidKey(format!("key is not valid UTF-8: {e}")))?;
        russh_keys::decode_secret_key(&pem, passphrase)
            .map_err(|e| SessionError::InvalidKey(e.to_string()))
    } else {
        Err(SessionError::NoAuthMethod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellgate_types::PermissibilityLevel;

    fn session() -> Session {
        let config = Arc::new(GatewayConfig::default());
        let policy = Arc::new(PolicyEngine::with_defaults(PermissibilityLevel::Medium));
        let broker = Arc::new(PasswordBroker::new());
        Session::new(
            "s1".to_string(),
            "example.com".to_string(),
            22,
            "admin".to_string(),
            config,
            policy,
            broker,
        )
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let s = session();
        let err = s
            .execute_command("ls -la", None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn test_policy_denied_before_state_check() {
        // A denied command fails on policy even though the session is not
        // connected: validation happens first and leaves no side effects.
        let s = session();
        let err = s
            .execute_command("forbidden-binary", None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn test_info_reflects_disconnected_state() {
        let s = session();
        let info = s.info().await;
        assert_eq!(info.session_id, "s1");
        assert_eq!(info.host, "example.com");
        assert_eq!(info.port, 22);
        assert!(!info.connected);
        assert!(info.connected_at.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let s = session();
        assert!(s.disconnect().await.is_ok());
        assert!(s.disconnect().await.is_ok());
        assert!(!s.is_connected().await);
    }

    #[test]
    fn test_load_key_requires_some_material() {
        let err = load_key(None, None, &None).unwrap_err();
        assert!(matches!(err, SessionError::NoAuthMethod));

        let err = load_key(Some("/nonexistent/key"), None, &None).unwrap_err();
        assert!(matches!(err, SessionError::KeyFileMissing(_)));

        let err = load_key(None, Some("!!!not-base64!!!"), &None).unwrap_err();
        assert!(matches!(err, SessionError::InvalidKey(_)));
    }
}
