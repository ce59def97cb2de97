use crate::server::ShellgateServer;
use rmcp::{model::CallToolResult, model::Content, schemars, ErrorData as McpError};
use secrecy::SecretString;
use serde::Deserialize;
use shellgate_types::AuthMethod;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SshConnectParams {
    #[schemars(description = "Remote host; falls back to the configured default host")]
    pub host: Option<String>,
    #[schemars(description = "SSH port (default 22)")]
    pub port: Option<u16>,
    #[schemars(description = "Username; falls back to the configured default user")]
    pub username: Option<String>,
    #[schemars(description = "Session identifier; a short random id is generated when omitted")]
    pub session_id: Option<String>,
    #[schemars(description = "Password authentication")]
    pub password: Option<String>,
    #[schemars(description = "Path to a private key file on the gateway host")]
    pub key_path: Option<String>,
    #[schemars(description = "Private key PEM, base64-encoded")]
    pub key_pem_base64: Option<String>,
    #[schemars(description = "Passphrase for the private key, if any")]
    pub key_passphrase: Option<String>,
}

pub async fn ssh_connect(
    server: &ShellgateServer,
    params: SshConnectParams,
) -> Result<CallToolResult, McpError> {
    let ssh = &server.config.ssh;

    let Some(host) = params.host.clone().or_else(|| ssh.default_host.clone()) else {
        return Ok(CallToolResult::error(vec![Content::text(
            "Host is required. Provide it as a parameter or set SHELLGATE_HOST.",
        )]));
    };
    let Some(username) = params.username.clone().or_else(|| ssh.default_username.clone()) else {
        return Ok(CallToolResult::error(vec![Content::text(
            "Username is required. Provide it as a parameter or set SHELLGATE_USER.",
        )]));
    };
    let port = params.port.unwrap_or(ssh.default_port);
    let session_id = params
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()[..8].to_string());

    let auth = resolve_auth(server, &params);
    let Some(auth) = auth else {
        return Ok(CallToolResult::error(vec![Content::text(
            "No authentication method available. Provide password/key parameters, or set \
             SHELLGATE_KEY or SHELLGATE_SSH_PASSWORD.",
        )]));
    };

    let session = match server
        .registry
        .create_session(&session_id, &host, port, &username)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            return Ok(CallToolResult::error(vec![Content::text(format!("{e}"))]));
        }
    };

    match session.connect(auth).await {
        Ok(()) => Ok(CallToolResult::success(vec![Content::text(
            serde_json::json!({
                "success": true,
                "session_id": session_id,
                "host": host,
                "username": session.username(),
                "message": format!("Connected to {username}@{host}:{port}"),
            })
            .to_string(),
        )])),
        // The session stays registered but disconnected; ssh_disconnect or
        // the TTL sweep reclaims it.
        Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
            "Failed to establish SSH connection: {e}"
        ))])),
    }
}

/// Precedence: explicit parameters, then the configured key path, then the
/// configured default password.
fn resolve_auth(server: &ShellgateServer, params: &SshConnectParams) -> Option<AuthMethod> {
    if let Some(password) = &params.password {
        return Some(AuthMethod::Password {
            password: SecretString::new(password.clone()),
        });
    }
    if params.key_path.is_some() || params.key_pem_base64.is_some() {
        return Some(AuthMethod::Key {
            key_path: params.key_path.clone(),
            key_pem_base64: params.key_pem_base64.clone(),
            passphrase: params
                .key_passphrase
                .clone()
                .map(SecretString::new),
        });
    }
    if let Some(key_path) = &server.config.ssh.key_path {
        return Some(AuthMethod::Key {
            key_path: Some(key_path.clone()),
            key_pem_base64: None,
            passphrase: None,
        });
    }
    server
        .config
        .ssh
        .default_password
        .clone()
        .map(|password| AuthMethod::Password { password })
}
