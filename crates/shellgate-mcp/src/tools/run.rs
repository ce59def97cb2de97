use crate::server::ShellgateServer;
use rmcp::{model::CallToolResult, model::Content, schemars, ErrorData as McpError};
use secrecy::SecretString;
use serde::Deserialize;
use shellgate_session::SessionError;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SshRunParams {
    #[schemars(description = "Session identifier returned by ssh_connect")]
    pub session_id: String,
    #[schemars(description = "Command to execute in the persistent shell")]
    pub cmd: String,
    #[schemars(description = "Data written to the command's stdin after dispatch")]
    pub input_data: Option<String>,
    #[schemars(description = "Command deadline in milliseconds (default 300000)")]
    pub timeout_ms: Option<u64>,
    #[schemars(description = "Output byte cap (default 10 MiB)")]
    pub max_bytes: Option<usize>,
    #[schemars(description = "Sudo password for this command, overriding configuration")]
    pub sudo_password: Option<String>,
}

pub async fn ssh_run(
    server: &ShellgateServer,
    params: SshRunParams,
) -> Result<CallToolResult, McpError> {
    let Some(session) = server.registry.get_session(&params.session_id).await else {
        return Ok(CallToolResult::error(vec![Content::text(
            SessionError::NoSuchSession(params.session_id).to_string(),
        )]));
    };

    if !session.is_connected().await {
        return Ok(CallToolResult::error(vec![Content::text(format!(
            "Session '{}' not connected",
            params.session_id
        ))]));
    }

    let result = session
        .execute_command(
            &params.cmd,
            params.input_data,
            params.timeout_ms,
            params.max_bytes,
            params.sudo_password.map(SecretString::new),
        )
        .await;

    match result {
        Ok(result) => Ok(CallToolResult::success(vec![Content::text(
            serde_json::json!({
                "success": true,
                "session_id": result.session_id,
                "stdout": result.stdout,
                "stderr": result.stderr,
                "exit_status": result.exit_status,
                "duration_ms": result.duration_ms,
                "truncated": result.truncated,
            })
            .to_string(),
        )])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(format!("{e}"))])),
    }
}
