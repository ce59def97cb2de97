use crate::server::ShellgateServer;
use rmcp::{model::CallToolResult, model::Content, schemars, ErrorData as McpError};
use serde::Deserialize;
use shellgate_session::SessionError;

// ── ssh_disconnect ───────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SshDisconnectParams {
    #[schemars(description = "Session identifier to disconnect")]
    pub session_id: String,
}

pub async fn ssh_disconnect(
    server: &ShellgateServer,
    params: SshDisconnectParams,
) -> Result<CallToolResult, McpError> {
    match server.registry.remove_session(&params.session_id).await {
        Ok(true) => Ok(CallToolResult::success(vec![Content::text(
            serde_json::json!({
                "success": true,
                "session_id": params.session_id,
                "message": format!("Session '{}' disconnected", params.session_id),
            })
            .to_string(),
        )])),
        Ok(false) => Ok(CallToolResult::error(vec![Content::text(
            SessionError::NoSuchSession(params.session_id).to_string(),
        )])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(format!("{e}"))])),
    }
}

// ── ssh_list_sessions ────────────────────────────────────────────

pub async fn ssh_list_sessions(server: &ShellgateServer) -> Result<CallToolResult, McpError> {
    let sessions = server.registry.list_sessions().await;

    let items: Vec<serde_json::Value> = sessions
        .iter()
        .map(|info| {
            serde_json::json!({
                "session_id": info.session_id,
                "host": info.host,
                "port": info.port,
                "username": info.username,
                "connected": info.connected,
                "connected_at": info.connected_at.map(|t| t.to_rfc3339()),
                "last_used": info.last_used.to_rfc3339(),
            })
        })
        .collect();

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::json!({
            "success": true,
            "sessions": items,
            "count": items.len(),
        })
        .to_string(),
    )]))
}
