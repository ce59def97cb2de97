use crate::server::ShellgateServer;
use rmcp::{model::CallToolResult, model::Content, schemars, ErrorData as McpError};
use secrecy::SecretString;
use serde::Deserialize;

// ── ssh_list_password_requests ───────────────────────────────────

pub async fn ssh_list_password_requests(
    server: &ShellgateServer,
) -> Result<CallToolResult, McpError> {
    let pending = server.broker.list_pending().await;

    let items: Vec<serde_json::Value> = pending
        .iter()
        .map(|req| {
            serde_json::json!({
                "request_id": req.request_id.to_string(),
                "prompt_text": req.prompt_text,
                "prompt_type": req.prompt_type.to_string(),
                "session_id": req.session_id,
                "host": req.host,
                "username": req.username,
                "command": req.command,
                "created_at": req.created_at.to_rfc3339(),
                "timeout_seconds": req.timeout_seconds,
            })
        })
        .collect();

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::json!({
            "success": true,
            "requests": items,
            "count": items.len(),
        })
        .to_string(),
    )]))
}

// ── ssh_provide_password ─────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SshProvidePasswordParams {
    #[schemars(description = "Request UUID from ssh_list_password_requests")]
    pub request_id: String,
    #[schemars(description = "The password to deliver to the waiting command")]
    pub password: String,
}

pub async fn ssh_provide_password(
    server: &ShellgateServer,
    params: SshProvidePasswordParams,
) -> Result<CallToolResult, McpError> {
    let request_id: uuid::Uuid = params
        .request_id
        .parse()
        .map_err(|_| McpError::invalid_params("invalid UUID", None))?;

    let delivered = server
        .broker
        .provide_password(request_id, SecretString::new(params.password))
        .await;

    if delivered {
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::json!({
                "success": true,
                "request_id": params.request_id,
                "message": format!("Password provided for request {}", params.request_id),
            })
            .to_string(),
        )]))
    } else {
        Ok(CallToolResult::error(vec![Content::text(format!(
            "No pending request '{}'; it may have been fulfilled, cancelled, or expired",
            params.request_id
        ))]))
    }
}

// ── ssh_cancel_password_request ──────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SshCancelPasswordRequestParams {
    #[schemars(description = "Request UUID from ssh_list_password_requests")]
    pub request_id: String,
}

pub async fn ssh_cancel_password_request(
    server: &ShellgateServer,
    params: SshCancelPasswordRequestParams,
) -> Result<CallToolResult, McpError> {
    let request_id: uuid::Uuid = params
        .request_id
        .parse()
        .map_err(|_| McpError::invalid_params("invalid UUID", None))?;

    if server.broker.cancel_request(request_id).await {
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::json!({
                "success": true,
                "request_id": params.request_id,
                "message": format!("Password request {} cancelled", params.request_id),
            })
            .to_string(),
        )]))
    } else {
        Ok(CallToolResult::error(vec![Content::text(format!(
            "No pending request '{}'",
            params.request_id
        ))]))
    }
}
