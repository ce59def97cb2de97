use crate::server::ShellgateServer;
use rmcp::{model::CallToolResult, model::Content, ErrorData as McpError};

pub async fn ssh_get_permissibility_info(
    server: &ShellgateServer,
) -> Result<CallToolResult, McpError> {
    let policy = &server.policy;

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::json!({
            "success": true,
            "permissibility_level": policy.level().to_string(),
            "allowed_commands": policy.allowed_command_count(),
            "dangerous_patterns": policy.dangerous_pattern_count(),
            "secret_patterns": policy.secret_pattern_count(),
        })
        .to_string(),
    )]))
}
