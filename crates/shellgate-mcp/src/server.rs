use crate::tools;
use rmcp::{
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use shellgate_policy::PolicyEngine;
use shellgate_session::{PasswordBroker, SessionRegistry};
use shellgate_types::config::GatewayConfig;
use std::sync::Arc;

/// The shellgate MCP server. Holds the registry, broker, and policy engine.
#[derive(Clone)]
pub struct ShellgateServer {
    pub config: Arc<GatewayConfig>,
    pub policy: Arc<PolicyEngine>,
    pub broker: Arc<PasswordBroker>,
    pub registry: Arc<SessionRegistry>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ShellgateServer {
    pub fn new(
        config: Arc<GatewayConfig>,
        policy: Arc<PolicyEngine>,
        broker: Arc<PasswordBroker>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config,
            policy,
            broker,
            registry,
            tool_router: Self::tool_router(),
        }
    }

    // ── Session Lifecycle ────────────────────────────────────────

    #[tool(description = "Connect to a remote host over SSH and open a persistent interactive shell. Returns the session_id for use with ssh_run.")]
    async fn ssh_connect(
        &self,
        Parameters(params): Parameters<tools::connect::SshConnectParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::connect::ssh_connect(self, params).await
    }

    #[tool(description = "Disconnect an SSH session and remove it from the registry.")]
    async fn ssh_disconnect(
        &self,
        Parameters(params): Parameters<tools::sessions::SshDisconnectParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::sessions::ssh_disconnect(self, params).await
    }

    #[tool(description = "List active SSH sessions with host, username, and connection state.")]
    async fn ssh_list_sessions(&self) -> Result<CallToolResult, McpError> {
        tools::sessions::ssh_list_sessions(self).await
    }

    // ── Command Execution ────────────────────────────────────────

    #[tool(description = "Execute a command in a persistent SSH session. Commands are validated against the configured permissibility level; output is captured, cleaned, and redacted of credential shapes. Sudo prompts are answered from configuration or via the interactive password flow.")]
    async fn ssh_run(
        &self,
        Parameters(params): Parameters<tools::run::SshRunParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::run::ssh_run(self, params).await
    }

    // ── Interactive Passwords ────────────────────────────────────

    #[tool(description = "List pending password requests from running commands that hit an interactive prompt.")]
    async fn ssh_list_password_requests(&self) -> Result<CallToolResult, McpError> {
        tools::password::ssh_list_password_requests(self).await
    }

    #[tool(description = "Provide the password for a pending request; the waiting command resumes immediately.")]
    async fn ssh_provide_password(
        &self,
        Parameters(params): Parameters<tools::password::SshProvidePasswordParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::password::ssh_provide_password(self, params).await
    }

    #[tool(description = "Cancel a pending password request; the waiting command fails with a password error.")]
    async fn ssh_cancel_password_request(
        &self,
        Parameters(params): Parameters<tools::password::SshCancelPasswordRequestParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::password::ssh_cancel_password_request(self, params).await
    }

    // ── Introspection ────────────────────────────────────────────

    #[tool(description = "Show the current permissibility level, allowed command count, and pattern counts.")]
    async fn ssh_get_permissibility_info(&self) -> Result<CallToolResult, McpError> {
        tools::info::ssh_get_permissibility_info(self).await
    }
}

#[tool_handler]
impl ServerHandler for ShellgateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Shellgate is a security-mediated SSH gateway. It keeps persistent interactive \
                 shells on remote hosts and validates every command against a permissibility \
                 level (low/medium/high) before it is sent. Start with ssh_connect, then issue \
                 commands with ssh_run against the returned session_id.\n\n\
                 IMPORTANT — password flow:\n\
                 - When a command hits a sudo or login prompt and no password is configured, the \
                   command pauses and a request appears in ssh_list_password_requests.\n\
                 - Answer it with ssh_provide_password (or ssh_cancel_password_request); the \
                   command resumes on delivery and times out after 60s otherwise.\n\
                 - Command output is scrubbed: API keys, tokens, and PEM blocks are replaced \
                   with [REDACTED_*] markers.\n\
                 - Host keys are auto-accepted; point the gateway only at hosts you trust."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
