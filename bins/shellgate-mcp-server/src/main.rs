use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};
use shellgate_mcp::ShellgateServer;
use shellgate_policy::PolicyEngine;
use shellgate_session::{PasswordBroker, SessionRegistry};
use shellgate_types::config::GatewayConfig;
use std::sync::Arc;
use tracing_subscriber::{self, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --version / --help
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("shellgate-mcp-server {VERSION}");
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("shellgate-mcp-server {VERSION}");
        println!("Security-mediated SSH gateway MCP server\n");
        println!("USAGE: shellgate-mcp-server [OPTIONS]\n");
        println!("OPTIONS:");
        println!("  -h, --help       Print help");
        println!("  -V, --version    Print version");
        println!("\nCommunicates via JSON-RPC over stdio (MCP transport).");
        println!("Configure in your MCP client as:");
        println!("  {{ \"command\": \"shellgate-mcp-server\", \"args\": [] }}");
        println!("\nConfiguration comes from SHELLGATE_* environment variables,");
        println!("optionally loaded from a .env file in the working directory.");
        return Ok(());
    }

    dotenvy::dotenv().ok();

    // All logging goes to stderr (stdout is the MCP JSON-RPC transport)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Shellgate MCP server v{VERSION} starting");

    let config = Arc::new(GatewayConfig::from_env());
    let policy = Arc::new(PolicyEngine::with_defaults(
        config.security.permissibility_level,
    ));
    let broker = Arc::new(PasswordBroker::new());
    let registry = Arc::new(SessionRegistry::new(
        config.clone(),
        policy.clone(),
        broker.clone(),
    ));

    tracing::info!(
        level = %policy.level(),
        allowed_commands = policy.allowed_command_count(),
        max_sessions = config.security.max_sessions,
        "policy engine ready"
    );

    // Background housekeepers: expired sessions and expired password
    // requests.
    tokio::spawn(registry.clone().run_sweeper());
    tokio::spawn(broker.clone().run_sweeper());

    let server = ShellgateServer::new(config, policy, broker, registry.clone());

    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("Failed to start MCP service: {:?}", e);
    })?;

    tracing::info!("Shellgate MCP server running on stdio");

    service.waiting().await?;

    registry.disconnect_all().await;
    tracing::info!("Shellgate MCP server shutting down");
    Ok(())
}
