use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beacon_core::config::{ApiConfig, DEFAULT_BASE_URL, DEFAULT_BRAND_NAME};
use beacon_mcp_runtime::{McpCommands, run};

#[derive(Parser)]
#[command(
    name = "beacon-mcp",
    version,
    about = "Beacon MCP server: brand visibility analytics over stdio"
)]
struct Cli {
    /// Beacon API base URL
    #[arg(long, env = "BEACON_API_URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Beacon API key (sent as the X-API-Key header)
    #[arg(long, env = "BEACON_API_KEY")]
    api_key: Option<String>,

    /// Display name used for the tracked brand in datasets
    #[arg(long, env = "BEACON_BRAND_NAME", default_value = DEFAULT_BRAND_NAME)]
    brand_name: String,

    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries the MCP channel; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_mcp_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ApiConfig::new(cli.api_key, cli.api_url).with_brand_name(cli.brand_name);
    let code = run(config, cli.command).await;
    std::process::exit(code);
}
