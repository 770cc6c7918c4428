use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use assistant_gateway::client::validate_api_key;
use assistant_gateway::config::{Args, Command};
use assistant_gateway::state::AppState;
use assistant_gateway::{GatewayConfig, Orchestrator, Result, console, handlers};

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = GatewayConfig::from(&args);
    info!(?config, "starting");
    if !validate_api_key(config.api_key.as_deref()) {
        warn!("OPENAI_API_KEY is missing or invalid; uncached prompts will fail");
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    match args.command.unwrap_or(Command::Chat) {
        Command::Serve { port } => {
            let app = handlers::router(AppState { orchestrator });
            let addr = format!("0.0.0.0:{}", port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            info!("Gateway running on http://localhost:{}", port);
            info!("Forwarding to {} (model {})", config.base_url, config.model);
            info!(
                "Rate limit: {} requests before a {}s backoff",
                config.client.rate_limit,
                assistant_gateway::rate_limit::BASE_BACKOFF.as_secs()
            );
            axum::serve(listener, app).await?;
        }
        Command::Chat => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            console::run(&orchestrator, stdin, tokio::io::stdout()).await?;
        }
    }
    Ok(())
}
