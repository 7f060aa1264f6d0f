use anyhow::Context;
use futures::StreamExt;
use quest::{
    api::routes::build_app,
    cli::{output::Output, research_options, Cli, Commands},
    types::{EventKind, ResearchOptions, SessionStatus},
    utils::toml_config::DEFAULT_CONFIG_FILE,
    AppState, HttpSearchProvider, Orchestrator, QuestConfig,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    // A missing default file means "use defaults"; a missing explicit one is an error.
    let explicit = (cli.config != Path::new(DEFAULT_CONFIG_FILE)).then_some(cli.config.as_path());
    let config = QuestConfig::load_or_default(explicit)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    init_tracing(&config.server.log_level, cli.json);

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Research {
            query,
            depth,
            domain,
            breadth,
            quiet,
        } => {
            let options = research_options(depth, domain, breadth);
            research(config, &query, options, quiet, &output).await
        }
    }
}

fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_orchestrator(config: QuestConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let provider = HttpSearchProvider::from_config(&config)
        .context("Failed to initialize the search provider")?;
    Ok(Arc::new(Orchestrator::new(Arc::new(provider), config)))
}

async fn serve(config: QuestConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", host, port);

    let orchestrator = build_orchestrator(config)?;
    let app = build_app(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "quest-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn research(
    config: QuestConfig,
    query: &str,
    options: ResearchOptions,
    quiet: bool,
    output: &Output,
) -> anyhow::Result<()> {
    output.banner();
    let orchestrator = build_orchestrator(config)?;

    let session_id = orchestrator.start(query, options)?;
    output.info(&format!("Session {} started", session_id));

    let mut events = orchestrator.subscribe(session_id)?;
    let mut cancel_requested = false;
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    if !(quiet && event.kind == EventKind::Thinking) {
                        output.event(&event);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                output.warning("Cancelling session...");
                orchestrator.cancel(session_id)?;
            }
        }
    }

    let status = orchestrator.get_status(session_id)?;
    output.newline();
    output.status(&status);

    match status.status {
        SessionStatus::Completed => {
            let report = orchestrator.get_report(session_id)?;
            output.report(&report);
            output.newline();
            output.success("Research complete");
            Ok(())
        }
        SessionStatus::Cancelled => {
            output.warning("Research cancelled");
            Ok(())
        }
        _ => {
            let err = orchestrator
                .get_report(session_id)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("Research failed: {}", err)
        }
    }
}
