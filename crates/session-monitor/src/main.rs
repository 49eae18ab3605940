use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use session_monitor::app::ApplicationBuilder;
use session_monitor::config::AppConfig;
use session_monitor::config::Cli;
use session_monitor::config::Commands;
use session_monitor::config::RunArgs;
use session_monitor::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_args) => run(*run_args).await,
    }
}

async fn run(run_args: RunArgs) -> Result<()> {
    let _guard = logging::init().context("failed to initialize logging")?;

    tracing::info!("Starting session monitor {}", &**version::VERSION);

    let config = AppConfig::load(&run_args)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e:?}"))?;
    tracing::info!(
        port = config.port,
        pod_namespace = ?config.pod_namespace,
        mock = config.redis.mock,
        "Configuration loaded"
    );

    let app = ApplicationBuilder::new(config).build().await?;
    app.run().await?;

    Ok(())
}
