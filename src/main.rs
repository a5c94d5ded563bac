use clap::Parser;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use webcapture::{setup_logging, validate_config, Cli, CliRunner, Config, SweepTask};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting webcapture v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(&args).await?;

    // Create CLI runner (launches the browser pool)
    let runner = CliRunner::new(config.clone()).await?;

    // Sweep timer: owned by the process lifecycle, started here and
    // cancelled on the way out.
    let sweeper = SweepTask::start(runner.engine.store().clone(), config.sweep_interval);

    // Setup graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx.clone());

    let result = tokio::select! {
        result = runner.run(args.command) => {
            info!("Command completed");
            result
        }
        _ = shutdown_rx.recv() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    // Graceful shutdown
    info!("Shutting down...");
    sweeper.cancel();
    runner.engine.shutdown().await;

    if let Err(e) = result {
        error!("Application error: {}", e);
        std::process::exit(1);
    }

    info!("webcapture stopped");
    Ok(())
}

async fn load_config(args: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if let Some(config_path) = &args.config {
        // Load from file
        let config_content = tokio::fs::read_to_string(config_path).await?;
        serde_json::from_str(&config_content)?
    } else {
        // Use default configuration
        Config::default()
    };

    // Override with CLI arguments
    if let Some(pool_size) = args.pool_size {
        config.browser_pool_size = pool_size;
    }

    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent_jobs = max_concurrent;
    }

    if let Some(timeout) = args.timeout {
        config.navigation_timeout = Duration::from_secs(timeout);
    }

    if let Some(scratch_dir) = &args.scratch_dir {
        config.scratch_dir = scratch_dir.clone();
    }

    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    if let Some(ffmpeg_path) = &args.ffmpeg_path {
        config.ffmpeg_path = Some(ffmpeg_path.clone());
    }

    // Validate configuration
    validate_config(&config)?;

    info!("Configuration loaded successfully");
    info!("Launch policy: {:?}", config.launch_policy);
    info!("Max concurrent jobs: {}", config.max_concurrent_jobs);
    info!("Navigation timeout: {:?}", config.navigation_timeout);

    Ok(config)
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(());
    })
}
