use crate::{
    format_bytes, format_duration, filename_for_url, CaptureEngine, CaptureMode, CapturePayload,
    Config, DeviceProfileTable, RequestValidator,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::info;

#[derive(Parser)]
#[command(name = "webcapture")]
#[command(about = "Headless web page capture service: screenshots and short recordings")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Browser pool size (pooled mode)")]
    pub pool_size: Option<usize>,

    #[arg(long, help = "Maximum concurrent capture jobs")]
    pub max_concurrent: Option<usize>,

    #[arg(long, help = "Navigation timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Scratch directory for artifacts")]
    pub scratch_dir: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "ffmpeg executable path")]
    pub ffmpeg_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a still image of a page
    Screenshot {
        #[arg(short, long, help = "Target URL")]
        url: String,

        #[arg(short, long, help = "Device profile (phone, tablet, laptop, desktop, full)")]
        device: Option<String>,

        #[arg(short, long, help = "Output file path (defaults to a name derived from the URL)")]
        output: Option<PathBuf>,
    },

    /// Record a short video of a page
    Record {
        #[arg(short, long, help = "Target URL")]
        url: String,

        #[arg(short, long, help = "Device profile (phone, tablet, laptop, desktop, full)")]
        device: Option<String>,

        #[arg(short = 's', long, help = "Recording duration in seconds (capped at 30)")]
        duration: i64,

        #[arg(short, long, help = "Output file path (defaults to a name derived from the URL)")]
        output: Option<PathBuf>,
    },

    /// Delete scratch artifacts older than the retention window
    Sweep,

    /// Validate a configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub struct CliRunner {
    pub config: Config,
    pub engine: Arc<CaptureEngine>,
    validator: RequestValidator,
}

impl CliRunner {
    pub async fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let engine = Arc::new(CaptureEngine::new(config.clone()).await?);
        let validator = RequestValidator::new(Arc::new(DeviceProfileTable::builtin()));

        Ok(Self {
            config,
            engine,
            validator,
        })
    }

    pub async fn run(&self, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            Commands::Screenshot { url, device, output } => {
                self.run_capture(url, device, CaptureMode::Screenshot, None, output)
                    .await
            }
            Commands::Record {
                url,
                device,
                duration,
                output,
            } => {
                self.run_capture(url, device, CaptureMode::Recording, Some(duration), output)
                    .await
            }
            Commands::Sweep => {
                let removed = self.engine.store().sweep();
                println!("Removed {removed} expired artifacts");
                Ok(())
            }
            Commands::Validate { config } => validate_config_file(config).await,
        }
    }

    async fn run_capture(
        &self,
        url: String,
        device: Option<String>,
        mode: CaptureMode,
        duration: Option<i64>,
        output: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request =
            self.validator
                .validate(Some(url.as_str()), device.as_deref(), mode, duration)?;

        info!(job = %request.id, "capturing {url}");
        let result = self.engine.capture(request).await?;

        let extension = match mode {
            CaptureMode::Screenshot => self.config.output_format.extension(),
            CaptureMode::Recording => "webm",
        };
        let output = output.unwrap_or_else(|| PathBuf::from(filename_for_url(&url, extension)));

        match &result.payload {
            CapturePayload::Inline(bytes) => {
                if let Some(parent) = output.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).await?;
                    }
                }
                fs::write(&output, bytes).await?;
                println!("Capture saved to: {}", output.display());
                println!("  Size: {}", format_bytes(bytes.len()));
            }
            CapturePayload::Reference(artifact) => {
                let path = self
                    .engine
                    .store()
                    .path(artifact)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| artifact.id.clone());
                println!("Capture retained at: {path}");
            }
        }

        println!("  URL: {}", result.url);
        println!("  Device: {}", result.metadata.device);
        println!("  MIME type: {}", result.mime_type);
        println!("  Duration: {}", format_duration(result.duration));
        if let Some(title) = &result.metadata.page_title {
            println!("  Title: {title}");
        }

        Ok(())
    }
}

async fn validate_config_file(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration: {}", path.display());

    let content = fs::read_to_string(&path).await?;
    let config: Config = serde_json::from_str(&content)?;
    crate::validate_config(&config)?;

    println!("Configuration is valid:");
    println!("  Launch policy: {:?}", config.launch_policy);
    println!("  Browser pool size: {}", config.browser_pool_size);
    println!("  Max concurrent jobs: {}", config.max_concurrent_jobs);
    println!("  Navigation timeout: {:?}", config.navigation_timeout);
    println!("  Scratch dir: {}", config.scratch_dir.display());
    println!("  Retention window: {:?}", config.retention_window);

    Ok(())
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}
