use crate::{
    format_bytes, format_duration, install_prometheus, parse_duration, serve, AppState,
    CacheMetrics, ChromeCapture, Config, HealthChecker, ImageTransform, PipelineRunner,
    ThumbnailCache, ThumbnailKey,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(name = "webshot")]
#[command(about = "Caching thumbnail service for rendered web pages")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "RUN_URL", help = "Base URL pages are captured from")]
    pub run_url: Option<String>,

    #[arg(long, env = "HOST", help = "Bind address")]
    pub host: Option<String>,

    #[arg(long, env = "PORT", help = "Server port")]
    pub port: Option<u16>,

    #[arg(long, help = "Cache capacity in bytes")]
    pub cache_capacity: Option<usize>,

    #[arg(long, value_parser = parse_duration, help = "Exit after running this long (e.g. 3600, 45m, 1h)")]
    pub max_lifetime: Option<Duration>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve thumbnails over HTTP until the lifetime expires
    Serve,

    /// Render a single thumbnail to a file
    Render {
        #[arg(long, help = "Resource identifier")]
        id: String,

        #[arg(long, help = "Variant discriminator")]
        variant: String,

        #[arg(short, long, help = "Output file path")]
        output: PathBuf,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

/// Defaults, then the config file, then environment and flags.
pub async fn load_config(args: &Cli) -> Result<Config> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            fs::try_exists(&fallback)
                .await
                .unwrap_or(false)
                .then_some(fallback)
        }
    };

    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Config::from_file(&path).await?
        }
        None => Config::default(),
    };

    apply_overrides(&mut config, args);
    Ok(config)
}

pub fn apply_overrides(config: &mut Config, args: &Cli) {
    if let Some(run_url) = &args.run_url {
        config.run_url = Some(run_url.clone());
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(capacity) = args.cache_capacity {
        config.cache_capacity = capacity;
    }
    if let Some(lifetime) = args.max_lifetime {
        config.max_lifetime = lifetime;
    }
    if let Some(chrome_path) = &args.chrome_path {
        config.capture.chrome_path = Some(chrome_path.clone());
    }
}

pub struct CliRunner {
    pub config: Config,
    shutdown: watch::Receiver<bool>,
}

impl CliRunner {
    pub fn new(config: Config, shutdown: watch::Receiver<bool>) -> Self {
        Self { config, shutdown }
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve => self.run_serve().await,
            Commands::Render {
                id,
                variant,
                output,
            } => self.run_render(&id, &variant, &output).await,
            Commands::Validate { config } => self.validate_config(&config).await,
        }
    }

    pub async fn run_serve(&self) -> Result<()> {
        self.config.validate()?;
        let port = self.config.require_port()?;

        let prometheus = install_prometheus()
            .map_err(|e| anyhow!("failed to install metrics recorder: {e}"))?;

        let capture = Arc::new(ChromeCapture::launch(&self.config.capture).await?);
        let runner =
            PipelineRunner::from_config(&self.config, capture.clone(), Arc::new(ImageTransform))?;
        let cache = ThumbnailCache::new(
            self.config.cache_capacity,
            Arc::new(runner),
            CacheMetrics::register(),
        );
        let health = HealthChecker::new(cache.clone(), capture.clone(), self.config.max_lifetime);

        info!(
            "Cache capacity {}, exiting after {}",
            format_bytes(self.config.cache_capacity),
            format_duration(self.config.max_lifetime)
        );

        let listener = TcpListener::bind((self.config.host.as_str(), port))
            .await
            .with_context(|| format!("cannot bind {}:{}", self.config.host, port))?;

        let state = AppState {
            cache,
            health: Arc::new(health),
            prometheus: Some(prometheus),
        };

        // Outstanding requests and productions are abandoned on shutdown.
        let mut shutdown = self.shutdown.clone();
        let served = tokio::select! {
            served = serve(listener, state) => served.context("server error"),
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                info!("Stopping server");
                Ok(())
            }
        };

        capture.shutdown().await;
        served
    }

    pub async fn run_render(&self, id: &str, variant: &str, output: &Path) -> Result<()> {
        self.config.validate()?;
        let key = ThumbnailKey::new(id, variant)?;

        let capture = Arc::new(ChromeCapture::launch(&self.config.capture).await?);
        let runner =
            PipelineRunner::from_config(&self.config, capture.clone(), Arc::new(ImageTransform))?;
        let cache = ThumbnailCache::new(
            self.config.cache_capacity,
            Arc::new(runner),
            CacheMetrics::noop(),
        );

        let result = cache.get(key.as_str()).await;
        capture.shutdown().await;
        let thumbnail = result?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(output, &thumbnail).await?;
        info!("Thumbnail saved to: {}", output.display());

        println!("Thumbnail rendered successfully:");
        println!("  Key: {key}");
        println!("  Output: {}", output.display());
        println!("  Size: {}", format_bytes(thumbnail.len()));

        Ok(())
    }

    pub async fn validate_config(&self, config_path: &Path) -> Result<()> {
        println!("Validating configuration: {}", config_path.display());

        let config = Config::from_file(config_path).await?;
        config.validate()?;
        if config.port.is_none() {
            warn!("No port configured; `serve` needs --port or PORT");
        }

        println!("Configuration is valid:");
        println!("  Run URL: {}", config.run_url.as_deref().unwrap_or_default());
        match config.port {
            Some(port) => println!("  Bind: {}:{}", config.host, port),
            None => println!("  Bind: {} (no port)", config.host),
        }
        println!("  Cache capacity: {}", format_bytes(config.cache_capacity));
        println!("  Max lifetime: {}", format_duration(config.max_lifetime));
        println!(
            "  Viewport: {}x{}",
            config.capture.viewport.width, config.capture.viewport.height
        );
        println!(
            "  Thumbnail: {}px wide, cropped to {}x{} ({:?}), quality {}",
            config.thumbnail.resize_width,
            config.thumbnail.crop_width,
            config.thumbnail.crop_height,
            config.thumbnail.anchor,
            config.thumbnail.quality
        );

        Ok(())
    }
}

/// Flip `shutdown_tx` to `true` once: on SIGINT, SIGTERM or when the process
/// has lived for `max_lifetime`.
pub fn spawn_shutdown_handler(
    shutdown_tx: watch::Sender<bool>,
    max_lifetime: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(max_lifetime) => {
                info!("Maximum lifetime of {} reached", format_duration(max_lifetime));
            }
            _ = wait_for(SignalKind::interrupt()) => {
                info!("Received SIGINT");
            }
            _ = wait_for(SignalKind::terminate()) => {
                info!("Received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(true);
    })
}

async fn wait_for(kind: SignalKind) {
    match signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("Failed to install signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

pub fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
