use anyhow::{bail, Context};
use clap::Parser;
use kagami::config::{Config, StorageBackend};
use kagami::engine::RasterEngine;
use kagami::handler::{Collaborators, ImageHandler};
use kagami::request::InboundRequest;
use kagami::store::{LocalStore, MemoryStyleStore, ObjectStore, S3Store};
use kagami::vision::DisabledVision;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Kagami - resolve and render a single image request
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Request path, e.g. /fit-in/200x200/filters:grayscale()/cat.jpg
    #[arg(short, long, required_unless_present = "check")]
    path: Option<String>,

    /// Accept header sent by the caller
    #[arg(long)]
    accept: Option<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "query", value_parser = parse_query)]
    query: Vec<(String, String)>,

    /// Write the response body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn parse_query(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config).map_err(anyhow::Error::msg)?;
    config.apply_env_overrides();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    kagami::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!(
        config_file = %args.config.display(),
        buckets = config.source_buckets.len(),
        rewrite = config.rewrite.is_configured(),
        signature = config.signature.enabled,
        styles = config.styles.len(),
        "Configuration loaded successfully"
    );

    if args.check {
        println!("Configuration OK");
        return Ok(());
    }

    let objects: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::S3 => Arc::new(
            S3Store::from_env(config.storage.region.as_deref(), config.storage.endpoint.as_deref()).await,
        ),
        StorageBackend::Local => {
            let root = config
                .storage
                .root
                .clone()
                .context("storage.root is required for the local backend")?;
            Arc::new(LocalStore::new(root))
        }
    };

    let engine = match &config.watermark.font_path {
        Some(font) => RasterEngine::with_font_file(font)
            .with_context(|| format!("Failed to load font {}", font.display()))?,
        None => RasterEngine::new(),
    };

    let handler = ImageHandler::new(
        &config,
        Collaborators {
            objects,
            styles: Arc::new(MemoryStyleStore::from_styles(&config.styles)),
            vision: Arc::new(DisabledVision),
            engine: Arc::new(engine),
        },
    )?;

    let mut inbound = InboundRequest::new(args.path.unwrap_or_default());
    inbound.accept = args.accept;
    inbound.query.extend(args.query);

    let response = handler.handle(inbound).await;
    match &args.output {
        Some(path) => std::fs::write(path, &response.body)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(&response.body)?,
    }

    if response.status >= 400 {
        bail!("Request failed with status {}", response.status);
    }
    Ok(())
}
