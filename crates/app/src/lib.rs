use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use clearmark_core::capability;
use clearmark_core::config::{
    config_path, data_dir, initialize_data_dir, resolve_relative_to, AppConfig,
};
use clearmark_core::detect::{RectMask, RegionDetector};
use clearmark_core::image_io::ImageSource;
use clearmark_core::logging::{self, FileSinkPlan, LoggingInitOptions, DEFAULT_LOG_FILTER};
use clearmark_core::models::{ModelRegistry, DEFAULT_MODEL};
use clearmark_core::pipeline::Stage;
use clearmark_core::{ExecutionBackend, Inpainter, RuntimeEnv};

#[derive(Parser)]
#[command(name = "clearmark", about = "On-device watermark removal via ONNX inpainting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true, help = "Data directory (models, config, logs)")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove a watermark from an image
    Run(RunArgs),
    /// Manage inpainting models
    Models {
        #[command(subcommand)]
        command: ModelsCommands,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(help = "Input image: a file path or an http(s) URL")]
    image: String,

    #[arg(short = 'o', long, help = "Write the result PNG here instead of printing a data URL")]
    output: Option<PathBuf>,

    #[arg(long, help = "Force execution backend: webgpu or cpu")]
    backend: Option<String>,

    #[arg(long, help = "Model to use", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(
        long,
        value_name = "X,Y,W,H",
        help = "Watermark region in pixels (default: 240x80 bottom-right corner)"
    )]
    region: Option<String>,

    #[arg(long, help = "Override CPU inference thread count")]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum ModelsCommands {
    /// List known models and their download state
    List,
    /// Download a model's weights
    Download {
        #[arg(default_value = DEFAULT_MODEL)]
        name: String,
    },
}

const DEFAULT_REGION_WIDTH: u32 = 240;
const DEFAULT_REGION_HEIGHT: u32 = 80;

pub async fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    init_logging(
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
    );
    log_startup_metadata(&resolved_data_dir);

    if let Err(e) = initialize_data_dir(&resolved_data_dir) {
        warn!(error = %e, "Failed to initialize data directory");
    }
    let cfg_path = config_path(&resolved_data_dir);
    let config = match AppConfig::load_from_path(&cfg_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config file, using defaults");
            AppConfig::default()
        }
    };

    let runtime_dir = config
        .paths
        .runtime_dir
        .as_deref()
        .map(|dir| resolve_relative_to(&resolved_data_dir, dir));
    clearmark_core::runtime::configure_ort_dylib(runtime_dir.as_deref());

    let models_dir = resolve_relative_to(&resolved_data_dir, &config.paths.models_dir);
    let mut registry = ModelRegistry::with_builtin_models(models_dir);
    if let Err(e) = registry.discover() {
        warn!(error = %e, "Model discovery failed");
    }

    match cli.command {
        Commands::Run(args) => run_inpaint(args, registry, &config).await,
        Commands::Models { command } => match command {
            ModelsCommands::List => {
                list_models(&registry);
                Ok(())
            }
            ModelsCommands::Download { name } => download_model(registry, name).await,
        },
    }
}

fn init_logging(data_dir: Option<&Path>, verbose: u8, cli_log_filter: Option<&str>) {
    let init_options = LoggingInitOptions {
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let init_plan = logging::compose_logging_init_plan(&init_options);
    let env_filter = parse_env_filter_with_fallback(&init_plan.filter);

    match init_plan.file_sink {
        FileSinkPlan::Ready(ready) => {
            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(env_filter),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(ready.appender)
                        .with_filter(parse_env_filter_with_fallback(&init_plan.filter)),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }

            warn!(
                reason = %fallback.reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn log_startup_metadata(data_dir: &Path) {
    info!(
        pid = std::process::id(),
        data_dir = %data_dir.display(),
        config_path = %config_path(data_dir).display(),
        "Runtime startup metadata"
    );
}

fn list_models(registry: &ModelRegistry) {
    for entry in registry.list() {
        let state = if registry.is_downloaded(&entry.name) {
            "downloaded"
        } else if entry.url.is_some() {
            "available"
        } else {
            "local only"
        };
        println!("{:<12} [{state}] {}", entry.name, entry.description);
    }
}

async fn download_model(registry: ModelRegistry, name: String) -> Result<()> {
    if registry.is_downloaded(&name) {
        info!(model = %name, "Model already downloaded");
        return Ok(());
    }
    let path = tokio::task::spawn_blocking(move || registry.download(&name))
        .await
        .context("download task panicked")??;
    println!("{}", path.display());
    Ok(())
}

async fn run_inpaint(args: RunArgs, registry: ModelRegistry, config: &AppConfig) -> Result<()> {
    if !registry.is_downloaded(&args.model) {
        let dl_registry = registry.clone();
        let model = args.model.clone();
        info!(model = %model, "Model weights missing; downloading");
        tokio::task::spawn_blocking(move || dl_registry.download(&model))
            .await
            .context("download task panicked")??;
    }

    let detector = build_detector(args.region.as_deref())?;
    let capabilities = capability::probe();
    let env = resolve_runtime_env(&capabilities, args.backend.as_deref(), args.threads, config)?;
    info!(
        backend = %env.backend,
        threads = env.thread_count,
        parallel = env.parallel_execution,
        "Resolved runtime environment"
    );

    let inpainter =
        Inpainter::new(registry, detector, &capabilities, &args.model).with_env(env);

    let source = parse_image_source(&args.image);
    let progress = |stage: Stage| {
        info!(?stage, "{:>3.0}%", stage.fraction() * 100.0);
    };
    let data_url = inpainter
        .run_with(source, Some(&progress), CancellationToken::new())
        .await
        .context("inpainting failed")?;

    match args.output {
        Some(path) => {
            write_data_url_to_file(&data_url, &path)?;
            info!(path = %path.display(), "Result written");
        }
        None => println!("{data_url}"),
    }
    Ok(())
}

fn parse_image_source(image: &str) -> ImageSource {
    if image.starts_with("http://") || image.starts_with("https://") {
        ImageSource::Url(image.to_string())
    } else {
        ImageSource::Path(PathBuf::from(image))
    }
}

/// Parse `--region X,Y,W,H` into a detector; defaults to a bottom-right
/// rectangle when unset.
fn build_detector(region: Option<&str>) -> Result<Arc<dyn RegionDetector>> {
    let Some(spec) = region else {
        return Ok(Arc::new(RectMask::bottom_right(
            DEFAULT_REGION_WIDTH,
            DEFAULT_REGION_HEIGHT,
        )));
    };

    let parts: Vec<u32> = spec
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("invalid --region '{spec}' (expected X,Y,W,H)"))?;
    if parts.len() != 4 {
        bail!("invalid --region '{spec}': expected 4 comma-separated values, got {}", parts.len());
    }
    if parts[2] == 0 || parts[3] == 0 {
        bail!("invalid --region '{spec}': width and height must be non-zero");
    }

    Ok(Arc::new(RectMask::new(parts[0], parts[1], parts[2], parts[3])))
}

/// Backend/thread resolution: CLI flag > config > capability probe.
fn resolve_runtime_env(
    capabilities: &capability::Capabilities,
    cli_backend: Option<&str>,
    cli_threads: Option<usize>,
    config: &AppConfig,
) -> Result<RuntimeEnv> {
    let mut env = RuntimeEnv::from_capabilities(capabilities);

    let backend_override = cli_backend.or(config.inference.backend.as_deref());
    if let Some(raw) = backend_override {
        let backend = ExecutionBackend::from_str_lossy(raw);
        if backend == ExecutionBackend::Cpu && !raw.eq_ignore_ascii_case("cpu") {
            bail!("unknown backend '{raw}' (expected 'webgpu' or 'cpu')");
        }
        if backend != env.backend {
            warn!(requested = %backend, probed = %env.backend, "Overriding probed backend");
        }
        env = env.with_backend(backend);
    }

    if let Some(threads) = cli_threads.or(config.inference.threads) {
        if threads == 0 {
            bail!("thread count must be non-zero");
        }
        env.thread_count = threads;
    }

    Ok(env)
}

fn write_data_url_to_file(data_url: &str, path: &Path) -> Result<()> {
    let payload = data_url
        .strip_prefix("data:image/png;base64,")
        .context("unexpected data URL format")?;
    let png = BASE64
        .decode(payload)
        .context("data URL payload is not valid base64")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }
    std::fs::write(path, png).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
