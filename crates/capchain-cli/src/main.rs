//! capchain: diagnostic command-line surface over the capture chain
//!
//! Shows what the detector saw, which providers would run, and what a real
//! capture walk did, without any host application in between.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use capchain_core::{
    capture::{CaptureBackend, CaptureExecution, CaptureOutcome, CaptureRequest, ChainConfig},
    model::{CaptureKind, CaptureOptions, Region},
    util::detect::detect_environment,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

const EXIT_CANCELLED: u8 = 2;

#[derive(Parser)]
#[command(name = "capchain")]
#[command(about = "Inspect and exercise the screen capture provider chain")]
struct Cli {
    /// JSON file overriding chain settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected environment and capture context
    Detect,
    /// List monitors
    Monitors,
    /// Print the active backend's capabilities
    Capabilities,
    /// Show provider order and applicability without capturing
    Chain {
        #[arg(long, value_enum, default_value_t = Kind::Full)]
        kind: Kind,
        /// Exclude portal and desktop D-Bus mechanisms
        #[arg(long)]
        no_modern: bool,
    },
    /// Walk the chain and save the image
    Capture {
        #[arg(long, value_enum, default_value_t = Kind::Full)]
        kind: Kind,
        /// Output PNG path
        #[arg(short, long)]
        out: PathBuf,
        /// Exclude portal and desktop D-Bus mechanisms
        #[arg(long)]
        no_modern: bool,
        /// Include the mouse pointer where the mechanism supports it
        #[arg(long)]
        cursor: bool,
        #[command(flatten)]
        report: Report,
    },
    /// Capture a physical-pixel region of the virtual desktop
    CaptureRegion {
        #[arg(long, allow_hyphen_values = true)]
        x: i32,
        #[arg(long, allow_hyphen_values = true)]
        y: i32,
        #[arg(long)]
        width: i32,
        #[arg(long)]
        height: i32,
        /// Output PNG path
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        cursor: bool,
        #[command(flatten)]
        report: Report,
    },
}

#[derive(Args)]
struct Report {
    /// Print the decision trace as JSON
    #[arg(long)]
    trace: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Full,
    Window,
    Region,
}

impl From<Kind> for CaptureKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Full => CaptureKind::FullScreen,
            Kind::Window => CaptureKind::ActiveWindow,
            Kind::Region => CaptureKind::Region,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.json)?;

    let config = match &cli.config {
        Some(path) => ChainConfig::from_file(path)?,
        None => ChainConfig::default(),
    };

    let code = match cli.command {
        Commands::Detect => detect(&config).await?,
        Commands::Monitors => monitors(&config).await?,
        Commands::Capabilities => capabilities(&config).await?,
        Commands::Chain { kind, no_modern } => chain(&config, kind, no_modern).await?,
        Commands::Capture {
            kind,
            out,
            no_modern,
            cursor,
            report,
        } => {
            let request = CaptureRequest::new(kind.into())
                .with_modern_capture(!no_modern)
                .with_options(CaptureOptions::default().with_cursor(cursor));
            capture(&config, request, &out, &report).await?
        }
        Commands::CaptureRegion {
            x,
            y,
            width,
            height,
            out,
            cursor,
            report,
        } => {
            let region = Region::new(x, y, width, height);
            let options = CaptureOptions::default().with_cursor(cursor);
            capture_region(&config, region, &options, &out, &report).await?
        }
    };

    Ok(code)
}

fn init_logging(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("capchain_cli=info".parse()?)
        .add_directive("capchain_core=warn".parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_backend(config: &ChainConfig) -> Result<CaptureBackend> {
    CaptureBackend::create_with_config(config)
        .await
        .map_err(|e| anyhow::anyhow!("{e}\nHint: {}", e.remediation_hint()))
}

async fn detect(config: &ChainConfig) -> Result<ExitCode> {
    #[derive(Serialize)]
    struct Detection<'a> {
        environment: capchain_core::model::EnvironmentInfo,
        context:     Option<&'a capchain_core::capture::CaptureContext>,
        engine:      Option<String>,
    }

    let environment = detect_environment();
    let backend = match open_backend(config).await {
        Ok(backend) => Some(backend),
        Err(e) => {
            tracing::warn!("No capture backend: {e}");
            None
        }
    };

    print_json(&Detection {
        environment,
        context: backend.as_ref().map(CaptureBackend::context),
        engine: backend.as_ref().and_then(|b| b.engine_name().ok()),
    })?;

    if let Some(backend) = backend {
        backend.dispose();
    }
    Ok(ExitCode::SUCCESS)
}

async fn monitors(config: &ChainConfig) -> Result<ExitCode> {
    let backend = open_backend(config).await?;
    let monitors = backend.get_monitors().await?;

    println!("Found {} monitor(s):\n", monitors.len());
    for monitor in &monitors {
        let bounds = monitor.bounds;
        println!(
            "  {} ({}){}",
            monitor.name,
            monitor.id,
            if monitor.is_primary { " [primary]" } else { "" }
        );
        println!(
            "    {}x{} at {},{}  scale {}  {} Hz",
            bounds.width, bounds.height, bounds.x, bounds.y, monitor.scale_factor, monitor.refresh_rate
        );
    }

    backend.dispose();
    Ok(ExitCode::SUCCESS)
}

async fn capabilities(config: &ChainConfig) -> Result<ExitCode> {
    let backend = open_backend(config).await?;
    print_json(&backend.get_capabilities()?)?;
    backend.dispose();
    Ok(ExitCode::SUCCESS)
}

async fn chain(config: &ChainConfig, kind: Kind, no_modern: bool) -> Result<ExitCode> {
    let backend = open_backend(config).await?;
    let request = CaptureRequest::new(kind.into()).with_modern_capture(!no_modern);
    let plan = backend.plan(&request)?;

    println!("Engine: {}", backend.engine_name()?);
    for entry in &plan {
        let verdict = if entry.would_run() {
            "would run"
        } else if !entry.stage_enabled {
            "stage disabled"
        } else {
            "not applicable"
        };
        println!("  {:<12} {:<18} {}", entry.provider_id, entry.stage.as_str(), verdict);
    }

    backend.dispose();
    Ok(ExitCode::SUCCESS)
}

/// Cancels the token on Ctrl-C so the walk stops at the current provider
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling capture");
            trigger.cancel();
        }
    });
    cancel
}

async fn capture(
    config: &ChainConfig,
    request: CaptureRequest,
    out: &Path,
    report: &Report,
) -> Result<ExitCode> {
    let backend = open_backend(config).await?;
    let cancel = cancel_on_interrupt();

    println!("Capturing {} via {}...", request.kind, backend.engine_name()?);
    let execution = backend.capture(&request, &cancel).await?;
    backend.dispose();

    finish(execution, out, report)
}

async fn capture_region(
    config: &ChainConfig,
    region: Region,
    options: &CaptureOptions,
    out: &Path,
    report: &Report,
) -> Result<ExitCode> {
    let backend = open_backend(config).await?;
    let cancel = cancel_on_interrupt();

    println!(
        "Capturing {}x{} at {},{}...",
        region.width, region.height, region.x, region.y
    );
    let execution = backend.capture_region(region, options, &cancel).await?;
    backend.dispose();

    finish(execution, out, report)
}

/// Saves the image, prints the trace, and maps the outcome to an exit code
fn finish(execution: CaptureExecution, out: &Path, report: &Report) -> Result<ExitCode> {
    if report.trace {
        print_json(&execution.trace)?;
    }

    match execution.outcome {
        CaptureOutcome::Success { provider_id, image } => {
            image
                .write_png(out)
                .with_context(|| format!("writing {}", out.display()))?;
            let (width, height) = image.dimensions();
            println!("✓ {width}x{height} via {provider_id} saved to {}", out.display());
            Ok(ExitCode::SUCCESS)
        }
        CaptureOutcome::Cancelled { provider_id } => {
            println!("Capture cancelled in {provider_id}");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        CaptureOutcome::Failure { reason, .. } => {
            eprintln!(
                "Capture failed: {}",
                reason.as_deref().unwrap_or("no provider produced an image")
            );
            eprintln!("Trace: {}", execution.trace.summary());
            Ok(ExitCode::FAILURE)
        }
    }
}
