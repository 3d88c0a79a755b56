//! Cento - headless block program runner
//!
//! Loads a block program (JSON or YAML), validates it and runs it against the
//! robot, standing in for the editor UI:
//! - `run` plays a program; Ctrl+C or SIGTERM stops it cleanly
//! - `validate` and `estimate` check a program without touching the robot
//! - `save` and `list` use the program store

use anyhow::{bail, Context, Result};
use cento::{
    discover, Block, BlockService, Config, ConsoleTelemetry, ExecutionTelemetry, JsonFileStore,
    LoggingChannel, MotionChannel, NoOpTelemetry, ProgramStore, RunOutcome, StaticBrowser,
    ZenohMotionChannel,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cento")]
#[command(about = "Cento robot controller - run block programs against the robot")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and run a program
    Run {
        program: PathBuf,
        /// Log commands instead of publishing them
        #[arg(long)]
        dry_run: bool,
        /// Resolve the robot through discovery before connecting
        #[arg(long)]
        discover: bool,
        /// Print block and run events as JSON on stdout
        #[arg(long)]
        telemetry: bool,
    },
    /// Check a program and report every violation
    Validate { program: PathBuf },
    /// Print the nominal run time of a program
    Estimate { program: PathBuf },
    /// Save a program to the program store
    Save { program: PathBuf },
    /// List saved programs
    List,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| std::env::var("DEFAULT_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/default_config.yaml".to_string())
    }
}

/// Read a program file, clamping parameters as the editor would
fn load_program(path: &Path) -> Result<Vec<Block>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read program {}", path.display()))?;
    let mut blocks: Vec<Block> = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid YAML program {}", path.display()))?,
        _ => serde_json::from_str(&contents)
            .with_context(|| format!("Invalid JSON program {}", path.display()))?,
    };
    for block in &mut blocks {
        block.clamp_params();
    }
    Ok(blocks)
}

async fn open_channel(config: &Config, dry_run: bool) -> Result<Arc<dyn MotionChannel>> {
    if dry_run {
        info!("Dry run: commands are logged, not published");
        return Ok(Arc::new(LoggingChannel::new()));
    }
    let channel = ZenohMotionChannel::connect(&config.robot)
        .await
        .context("Failed to connect to robot")?;
    Ok(Arc::new(channel))
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_program(
    mut config: Config,
    program: &Path,
    dry_run: bool,
    use_discovery: bool,
    telemetry: bool,
) -> Result<()> {
    let blocks = load_program(program)?;

    if use_discovery {
        let discovery = config.discovery();
        let mut browser = StaticBrowser::new(discovery.known_services.clone());
        let record = discover(&mut browser, &discovery.service_type(), discovery.timeout())
            .await
            .context("Robot discovery failed")?;
        info!("Using robot {} at {}", record.name, record.endpoint());
        config.robot.apply_discovery(&record);
    }

    let channel = open_channel(&config, dry_run).await?;
    let telemetry: Arc<dyn ExecutionTelemetry> = if telemetry {
        Arc::new(ConsoleTelemetry::new())
    } else {
        Arc::new(NoOpTelemetry)
    };
    let service = BlockService::with_telemetry(&config, channel, telemetry)?;

    let estimate = service.estimate(&blocks)?;
    info!("Running {} ({} blocks, ~{:.1}s)", program.display(), blocks.len(), estimate.as_secs_f64());

    let mut handle = service.start(&blocks)?;
    let outcome = tokio::select! {
        joined = &mut handle => joined??,
        _ = shutdown_signal() => {
            warn!("Shutdown signal received - stopping run");
            service.stop();
            handle.await??
        }
    };

    match outcome {
        RunOutcome::Completed => info!("Program completed"),
        RunOutcome::Cancelled => info!("Program cancelled"),
        RunOutcome::Failed(reason) => bail!("Program failed: {}", reason),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.get_config_path();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = if Path::new(&config_path).exists() {
        info!("Using config: {}", config_path);
        Config::load_from_path(&config_path).context("Failed to load configuration")?
    } else {
        warn!("Config {} not found, using defaults", config_path);
        Config::default()
    };

    match args.command {
        Command::Run { program, dry_run, discover, telemetry } => {
            run_program(config, &program, dry_run, discover, telemetry).await
        }
        Command::Validate { program } => {
            let blocks = load_program(&program)?;
            let result = cento::validate(&blocks);
            if result.is_valid() {
                info!("{}: valid", program.display());
                Ok(())
            } else {
                for violation in &result.violations {
                    error!("{}", violation);
                }
                bail!("{} violation(s) in {}", result.violations.len(), program.display())
            }
        }
        Command::Estimate { program } => {
            let blocks = load_program(&program)?;
            let service = BlockService::new(&config, Arc::new(LoggingChannel::new()))?;
            let estimate = service.estimate(&blocks)?;
            println!("{:.3}", estimate.as_secs_f64());
            Ok(())
        }
        Command::Save { program } => {
            let blocks = load_program(&program)?;
            let store = JsonFileStore::new(config.store().path());
            let saved = store.save(&blocks).await?;
            println!("{}", saved.id);
            Ok(())
        }
        Command::List => {
            let store = JsonFileStore::new(config.store().path());
            for saved in store.list().await? {
                println!("{}  {}  {} blocks", saved.id, saved.created_at.to_rfc3339(), saved.blocks.len());
            }
            Ok(())
        }
    }
}
