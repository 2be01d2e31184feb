//! engage-daily - Run the daily engagement session
//!
//! Loads configuration, resumes or starts today's session, and runs it to
//! completion under the configured daily caps and pacing.

use clap::{Parser, ValueEnum};
use libengage::automation::DryRunSurface;
use libengage::clock::SystemClock;
use libengage::config::{expand_path, resolve_config_path};
use libengage::discovery::SeedFileSource;
use libengage::error::ConfigError;
use libengage::generation::TemplateGenerator;
use libengage::logging::{LogFormat, LoggingConfig};
use libengage::timing::plan_batches;
use libengage::{
    ActionKind, Collaborators, Config, DailyOrchestrator, EngageError, Result, StopSignal,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "engage-daily")]
#[command(version)]
#[command(about = "Run the daily engagement session")]
#[command(long_about = "\
engage-daily - Run the daily engagement session

DESCRIPTION:
    engage-daily discovers targets from hashtags and competitor followers,
    likes, comments on and follows them under per-day caps, and paces its
    actions with randomized delays and batch pauses.

    Progress is checkpointed after every action. If the run is interrupted,
    running engage-daily again the same day resumes where it stopped without
    repeating any action. A checkpoint from an earlier day is archived and a
    fresh session starts.

USAGE:
    # Run today's session
    engage-daily

    # Resume from a specific checkpoint file
    engage-daily --resume ~/.local/share/engagecast/checkpoint.json

    # Show how today's quota would be split into batches
    engage-daily --plan

SIGNALS:
    SIGTERM, SIGINT - Stop after the current action and save a checkpoint

CONFIGURATION:
    Configuration file: ~/.config/engagecast/config.toml
    Override with ENGAGE_CONFIG or --config.

    [limits]
    follows_per_day = 200
    likes_per_day = 200
    comments_per_day = 200

    [discovery]
    hashtags = [\"veganfitness\", \"biohacking\"]
    competitors = [\"someaccount\"]
    seed_file = \"~/.local/share/engagecast/seed.json\"

EXIT CODES:
    0 - Session completed
    1 - Session aborted or runtime error
    2 - Configuration error
    3 - Invalid input
    4 - Checkpoint corrupted
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "ENGAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Resume from this checkpoint file (must exist)
    #[arg(short, long, value_name = "PATH")]
    resume: Option<PathBuf>,

    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// JSON file of pre-scraped candidates (overrides discovery.seed_file)
    #[arg(long, value_name = "PATH")]
    seed_file: Option<PathBuf>,

    /// Fixed RNG seed for reproducible pacing (overrides timing.seed)
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Print today's batch plan and exit without acting
    #[arg(long)]
    plan: bool,

    /// Output format for the final report
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Log format (text, json, pretty)
    #[arg(long, default_value = "text", env = "ENGAGE_LOG_FORMAT")]
    log_format: LogFormat,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, "info".to_string(), cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = load_config(cli.config.as_ref())?;
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(seed) = cli.seed {
        config.timing.seed = Some(seed);
    }
    if let Some(path) = &cli.seed_file {
        config.discovery.seed_file = Some(path.display().to_string());
    }

    if cli.plan {
        print_plan(&config, cli.format)?;
        return Ok(0);
    }

    let seed_file = config
        .discovery
        .seed_file
        .as_deref()
        .ok_or_else(|| ConfigError::MissingField("discovery.seed_file".to_string()))?;
    let source = SeedFileSource::load(&expand_path(seed_file))?;
    info!("Loaded {} seed candidates", source.candidate_count());

    let collaborators = Collaborators {
        surface: Arc::new(DryRunSurface::new(config.browser.headless)),
        generator: Arc::new(TemplateGenerator),
        source: Arc::new(source),
        clock: Arc::new(SystemClock),
    };

    let stop = StopSignal::new();
    install_signal_handlers(stop.clone())?;

    let mut orchestrator = DailyOrchestrator::new(config, collaborators)?.with_stop_signal(stop);
    let report = orchestrator.run(cli.resume).await?;

    match cli.format {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }
    Ok(report.outcome.exit_code())
}

/// Explicit path must exist; the default location falls back to defaults
fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::load_from_path(&expand_path(&path.display().to_string()));
    }

    let path = resolve_config_path()?;
    if path.exists() {
        Config::load_from_path(&path)
    } else {
        info!(
            "No config at {}, using defaults",
            path.display()
        );
        let config = Config::default_config();
        config.validate()?;
        Ok(config)
    }
}

fn print_plan(config: &Config, format: OutputFormat) -> Result<()> {
    let mut rng = match config.timing.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let caps = config.limits.caps();
    let batch_size = config.timing.batch_size.max(1);

    let mut plan = BTreeMap::new();
    for kind in ActionKind::ALL {
        let total = caps.get(kind);
        let batches = total.div_ceil(batch_size);
        plan.insert(kind.as_str(), plan_batches(total, batches, &mut rng));
    }

    match format {
        OutputFormat::Json => println!("{}", render_json(&plan)?),
        OutputFormat::Text => {
            for kind in ActionKind::ALL {
                let batches = plan.get(kind.as_str()).cloned().unwrap_or_default();
                let sizes: Vec<String> = batches.iter().map(u32::to_string).collect();
                println!(
                    "{:<8} {:>4} in {} batch(es): {}",
                    kind,
                    caps.get(kind),
                    batches.len(),
                    sizes.join(" ")
                );
            }
        }
    }
    Ok(())
}

fn render_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngageError::InvalidInput(format!("Failed to render JSON: {}", e)))
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn install_signal_handlers(stop: StopSignal) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| EngageError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT || sig == SIGTERM {
                info!("Received shutdown signal, stopping after the current action...");
                stop.request_stop();
                break;
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(_stop: StopSignal) -> Result<()> {
    Ok(())
}
