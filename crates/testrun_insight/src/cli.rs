use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::snapshot::{AnalyticsSnapshot, assemble_with_config};
use crate::util::{read_json_rows, write_string};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "TESTRUN_INSIGHT_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "testrun_insight",
    about = "Conflict and failure-pattern analytics for test-execution records",
    version
)]
pub struct Cli {
    /// Log pipeline stages at debug level unless a filter is set.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a JSON array of test-execution rows.
    Analyze(AnalyzeArgs),

    /// Print the effective marker table in priority order.
    Markers(ConfigArgs),

    /// Print the built-in configuration as JSON.
    #[command(name = "default-config")]
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Section::All)]
    pub section: Section,

    #[arg(long)]
    pub compact: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    All,
    Summary,
    Conflicts,
    Patterns,
    Warnings,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze(args) => run_analyze(&args),
        Commands::Markers(args) => {
            let config = load_config(args.config.as_ref())?;
            print!("{}", render_markers(&config));
            Ok(())
        }
        Commands::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&EngineConfig::default())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_path(path),
        None => Ok(EngineConfig::default()),
    }
}

pub fn run_analyze(args: &AnalyzeArgs) -> Result<()> {
    let rendered = render_analysis(args)?;
    match &args.output {
        Some(path) => {
            write_string(path, &rendered)?;
            tracing::info!(path = %path.display(), "wrote analytics output");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Read, assemble, and serialize the requested section.
pub fn render_analysis(args: &AnalyzeArgs) -> Result<String> {
    let config = load_config(args.config.as_ref())?;
    let rows = read_json_rows(&args.input)?;
    let snapshot = assemble_with_config(&rows, &config)?;
    let value = section_value(&snapshot, args.section)?;
    let rendered = if args.compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    Ok(rendered)
}

fn section_value(snapshot: &AnalyticsSnapshot, section: Section) -> Result<serde_json::Value> {
    let value = match section {
        Section::All => serde_json::to_value(snapshot)?,
        Section::Summary => {
            let fingerprint = snapshot.fingerprint()?;
            json!({
                "version": snapshot.version,
                "fingerprint": fingerprint,
                "input_rows": snapshot.input_rows,
                "accepted_records": snapshot.accepted_records,
                "rejected_rows": snapshot.rejected_rows,
                "rejection_notice": snapshot.rejection_notice(),
                "status_shares": snapshot.aggregate.status_shares,
                "bug_ranking": snapshot.aggregate.bug_ranking,
                "conflict_count": snapshot.conflicts.len(),
                "offers_with_conflicts": snapshot.offers_with_conflicts,
                "pattern_count": snapshot.patterns.len(),
                "unexplained_failures": snapshot.unexplained_failures,
                "warning_count": snapshot.warnings.len(),
            })
        }
        Section::Conflicts => serde_json::to_value(&snapshot.conflicts)?,
        Section::Patterns => serde_json::to_value(&snapshot.patterns)?,
        Section::Warnings => serde_json::to_value(&snapshot.warnings)?,
    };
    Ok(value)
}

#[must_use]
pub fn render_markers(config: &EngineConfig) -> String {
    config
        .markers
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            format!(
                "{:>2}. {:<20} {}\n",
                index + 1,
                rule.normalized_marker(),
                rule.category
            )
        })
        .collect()
}
