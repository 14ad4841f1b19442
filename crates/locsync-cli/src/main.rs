use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use locsync_config::{JobConfig, LocsyncConfig};
use locsync_core::SourceParser;
use locsync_engine::{run_job, Job};
use locsync_parsers_xml::KeyedXmlParser;
use locsync_store::Store;

#[derive(Parser)]
#[command(name = "locsync", version, about = "Localization synchronization engine")]
struct Cli {
    /// Configuration file (defaults to ./locsync.toml, then the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all configured jobs, or one selected with --job
    Run {
        #[arg(long)]
        job: Option<String>,

        /// Comma-separated list of externally modified languages
        #[arg(long)]
        langs: Option<String>,

        /// Regenerate everything, ignoring stored fingerprints
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Rebuild TS files from the database, skipping TS ingestion
        #[arg(long, default_value_t = false)]
        rebuild_ts: bool,

        /// Only regenerate localized output files
        #[arg(long, default_value_t = false)]
        output_only: bool,

        /// Print machine-readable JSON summaries
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Mark a string as skipped (hidden from TS emission and ingestion)
    Skip {
        /// Source string text
        #[arg(long)]
        string: String,

        /// String context
        #[arg(long, default_value = "")]
        context: String,

        /// Clear the flag instead of setting it
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).without_time())
        .init();

    let cli = Cli::parse();
    let (config, config_path) = match &cli.config {
        Some(path) => (locsync_config::load_config_from(path)?, path.clone()),
        None => locsync_config::load_config()?,
    };
    let base = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.cmd {
        Commands::Run { job, langs, force, rebuild_ts, output_only, json } => {
            run(&config, &base, job.as_deref(), langs.as_deref(), force, rebuild_ts, output_only, json)
        }
        Commands::Skip { string, context, clear } => skip(&config, &base, &string, &context, clear),
    }
}

fn open_store(config: &LocsyncConfig, base: &std::path::Path) -> Result<Store> {
    let store_path = base.join(config.store.as_deref().unwrap_or("locsync.db"));
    let store = Store::open(&store_path)?;
    info!(store = %store_path.display(), "store opened");
    Ok(store)
}

fn skip(
    config: &LocsyncConfig,
    base: &std::path::Path,
    string: &str,
    context: &str,
    clear: bool,
) -> Result<()> {
    let store = open_store(config, base)?;
    let Some(id) = store.get_string_id(string, context, false)? else {
        return Err(eyre!("no such string in the store"));
    };
    store.set_string_skip(id, !clear)?;
    if clear {
        println!("cleared skip flag on {string:?}");
    } else {
        println!("set skip flag on {string:?}");
    }
    Ok(())
}

fn make_parser(cfg: &JobConfig) -> Result<Box<dyn SourceParser>> {
    match cfg.parser.as_deref().unwrap_or("keyed-xml") {
        "keyed-xml" => Ok(Box::new(KeyedXmlParser)),
        other => Err(eyre!("unknown parser '{other}' for job '{}'", cfg.id)),
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    config: &LocsyncConfig,
    base: &std::path::Path,
    only_job: Option<&str>,
    langs: Option<&str>,
    force: bool,
    rebuild_ts: bool,
    output_only: bool,
    json: bool,
) -> Result<()> {
    let store = open_store(config, base)?;

    let modified: Option<Vec<String>> = langs.map(|l| {
        l.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    });

    let selected: Vec<&JobConfig> = config
        .jobs
        .iter()
        .filter(|j| only_job.map_or(true, |id| j.id == id))
        .collect();
    if selected.is_empty() {
        return Err(eyre!("no matching jobs in configuration"));
    }

    let mut failed = false;
    for cfg in selected {
        let parser = make_parser(cfg)?;
        let mut job = Job::from_config(cfg, base, parser)?;
        job.modified_languages = modified.clone();
        if force {
            job.optimizations = false;
        }
        if rebuild_ts {
            job.rebuild_ts_files = true;
        }
        if output_only {
            job.output_only_mode = true;
        }

        match run_job(&store, &job) {
            Ok(summary) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    print_summary(&summary);
                }
            }
            Err(e) => {
                failed = true;
                tracing::error!(job = %cfg.id, "job failed: {e}");
            }
        }
    }
    if failed {
        return Err(eyre!("one or more jobs failed"));
    }
    Ok(())
}

fn print_summary(summary: &locsync_engine::JobSummary) {
    println!(
        "[{}] scanned {} ({} parsed, {} skipped, {} renamed, {} orphaned); ts read {}, ts written {}, localized written {}",
        summary.job,
        summary.files_scanned,
        summary.files_parsed,
        summary.files_skipped,
        summary.files_renamed,
        summary.files_orphaned,
        summary.ts_files_read,
        summary.ts_files_written,
        summary.localized_files_written,
    );
    for w in &summary.warnings {
        match (&w.file, &w.lang) {
            (Some(f), Some(l)) => println!("  warning [{f}/{l}]: {}", w.message),
            (Some(f), None) => println!("  warning [{f}]: {}", w.message),
            _ => println!("  warning: {}", w.message),
        }
    }
}
