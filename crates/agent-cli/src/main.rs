//! agent-cli: capa de presentación por consola.
//!
//! `ask` clasifica una consulta libre y abre el caso que corresponda; `run`
//! abre un caso directamente. Ambos entran a un REPL de comandos sobre el
//! scheduler. `replay` reconstruye un export y `export` vuelca la sesión
//! persistida.
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use agent_adapters::{default_registry, KeywordClassifier, MISSING_TRANSFER};
use agent_core::{CaseRegistry, FlowMode, LedgerExport, StaticCaseRegistry};
use agent_persistence::{store_from_config, SnapshotStore};
use agentflow_rust::{Scheduler, SchedulerConfig, CONFIG};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod render;
mod repl;
mod transcript;

#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(version)]
#[command(about = "Step-by-step support agent runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Run mode (defaults to AGENTFLOW_MODE)
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeArg>,

    /// Autoplay speed multiplier (defaults to AGENTFLOW_SPEED)
    #[arg(long, global = true)]
    speed: Option<f64>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Interactive,
    Autoplay,
}

impl From<ModeArg> for FlowMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Interactive => FlowMode::Interactive,
            ModeArg::Autoplay => FlowMode::Autoplay,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Describe the problem; opens the matching case if the trigger fires
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Open a case by type
    Run {
        #[arg(default_value = MISSING_TRANSFER)]
        case_type: String,

        /// Continue the saved session instead of starting over
        #[arg(long)]
        restore: bool,
    },

    /// Rebuild an exported transcript and compare terminal statuses
    Replay {
        file: PathBuf,

        /// Case type of the transcript (detected from step ids if omitted)
        #[arg(long = "case")]
        case_type: Option<String>,
    },

    /// Print the saved session as an export document
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered case types
    Cases,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
                             .with_writer(std::io::stderr)
                             .init();

    let registry = Arc::new(default_registry()?);
    let mut config = CONFIG.scheduler.clone();
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    if let Some(speed) = cli.speed {
        config.speed = speed;
    }

    match cli.command {
        Commands::Ask { query } => {
            let query = query.join(" ");
            let classifier = KeywordClassifier::default();
            let Some(case_type) = classifier.classify(&query) else {
                println!("Nothing I can run for \"{query}\" yet. Try describing a missing transfer or deposit.");
                return Ok(());
            };
            let scheduler = open(registry, config, case_type, false)?;
            repl::run(scheduler).await
        }
        Commands::Run { case_type, restore } => {
            let scheduler = open(registry, config, &case_type, restore)?;
            repl::run(scheduler).await
        }
        Commands::Replay { file, case_type } => {
            let json = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let export = LedgerExport::from_json(&json).context("parsing transcript")?;
            let report = transcript::replay_export(&*registry, &export, case_type.as_deref())?;
            println!("{}", report);
            Ok(())
        }
        Commands::Export { output } => {
            let snapshots = SnapshotStore::new(store_from_config(&CONFIG.store), CONFIG.store.session_key.clone());
            let flow = snapshots.load(&*registry)?.ok_or_else(|| {
                                                        anyhow!("no saved session under '{}' (is AGENTFLOW_STATE_DIR set?)",
                                                                snapshots.key())
                                                    })?;
            let json = LedgerExport::from_flow(&flow).to_json_pretty()?;
            match output {
                Some(path) => fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?,
                None => println!("{json}"),
            }
            Ok(())
        }
        Commands::Cases => {
            print_cases(&registry);
            Ok(())
        }
    }
}

fn open(registry: Arc<StaticCaseRegistry>,
        config: SchedulerConfig,
        case_type: &str,
        restore: bool)
        -> anyhow::Result<Scheduler> {
    let snapshots = SnapshotStore::new(store_from_config(&CONFIG.store), CONFIG.store.session_key.clone());
    let builder = Scheduler::builder(registry).config(config).snapshots(snapshots);
    let scheduler = if restore {
        builder.restore_or_create(case_type)?
    } else {
        builder.create(case_type)?
    };
    Ok(scheduler)
}

fn print_cases(registry: &StaticCaseRegistry) {
    for case_type in registry.case_types() {
        if let Some(definition) = registry.definition(case_type) {
            println!("{:<24} {} ({} steps)", case_type, definition.title, definition.len());
        }
    }
}
