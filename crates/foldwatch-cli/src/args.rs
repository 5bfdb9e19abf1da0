use clap::{Parser, Subcommand, ValueEnum};
use foldwatch_history::ProductionView;

#[derive(Parser)]
#[command(name = "foldwatch")]
#[command(about = "Monitor distributed folding clients", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory holding config, history and saved queries.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Log filter, e.g. "info" or "foldwatch_runtime=debug".
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage monitored clients
    Client {
        #[command(subcommand)]
        command: ClientCommand,
    },

    /// Poll every configured file-based client once
    Sweep {
        /// Maximum clients polled in parallel
        #[arg(long, default_value = "4")]
        workers: usize,
    },

    /// Inspect the work-unit history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Inspect frame-time benchmarks
    Bench {
        #[command(subcommand)]
        command: BenchCommand,
    },
}

#[derive(Subcommand)]
pub enum ClientCommand {
    /// Register a client monitored through its on-disk log artifacts
    Add {
        name: String,

        /// Directory containing log.txt, queue.json and status.json
        #[arg(long)]
        log_root: String,

        /// Corrective offset for a client whose clock drifts, minutes
        #[arg(long, default_value = "0")]
        clock_offset_minutes: i64,

        /// Treat log times as already being UTC
        #[arg(long)]
        ignore_utc_offset: bool,
    },

    /// Show all configured clients
    List,

    Remove {
        name: String,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    List {
        /// Saved query name to filter with
        #[arg(long)]
        query: Option<String>,

        /// How production figures are computed
        #[arg(long, value_enum, default_value = "frame-time")]
        view: ViewArg,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "25")]
        page_size: usize,

        /// Ad-hoc filter: project number
        #[arg(long)]
        project: Option<u32>,

        /// Ad-hoc filter: client name pattern (% and _ wildcards)
        #[arg(long)]
        client: Option<String>,
    },

    /// Remove one archived entry by id
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum BenchCommand {
    /// Poll file-based clients once and show the resulting benchmarks
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ViewArg {
    /// Production from observed frame durations
    FrameTime,
    /// Production from wall-clock assigned-to-finished elapsed
    EffectiveRate,
}

impl From<ViewArg> for ProductionView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::FrameTime => ProductionView::FrameTime,
            ViewArg::EffectiveRate => ProductionView::EffectiveRate,
        }
    }
}
