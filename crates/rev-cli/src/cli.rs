use clap::{Parser, Subcommand, ValueEnum};

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ModeArg {
    Auto,
    QuickEdit,
    FocusedFeature,
    FullFeature,
    Refactor,
    TestFocus,
    Exploration,
    SecurityAudit,
}

#[derive(Parser)]
#[command(name = "rev", version)]
#[command(about = "rev: autonomous coding-change orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose diagnostics (sets RUST_LOG-style debug filtering)
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a natural-language coding request against a workspace
    Run {
        /// The request to satisfy
        request: String,

        /// Workspace root (defaults to CWD)
        #[arg(long)]
        workspace: Option<String>,

        /// Additional allowed roots for path resolution
        #[arg(long = "add-root")]
        add_roots: Vec<String>,

        /// Coerce every mutating action to a review
        #[arg(long)]
        read_only: bool,

        /// Resume a checkpointed session by ID
        #[arg(long)]
        resume: Option<String>,

        /// Execution profile override (default: routed from the request)
        #[arg(long, default_value = "auto")]
        mode: ModeArg,

        /// Loop iteration cap
        #[arg(long, default_value_t = 40)]
        max_steps: u32,
    },

    /// Inspect or update the durable project memory
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },

    /// Report workspace/tooling health for this environment
    Doctor {
        /// Workspace root (defaults to CWD)
        #[arg(long)]
        workspace: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Print the project memory file
    Show {
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Record a known failure mode
    RecordFailure {
        title: String,
        #[arg(long)]
        symptom: String,
        #[arg(long)]
        fix: String,
        #[arg(long)]
        workspace: Option<String>,
    },
}
