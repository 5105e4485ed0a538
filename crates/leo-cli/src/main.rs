mod cmd;
mod context;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, eligibility::EligibilitySubcommand, handoff::HandoffSubcommand,
    judge::JudgeSubcommand, protocol::ProtocolSubcommand, risk::RiskSubcommand,
    sd::SdSubcommand, uat::UatSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "leo",
    about = "LEO Protocol governance: handoff gates, risk tiers, improvement review, protocol versions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .leo/ or .git/)
    #[arg(long, global = true, env = "LEO_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .leo/ in the current project
    Init,

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Inspect strategic directives
    Sd {
        #[command(subcommand)]
        subcommand: SdSubcommand,
    },

    /// Run phase handoffs
    Handoff {
        #[command(subcommand)]
        subcommand: HandoffSubcommand,
    },

    /// Classify improvements into risk tiers
    Risk {
        #[command(subcommand)]
        subcommand: RiskSubcommand,
    },

    /// Check improvements against the AUTO-apply thresholds
    Eligibility {
        #[command(subcommand)]
        subcommand: EligibilitySubcommand,
    },

    /// Score improvements with the constitution and the AI judge
    Judge {
        #[command(subcommand)]
        subcommand: JudgeSubcommand,
    },

    /// Protocol document versions, cache, session reads, and watcher
    Protocol {
        #[command(subcommand)]
        subcommand: ProtocolSubcommand,
    },

    /// UAT run summaries and failure conversion
    Uat {
        #[command(subcommand)]
        subcommand: UatSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match (&cli.command, cli.verbose) {
        (_, true) => tracing::Level::DEBUG,
        (Commands::Protocol { subcommand: ProtocolSubcommand::Watch { .. } }, _) => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Sd { subcommand } => cmd::sd::run(&root, subcommand, cli.json),
        Commands::Handoff { subcommand } => cmd::handoff::run(&root, subcommand, cli.json),
        Commands::Risk { subcommand } => cmd::risk::run(&root, subcommand, cli.json),
        Commands::Eligibility { subcommand } => cmd::eligibility::run(&root, subcommand, cli.json),
        Commands::Judge { subcommand } => cmd::judge::run(&root, subcommand, cli.json),
        Commands::Protocol { subcommand } => cmd::protocol::run(&root, subcommand, cli.json),
        Commands::Uat { subcommand } => cmd::uat::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
