use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::config::ConfigAction;
use crate::commands::index::IndexAction;
use crate::commands::run::RunOptions;
use crate::commands::{self, CommandReport, Workspace};

#[derive(Parser)]
#[command(
    name = "spec-archive",
    about = "Detect finished specs and move them into a searchable archive",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: SPEC_ARCHIVE_ROOT, then the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Archive every complete, settled spec
    Run {
        /// Report what would happen without touching the filesystem
        #[arg(long)]
        dry_run: bool,
    },

    /// Show completion status for one spec
    Check { spec: String },

    /// Archive one spec now, ignoring the delay window
    Archive { spec: String },

    /// Query and maintain the archive index
    Index {
        #[command(subcommand)]
        subcommand: IndexSubcommand,
    },

    /// Inspect or create the archival config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Resolved paths and environment sanity checks
    Status,
}

#[derive(Subcommand)]
enum IndexSubcommand {
    /// List every archived spec, newest first
    List,
    /// Case-insensitive substring search on spec names
    Search { term: String },
    /// Most recent archive of a spec
    Show { spec: String },
    /// Totals and date range
    Stats,
    /// Reconcile the index with the archive directory
    Repair,
    /// Drop an entry from the index
    Remove {
        archive_path: String,
        /// Also delete the archived directory
        #[arg(long)]
        purge: bool,
    },
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Effective config (file plus environment overrides)
    Show,
    /// Write a default config file
    Init {
        #[arg(long)]
        force: bool,
    },
}

impl From<IndexSubcommand> for IndexAction {
    fn from(sub: IndexSubcommand) -> Self {
        match sub {
            IndexSubcommand::List => Self::List,
            IndexSubcommand::Search { term } => Self::Search { term },
            IndexSubcommand::Show { spec } => Self::Show { spec },
            IndexSubcommand::Stats => Self::Stats,
            IndexSubcommand::Repair => Self::Repair,
            IndexSubcommand::Remove {
                archive_path,
                purge,
            } => Self::Remove {
                archive_path,
                purge,
            },
        }
    }
}

impl From<ConfigSubcommand> for ConfigAction {
    fn from(sub: ConfigSubcommand) -> Self {
        match sub {
            ConfigSubcommand::Show => Self::Show,
            ConfigSubcommand::Init { force } => Self::Init { force },
        }
    }
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for line in &report.details {
        println!("{line}");
    }
    for issue in &report.issues {
        eprintln!("issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let ws = Workspace::load(cli.root.as_deref())?;

    let report = match cli.command {
        Command::Run { dry_run } => commands::run::run(&ws, &RunOptions { dry_run })?,
        Command::Check { spec } => commands::check::run(&ws, &spec)?,
        Command::Archive { spec } => commands::archive::run(&ws, &spec)?,
        Command::Index { subcommand } => commands::index::run(&ws, &subcommand.into())?,
        Command::Config { subcommand } => commands::config::run(&ws, &subcommand.into())?,
        Command::Status => commands::status::run(&ws)?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
