//! Expanse CLI: inspect and maintain a store of persisted macro expansions.
//!
//! Provides `expanse list` to enumerate stored records, `expanse show` to dump
//! one record's mapping pairs, `expanse map` to translate a range through a
//! record, and `expanse gc` to delete unreadable or unreferenced records.

#![warn(missing_docs)]

mod gc;
mod inspect;
mod logging;
mod project;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Expanse: persisted macro expansions and their range maps.
#[derive(Parser, Debug)]
#[command(name = "expanse", version, about = "Macro expansion store inspector")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory, or path to an `expanse.toml` file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Store directory, overriding `store.dir` from the configuration.
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every stored expansion record.
    List {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Print the mapping pairs of one record.
    Show {
        /// Expansion file name.
        file: String,
    },
    /// Map a range through one record.
    Map(MapArgs),
    /// Delete unreadable records, and unreferenced ones when `--keep` is given.
    Gc {
        /// Fingerprints of expansions that are still live.
        #[arg(long, num_args = 1..)]
        keep: Vec<String>,
    },
}

/// Arguments for the `expanse map` subcommand.
#[derive(Parser, Debug)]
pub struct MapArgs {
    /// Expansion file name.
    pub file: String,

    /// Start offset of the range.
    pub start: u32,

    /// End offset of the range; omitted means a caret at `start`.
    pub end: Option<u32>,

    /// Map from invocation text to expansion text instead.
    #[arg(short, long)]
    pub reverse: bool,

    /// File holding the text the results fall in (the invocation, or the
    /// expansion with `--reverse`); adds `line:col` positions.
    #[arg(long, value_name = "FILE")]
    pub text: Option<String>,
}

/// Output format for listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional project directory or config file.
    pub config: Option<String>,
    /// Optional store directory override.
    pub store: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        store: cli.store,
    };

    let result = project::Project::open(&global).and_then(|project| {
        logging::init(&global, &project.config.log.filter);
        match cli.command {
            Command::List { format } => inspect::list(&project, format),
            Command::Show { ref file } => inspect::show(&project, file),
            Command::Map(ref args) => inspect::map(&project, args),
            Command::Gc { ref keep } => gc::run(&project, keep, &global),
        }
    });

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
