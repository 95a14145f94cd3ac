//! Binary entry point for idiomstore.
//!
//! Every command prints JSON on stdout; logs go to stderr.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use idiomstore::cli::{apply_toggles, import_idioms, parse_toggle, read_idioms};
use idiomstore::observability::{self, LoggingConfig};
use idiomstore::{
    AccessorFactory, AccessorStack, DataAccessor, Error, IdiomId, IdiomOrder, IdiomStoreConfig,
    ImplId, RequestContext,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// How long to wait for background jobs before exiting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// idiomstore - storage, search and ranking of programming idioms.
#[derive(Parser)]
#[command(name = "idiomstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "IDIOMSTORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Create or update idioms from a JSON file.
    Import {
        /// File holding one idiom or an array of idioms.
        file: PathBuf,
    },

    /// Show one idiom.
    Get {
        /// Idiom id, or implementation id with `--impl`.
        id: i64,

        /// Look the idiom up by implementation id.
        #[arg(long = "impl")]
        by_impl: bool,
    },

    /// List idioms.
    List {
        /// Only idioms implemented in this language.
        #[arg(short, long)]
        lang: Option<String>,

        /// Maximum number of results, 0 for all.
        #[arg(short = 'n', long, default_value = "0")]
        limit: usize,

        /// Sort order, e.g. `Id` or `-Rating`.
        #[arg(short, long)]
        order: Option<IdiomOrder>,
    },

    /// Full-text search.
    Search {
        /// Words that every result must contain.
        #[arg(required = true)]
        words: Vec<String>,

        /// Favorite language (repeatable).
        #[arg(short, long)]
        lang: Vec<String>,

        /// Also show idioms with no implementation in a favorite language.
        #[arg(long)]
        others: bool,

        /// Maximum number of results.
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Most recently edited idioms.
    Recent(RankedArgs),

    /// Best rated idioms.
    Popular(RankedArgs),

    /// Languages having implementations.
    Langs,

    /// A random idiom.
    Random,

    /// Delete an idiom.
    Delete {
        /// Idiom id.
        id: i64,
    },

    /// Delete one implementation of an idiom.
    DeleteImpl {
        /// Idiom id.
        idiom: i64,

        /// Implementation id.
        implementation: i64,
    },

    /// Show the snapshots of an idiom.
    History {
        /// Idiom id.
        id: i64,
    },

    /// Rebuild the full-text index from the primary store.
    Reindex,

    /// Show or set application toggles.
    Toggles {
        #[command(subcommand)]
        action: Option<ToggleAction>,
    },

    /// Drop every cache entry.
    FlushCache,
}

/// Arguments of the ranked lists.
#[derive(clap::Args)]
struct RankedArgs {
    /// Favorite language (repeatable).
    #[arg(short, long)]
    lang: Vec<String>,

    /// Also show idioms with no implementation in a favorite language.
    #[arg(long)]
    others: bool,

    /// Number of idioms.
    #[arg(short, default_value = "20")]
    n: usize,
}

impl RankedArgs {
    /// Without favorites every idiom is an "other" one.
    fn show_other(&self) -> bool {
        self.others || self.lang.is_empty()
    }
}

/// Toggle actions.
#[derive(Subcommand)]
enum ToggleAction {
    /// Set toggles.
    Set {
        /// Assignments such as `writable=true`.
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) =
        observability::init_logging(LoggingConfig::from_settings(&config.logging, cli.verbose))
    {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration from `path`, or from the default location.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<IdiomStoreConfig> {
    match path {
        Some(path) => IdiomStoreConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(IdiomStoreConfig::load_default()),
    }
}

/// Runs the selected command, then waits for its background jobs.
fn run_command(command: Commands, config: &IdiomStoreConfig) -> anyhow::Result<()> {
    let stack = AccessorFactory::from_config(config).context("opening idiom store")?;
    let ctx = RequestContext::new();
    tracing::debug!(request_id = ctx.request_id(), "Running command");

    let result = dispatch(command, &stack, &ctx);
    drain(&stack);
    result
}

fn dispatch(command: Commands, stack: &AccessorStack, ctx: &RequestContext) -> anyhow::Result<()> {
    let accessor = &stack.accessor;
    match command {
        Commands::Import { file } => {
            let idioms = read_idioms(&file)?;
            print_json(&import_idioms(accessor, ctx, idioms)?)
        },

        Commands::Get { id, by_impl } => {
            let (key, idiom) = if by_impl {
                accessor.get_idiom_by_impl_id(ctx, ImplId::new(id))?
            } else {
                accessor.get_idiom(ctx, IdiomId::new(id))?
            };
            print_json(&json!({ "key": key, "idiom": idiom }))
        },

        Commands::List { lang, limit, order } => match lang {
            Some(lang) => print_json(&accessor.search_idioms_by_langs(ctx, &[lang], limit)?),
            None => {
                let (_, idioms) = accessor.get_all_idioms(ctx, limit, order)?;
                print_json(&idioms)
            },
        },

        Commands::Search {
            words,
            lang,
            others,
            limit,
        } => {
            let found = if lang.is_empty() {
                accessor.search_idioms_by_words(ctx, &words, None, limit)
            } else {
                accessor.search_idioms_by_words_with_favorites(ctx, &words, &lang, others, limit)
            };
            match found {
                Ok(idioms) => print_json(&idioms),
                Err(Error::PartialResults { idioms, cause }) => {
                    eprintln!("Warning: showing favorite-language results only: {cause}");
                    print_json(&idioms)
                },
                Err(e) => Err(e.into()),
            }
        },

        Commands::Recent(args) => {
            let idioms = accessor.recent_idioms(ctx, &args.lang, args.show_other(), args.n)?;
            print_json(&idioms)
        },

        Commands::Popular(args) => {
            let idioms = accessor.popular_idioms(ctx, &args.lang, args.show_other(), args.n)?;
            print_json(&idioms)
        },

        Commands::Langs => print_json(&accessor.languages_having_impl(ctx)?),

        Commands::Random => {
            let (key, idiom) = accessor.random_idiom(ctx)?;
            print_json(&json!({ "key": key, "idiom": idiom }))
        },

        Commands::Delete { id } => {
            accessor.delete_idiom(ctx, IdiomId::new(id))?;
            print_json(&json!({ "deleted": id }))
        },

        Commands::DeleteImpl {
            idiom,
            implementation,
        } => {
            accessor.delete_impl(ctx, IdiomId::new(idiom), ImplId::new(implementation))?;
            print_json(&json!({ "idiom": idiom, "deleted_impl": implementation }))
        },

        Commands::History { id } => print_json(&accessor.idiom_history(ctx, IdiomId::new(id))?),

        Commands::Reindex => {
            let indexed = accessor.reindex_all(ctx)?;
            print_json(&json!({ "indexed": indexed }))
        },

        Commands::Toggles { action: None } => print_json(&accessor.get_app_config(ctx)?),

        Commands::Toggles {
            action: Some(ToggleAction::Set { assignments }),
        } => {
            let parsed = assignments
                .iter()
                .map(|a| parse_toggle(a))
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&apply_toggles(accessor, ctx, &parsed)?)
        },

        Commands::FlushCache => {
            accessor.delete_cache(ctx)?;
            print_json(&json!({ "flushed": true }))
        },
    }
}

/// Waits for background jobs and reports the ones that failed.
fn drain(stack: &AccessorStack) {
    if !stack.wait_idle(DRAIN_TIMEOUT) {
        eprintln!(
            "Warning: {} background job(s) still pending at exit",
            stack.runner.pending()
        );
    }
    for dead in stack.runner.dead_letters() {
        eprintln!(
            "Warning: job {} failed after {} attempt(s): {}",
            dead.job, dead.attempts, dead.error
        );
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
