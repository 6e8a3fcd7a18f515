//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cachelock - shared compiler artifact cache maintenance
///
/// Inspects and maintains an on-disk artifact cache using the same
/// locking protocol as the compilers that populate it.
#[derive(Parser, Debug)]
#[command(name = "cachelock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHELOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root that relative entry paths resolve against
    #[arg(long, global = true, env = "CACHELOCK_ROOT")]
    pub root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a cache directory and any missing parents
    Init(TreeArgs),

    /// Delete a cache directory tree; no entry under it may be in use
    Evict(TreeArgs),

    /// Print a complete entry to stdout
    Cat(EntryArgs),

    /// Write an entry from a file or stdin and mark it done
    Put(PutArgs),

    /// Create an empty entry if none exists
    Touch(EntryArgs),

    /// Remove an entry with its done marker and lock
    Rm(EntryArgs),

    /// Show entry state and who holds its lock
    Status(StatusArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Arguments for directory commands
#[derive(Parser, Debug)]
pub struct TreeArgs {
    /// Directory (relative paths resolve against the cache root)
    pub path: PathBuf,
}

/// Arguments for single-entry commands
#[derive(Parser, Debug)]
pub struct EntryArgs {
    /// Entry path (relative paths resolve against the cache root)
    pub path: PathBuf,

    /// Fail instead of waiting when the entry is locked
    #[arg(long)]
    pub no_wait: bool,
}

/// Arguments for the put command
#[derive(Parser, Debug)]
pub struct PutArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Read content from this file instead of stdin
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Append instead of replacing
    #[arg(long)]
    pub append: bool,

    /// Leave the entry untouched if its content is identical
    #[arg(long, conflicts_with = "append")]
    pub skip_identical: bool,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Entry path (relative paths resolve against the cache root)
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for status
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable
    Text,
    /// JSON output
    Json,
}
