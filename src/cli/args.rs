//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::storage::ConfigOverrides;

/// finsync - authenticate, sync, and inspect the local financial-data cache.
#[derive(Parser, Debug)]
#[command(name = "finsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Emit JSON on stdout (and JSON logs on stderr)
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// API base URL (overrides config and FINSYNC_BASE_URL)
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Token endpoint URL (overrides config and FINSYNC_TOKEN_URL)
    #[arg(long, value_name = "URL", global = true)]
    pub token_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Config file (overrides FINSYNC_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Configuration overrides carried by global flags.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            token_url: self.token_url.clone(),
            timeout_seconds: self.timeout,
            config_path: self.config.clone(),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with username and password
    Login(LoginArgs),

    /// Forget stored credentials and cached data
    Logout,

    /// Inspect the stored session
    #[command(subcommand)]
    Token(TokenCommand),

    /// Fetch a resource family and reconcile it into the cache
    Sync(SyncArgs),

    /// Inspect or clear the local cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for the `login` command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account username (email)
    #[arg(long, short)]
    pub username: String,

    /// Password; read from FINSYNC_PASSWORD or stdin when omitted
    #[arg(long, env = "FINSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Show whether a session is stored and when it expires
    Status,
}

/// Arguments for the `sync` command.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Resource family (providers, provider-accounts, accounts, transactions, messages) or `all`
    pub resource: String,

    /// Only sync records belonging to this parent id
    #[arg(long, value_name = "ID", conflicts_with = "id")]
    pub parent: Option<i64>,

    /// Refresh a single record instead of the whole listing
    #[arg(long, value_name = "ID")]
    pub id: Option<i64>,
}

/// Cache subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List cached records of one family
    List(CacheListArgs),

    /// Delete cached records (all families unless one is named)
    Clear {
        /// Resource family to clear
        resource: Option<String>,
    },
}

/// Arguments for `cache list`.
#[derive(Args, Debug)]
pub struct CacheListArgs {
    /// Resource family
    pub resource: String,

    /// Only records belonging to this parent id
    #[arg(long, value_name = "ID")]
    pub parent: Option<i64>,

    /// Maximum number of records
    #[arg(long)]
    pub limit: Option<usize>,

    /// Records to skip
    #[arg(long, default_value = "0")]
    pub offset: usize,
}
