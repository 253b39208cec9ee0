//! PathGuard CLI - path-scoped access policies for remote file agents
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`PATHGUARD_*`)
//! 3. Project config (`.pathguard/config.toml` in the project root)
//! 4. Global config (`~/.pathguard/config.toml`, or `--config`)
//! 5. Default values (lowest priority)
//!
//! # Stores
//!
//! With an admin URL the rules live on the admin server and are pulled on
//! startup. Without one they live in process memory; set a cache directory
//! to keep them between runs.
//!
//! # Exit Codes
//!
//! - `0`: success (or `check` allowed)
//! - `1`: error
//! - `2`: `check` denied

mod commands;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use pathguard_runtime::config::{ConfigError, ConfigLoader, GuardConfig};
use pathguard_runtime::Severity;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// PathGuard CLI - path-scoped access policies for remote file agents
#[derive(Parser, Debug)]
#[command(name = "pathguard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Global config file (defaults to ~/.pathguard/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Agent whose policy is used (also: PATHGUARD_AGENT_ID)
    #[arg(long, global = true)]
    agent_id: Option<String>,

    /// Admin server holding the policy registry (also: PATHGUARD_ADMIN_URL)
    #[arg(long, global = true, value_name = "URL")]
    admin_url: Option<String>,

    /// Agent file API used by browse and search (also: PATHGUARD_AGENT_URL)
    #[arg(long, global = true, value_name = "URL")]
    agent_url: Option<String>,

    /// Policy snapshot directory (also: PATHGUARD_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Bound on each remote policy call (also: PATHGUARD_SYNC_TIMEOUT_MS)
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Print audit entries at or above SEVERITY after the command
    #[arg(long, global = true, value_name = "SEVERITY", value_parser = parse_severity)]
    audit: Option<Severity>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide whether an operation is allowed on a path (exit 2 when denied)
    Check {
        path: String,
        /// read, write, download, execute, search, delete (others use the
        /// unknown-operation policy)
        operation: String,
    },

    /// Show effective permissions and the rule they come from
    Explain { path: String },

    /// Set the rule for a path
    #[command(group(ArgGroup::new("grant").required(true).args(["preset", "allow"])))]
    Apply {
        path: String,

        /// Start from a named permission set
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Comma-separated capabilities to grant (everything else is denied)
        #[arg(long, value_delimiter = ',')]
        allow: Vec<String>,
    },

    /// Remove the rule for a path so it inherits again
    Reset { path: String },

    /// List rules that block browsing
    Restricted,

    /// Pull the rule set from the admin server
    Pull,

    /// List a directory on the agent, annotated with policy
    Browse {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Search beneath a directory on the agent
    Search { path: String, query: String },

    /// Show metadata for one file or folder on the agent
    Info { path: String },

    /// Download a file, or a folder as a zip archive, from the agent
    Download {
        path: String,

        /// Zip a folder before transfer
        #[arg(long)]
        compress: bool,

        /// Destination file (defaults to the remote name in the current directory)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Delete a file or folder on the agent
    Delete { path: String },
}

/// Named permission sets for `apply --preset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// read, download and search
    Default,
    /// nothing
    Blocked,
    /// everything
    Full,
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    Severity::parse(s).ok_or_else(|| format!("unknown severity '{s}' (info, warning, error, security)"))
}

/// CLI flags applied on top of file and environment config.
struct CliConfigResolver {
    project_root: PathBuf,
    global_config: Option<PathBuf>,
    agent_id: Option<String>,
    admin_url: Option<String>,
    agent_url: Option<String>,
    cache_dir: Option<PathBuf>,
    timeout_ms: Option<u64>,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        let project_root = args.project.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to get current directory, using '.'");
                PathBuf::from(".")
            })
        });

        Self {
            project_root,
            global_config: args.config.clone(),
            agent_id: args.agent_id.clone(),
            admin_url: args.admin_url.clone(),
            agent_url: args.agent_url.clone(),
            cache_dir: args.cache_dir.clone(),
            timeout_ms: args.timeout_ms,
        }
    }

    fn resolve(&self) -> Result<GuardConfig, ConfigError> {
        let mut loader = ConfigLoader::new().with_project_root(&self.project_root);
        if let Some(ref path) = self.global_config {
            loader = loader.with_global_config(path);
        }

        let mut config = loader.load()?;

        // CLI args override (highest priority)
        if let Some(ref id) = self.agent_id {
            config.agent.id.clone_from(id);
        }
        if let Some(ref url) = self.admin_url {
            config.agent.admin_url = Some(url.clone());
        }
        if let Some(ref url) = self.agent_url {
            config.agent.url = Some(url.clone());
        }
        if let Some(ref dir) = self.cache_dir {
            config.sync.cache_dir = Some(dir.clone());
        }
        if let Some(ms) = self.timeout_ms {
            config.sync.timeout_ms = ms;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Filter: --debug > --verbose > RUST_LOG env > default "warn".
    // HTTP internals stay at WARN even in debug mode.
    let filter = if args.debug {
        EnvFilter::new("debug,hyper=warn,hyper_util=warn,h2=warn,reqwest=warn,rustls=warn,tokio=warn")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr so stdout carries only command output.
    let layer = fmt::layer()
        .with_target(args.debug)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .init();

    let resolver = CliConfigResolver::from_args(&args);
    let config = resolver
        .resolve()
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    info!(
        path = %resolver.project_root.display(),
        agent = %config.agent.id,
        remote = config.agent.admin_url.is_some(),
        "Resolved configuration"
    );

    let session = commands::Session::open(&config).await?;
    let output = commands::Output { json: args.json };
    let code = commands::run(&session, &args.command, output).await;

    if let Some(min) = args.audit {
        commands::print_audit(&session, min, output);
    }

    code
}
