//! # shardgate CLI Module
//!
//! ## Available Commands
//!
//! - `serve` - Join the cluster and start the HTTP server
//! - `load` - Load records from a JSON file into the local shard
//! - `assignment` - Show which node owns each partition

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use shardgate_core::ShardgateError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// shardgate - partition-aware query router
///
/// Serves reads over a dataset partitioned across a cluster, answering from
/// the local shard or forwarding to the node that owns the key.
#[derive(Parser, Debug)]
#[command(name = "shardgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML node configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the local shard database
    #[arg(short = 'D', long, global = true, default_value = "shardgate.redb")]
    pub database: PathBuf,

    /// Shard storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where the local shard lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// redb file at `--database`
    Redb,
    /// Process memory, empty at start
    Memory,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join the cluster and serve the HTTP API
    Serve {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load a JSON array of records into the local shard
    Load {
        /// Resource the records belong to (e.g. accounts)
        #[arg(short, long)]
        resource: String,

        /// Path to the JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Store every record, not only those in partitions this node owns
        #[arg(long)]
        all: bool,

        /// Compact the shard file afterwards
        #[arg(long)]
        compact: bool,
    },

    /// Show the partition -> owner table
    Assignment,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), ShardgateError> {
    let config = load_config(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            cmd_serve(config, &cli.database, cli.backend, host, port).await
        }
        Some(Commands::Load {
            resource,
            file,
            all,
            compact,
        }) => cmd_load(
            &config,
            &cli.database,
            cli.backend,
            json_mode,
            &LoadOptions {
                resource,
                file,
                all,
                compact,
            },
        ),
        Some(Commands::Assignment) | None => cmd_assignment(&config, json_mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_overrides() {
        let cli = Cli::try_parse_from(["shardgate", "-B", "memory", "serve", "-p", "9001"])
            .expect("parse");
        assert_eq!(cli.backend, Backend::Memory);
        assert!(matches!(
            cli.command,
            Some(Commands::Serve {
                host: None,
                port: Some(9001)
            })
        ));
    }

    #[test]
    fn parses_load() {
        let cli = Cli::try_parse_from([
            "shardgate",
            "--config",
            "node.toml",
            "load",
            "-r",
            "accounts",
            "-f",
            "accounts.json",
            "--all",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("node.toml")));
        assert!(matches!(cli.command, Some(Commands::Load { all: true, compact: false, .. })));
    }

    #[test]
    fn no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["shardgate", "--json-mode"]).expect("parse");
        assert!(cli.command.is_none());
        assert!(cli.json_mode);
        assert_eq!(cli.database, PathBuf::from("shardgate.redb"));
    }
}
