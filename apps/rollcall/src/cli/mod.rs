//! # Rollcall CLI Module
//!
//! This module implements the CLI interface for Rollcall.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show record counts (default)
//! - `init` - Initialize new database
//! - `seed` - Load a small demo data set
//! - `import` - Import students and rolls from a JSON file
//! - `groups` - List groups
//! - `run-filters` - Recompute every group's membership

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use rollcall_core::RollcallError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Rollcall - attendance groups server
///
/// Keeps saved attendance filters ("groups") and recomputes which students
/// match them from recent rolls.
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (default: ./rollcall.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the redb database (overrides config and environment)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show record counts
    Status,

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Load demo students, three weeks of rolls and two groups
    Seed,

    /// Import students and rolls from a JSON file
    Import {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List groups
    Groups,

    /// Recompute the membership of every group
    RunFilters,
}

impl Cli {
    /// Load the layered configuration and apply this invocation's flags on top.
    pub fn resolve_config(&self) -> Result<Config, RollcallError> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.database.clone_from(database);
        }
        if let Some(Commands::Server { host, port }) = &self.command {
            if let Some(host) = host {
                config.server.host.clone_from(host);
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
        Ok(config)
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and resolved configuration.
pub async fn execute(cli: Cli, config: Config) -> Result<(), RollcallError> {
    let json_mode = cli.json_mode;
    let db_path = &config.database;

    match cli.command {
        Some(Commands::Server { .. }) => cmd_server(&config).await,
        Some(Commands::Init { force }) => cmd_init(db_path, force),
        Some(Commands::Seed) => cmd_seed(db_path, json_mode),
        Some(Commands::Import { file }) => cmd_import(db_path, json_mode, &file),
        Some(Commands::Groups) => cmd_groups(db_path, json_mode),
        Some(Commands::RunFilters) => cmd_run_filters(db_path, json_mode),
        Some(Commands::Status) | None => cmd_status(db_path, json_mode),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_parses() {
        let cli = Cli::try_parse_from(["rollcall", "--quiet"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.quiet);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = ["rollcall", "run-filters", "-D", "x.redb", "--json-mode"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Some(Commands::RunFilters)));
        assert_eq!(cli.database, Some(PathBuf::from("x.redb")));
        assert!(cli.json_mode);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            "database = \"from-file.redb\"\n[server]\nhost = \"0.0.0.0\"\nport = 9000\n",
        )
        .unwrap();
        let arg = path.to_string_lossy().to_string();

        let args = ["rollcall", "--config", &arg, "server", "--port", "9999"];
        let cli = Cli::try_parse_from(args).unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.database, PathBuf::from("from-file.redb"));
    }
}
