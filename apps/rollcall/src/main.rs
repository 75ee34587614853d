//! # Rollcall - Attendance Groups Server
//!
//! The main binary for Rollcall.
//!
//! This application provides:
//! - HTTP JSON API server (axum-based)
//! - CLI interface for store maintenance and the group filter run
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                apps/rollcall (THE BINARY)             │
//! │                                                       │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────┐  │
//! │  │   CLI       │    │   HTTP API  │    │  Config  │  │
//! │  │  (clap)     │    │   (axum)    │    │  (toml)  │  │
//! │  └──────┬──────┘    └──────┬──────┘    └────┬─────┘  │
//! │         └──────────────────┼────────────────┘        │
//! │                            ▼                          │
//! │                   ┌────────────────┐                  │
//! │                   │ rollcall-core  │                  │
//! │                   │ (redb store)   │                  │
//! │                   └────────────────┘                  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! rollcall server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! rollcall seed
//! rollcall run-filters
//! rollcall groups --json-mode
//! ```

use clap::Parser;
use rollcall::cli;
use rollcall::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // The log format is itself configurable, so configuration is resolved
    // before tracing exists. Failures are reported once tracing is up.
    let resolved = cli.resolve_config();
    let log_format = resolved
        .as_ref()
        .map(|config| config.log.format)
        .unwrap_or_default();
    init_tracing(log_format);

    let config: Config = match resolved {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rollcall=info,rollcall_core=info,tower_http=debug".into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

/// Print the Rollcall startup banner.
fn print_banner() {
    println!(
        r#"
  ____       _ _           _ _
 |  _ \ ___ | | | ___ __ _| | |
 | |_) / _ \| | |/ __/ _` | | |
 |  _ < (_) | | | (_| (_| | | |
 |_| \_\___/|_|_|\___\__,_|_|_|

  Attendance Groups Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
