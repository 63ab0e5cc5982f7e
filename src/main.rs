//! # citegate CLI
//!
//! Permission-filtered document search with citation-ready context.
//!
//! ## Usage
//!
//! ```bash
//! citegate --config ./config/citegate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `citegate parse "<input>"` | Show how an input splits into search terms and instructions |
//! | `citegate search "<input>" --email <addr>` | Run the full pipeline for a user |
//! | `citegate resolve --email <addr>` | Show the collection filter a user searches under |
//! | `citegate health` | Probe the search backend |
//! | `citegate serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! citegate parse "strategy frameworks | Present as a table"
//! citegate search "quarterly budget" --email alice@corp.example
//! citegate search "quarterly budget" --email alice@corp.example --json
//! citegate serve --config /etc/citegate/citegate.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use citegate::{config, logging, pipeline, query, server};

/// citegate: permission-filtered document search that produces
/// citation-ready context for a downstream language model.
///
/// All commands except `parse` read a TOML configuration file. See
/// `config/citegate.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "citegate",
    about = "Permission-filtered document search with citation-ready context",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/citegate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split an input into search terms and presentation instructions.
    ///
    /// Prints the result as JSON. Needs no configuration.
    Parse {
        /// Raw user input.
        input: String,
    },

    /// Run a permission-filtered search on behalf of a user.
    ///
    /// Prints the assembled context. On denial or backend failure the
    /// user-facing message goes to stderr and the exit code is non-zero.
    Search {
        /// Raw user input, optionally with presentation instructions.
        input: String,

        /// Email address of the user the search runs for.
        #[arg(long)]
        email: String,

        /// Print `{text, sources}` as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Resolve a user to the collection filter their searches would use.
    Resolve {
        #[arg(long)]
        email: String,
    },

    /// Check that the search backend answers its health endpoint.
    Health,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Parse { input } = &cli.command {
        println!("{}", serde_json::to_string_pretty(&query::parse(input))?);
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init_tracing(&cfg.logging);

    match cli.command {
        Commands::Search { input, email, json } => {
            pipeline::run_search(&cfg, &input, &email, json).await?;
        }
        Commands::Resolve { email } => {
            pipeline::run_resolve(&cfg, &email).await?;
        }
        Commands::Health => {
            pipeline::run_health(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Parse { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
