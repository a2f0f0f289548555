use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::bridge::{transport, Bridge};
use crate::config::Config;
use crate::plugin::PluginRegistry;
use crate::query::{QueryRunner, SqliteQueryRunner};
use crate::sandbox::Sandbox;
use crate::types::QueryOutput;

#[derive(Parser)]
#[command(name = "sandbox")]
#[command(about = "Sandbox - runs learner code for an embedded code editor", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides config)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Speak the host protocol on stdin/stdout
    Serve {
        /// Session uid the host addresses messages to (overrides config)
        #[arg(long)]
        session: Option<String>,
    },

    /// Run a SQL file and print the result table
    Query {
        /// File containing one SQL statement
        file: PathBuf,

        /// Dataset to query (path or file:// URL)
        #[arg(long)]
        data: Option<String>,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let session = match &cli.command {
        Commands::Serve { session } => session.clone(),
        Commands::Query { .. } => None,
    };
    let config = Config::builder()
        .config_path(cli.config)
        .session_id(session)
        .log_level(cli.log_level)
        .build()
        .context("Failed to load configuration")?;
    init_tracing(&config.logging.level);

    match cli.command {
        Commands::Serve { .. } => serve_stdio(&config, PluginRegistry::new()).await,
        Commands::Query { file, data } => {
            let query = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = SqliteQueryRunner::new()
                .run_query(&query, data.as_deref())
                .await
                .context("Query failed")?;
            print!("{}", QueryOutput::from(result).render_text());
            Ok(())
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Host one session on stdin/stdout with the given plugins.
pub async fn serve_stdio(config: &Config, registry: PluginRegistry) -> Result<()> {
    let Some(session_id) = config.session.id.clone() else {
        bail!("No session id: pass --session or set session.id");
    };

    let (outbox, inbox) = mpsc::unbounded_channel();
    let sandbox = Sandbox::builder(session_id, outbox)
        .registry(registry)
        .exec_config(config.exec_config())
        .build();

    transport::serve(
        Bridge::new(sandbox),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        inbox,
    )
    .await
}
