//! datalyst CLI: the main entry point.
//!
//! Commands:
//! - `ask`     : Answer one question about the files in the data directory
//! - `evaluate`: Fetch a benchmark question, answer it and submit the answer
//! - `serve`   : Start the HTTP gateway
//! - `tools`   : List the tools offered to the model
//! - `doctor`  : Diagnose configuration and backend health
//! - `init`    : Write a default config and create the data directory

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "datalyst",
    about = "datalyst — a tool-using data-analyst agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.datalyst/config.toml
    #[arg(long, global = true, env = "DATALYST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about the files in the data directory
    Ask {
        /// The question to answer
        question: String,

        /// Copy this file into the data directory before asking
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Answer one random benchmark question and submit the result
    Evaluate,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the available tools and their arguments
    Tools,

    /// Diagnose configuration and backend health
    Doctor,

    /// Initialize configuration and data directory
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ask { question, file } => {
            let config = commands::load_config(config_path)?;
            commands::ask::run(config, &question, file.as_deref(), cli.verbose).await?
        }
        Commands::Evaluate => {
            let config = commands::load_config(config_path)?;
            commands::evaluate::run(config).await?
        }
        Commands::Serve { port } => {
            let config = commands::load_config(config_path)?;
            commands::serve::run(config, port).await?
        }
        Commands::Tools => {
            let config = commands::load_config(config_path)?;
            commands::tools::run(&config)
        }
        Commands::Doctor => commands::doctor::run(config_path).await?,
        Commands::Init => commands::init::run()?,
    }

    Ok(())
}
