// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use ratekeeper::config::Config;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(
    name = "ratekeeper",
    about = "Ratekeeper — periodic exchange-rate scraper with a read API",
    version,
    after_help = "Configuration is read from RATEKEEPER_* environment variables and PORT.\nRun 'ratekeeper' with no command to start the service."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// SQLite database path (overrides RATEKEEPER_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// HTTP port (overrides PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape on a fixed interval and serve the read API
    Serve,
    /// Run one scrape now and exit
    Once,
    /// Print the rate the API would serve right now
    Latest,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::from_env();
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "ratekeeper", &mut std::io::stdout());
        return Ok(());
    }

    ratekeeper::logging::init(cli.verbose, cli.json);

    let result = match cli.config() {
        Ok(config) => match cli.command {
            None | Some(Commands::Serve) => cli::serve::run(config).await,
            Some(Commands::Once) => cli::once_cmd::run(config, cli.json).await,
            Some(Commands::Latest) => cli::latest_cmd::run(config, cli.json).await,
            Some(Commands::Completions { .. }) => Ok(()),
        },
        Err(e) => Err(e),
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli.json {
            println!(
                "{}",
                serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                })
            );
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
