// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::logging;
use crate::server;

#[derive(Parser)]
#[command(name = "voxhub", version, about = "Local media-studio TTS service")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the bind address (e.g. 0.0.0.0:7860).
    #[arg(short, long, global = true)]
    pub address: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server (the default when no command is given).
    Serve,
    /// Print the effective configuration as TOML and exit.
    PrintConfig,
}

/// Load config, apply CLI overrides and dispatch the command.
pub async fn handle_command(cli: &Cli) {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        },
    };
    if let Some(address) = &cli.address {
        config.server.address.clone_from(address);
    }

    match cli.command.as_ref().unwrap_or(&Command::Serve) {
        Command::Serve => {
            let _log_guard = match logging::init_logging(&config.log) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Logging error: {e}");
                    std::process::exit(2);
                },
            };
            if let Err(e) = server::start_server(&config).await {
                tracing::error!(error = %e, "server exited with error");
                std::process::exit(1);
            }
        },
        Command::PrintConfig => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("Failed to render configuration: {e}");
                std::process::exit(2);
            },
        },
    }
}
