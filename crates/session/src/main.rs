// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tracing::error;

use itwillsync::config::{Commands, Config, HubAction};

#[tokio::main]
async fn main() {
    let config: Config = clap::Parser::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    match config.subcommand.clone() {
        Some(Commands::Setup) => {
            std::process::exit(itwillsync::hub_cmd::setup());
        }
        Some(Commands::Hub { action: HubAction::Info }) => {
            std::process::exit(itwillsync::hub_cmd::info());
        }
        Some(Commands::Hub { action: HubAction::Status }) => {
            std::process::exit(itwillsync::hub_cmd::status().await);
        }
        Some(Commands::Hub { action: HubAction::Stop }) => {
            std::process::exit(itwillsync::hub_cmd::stop().await);
        }
        None => match itwillsync::run::run(config).await {
            Ok(code) => std::process::exit(code),
            Err(e) => {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        },
    }
}
