// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use itwillsync_hub::config::HubConfig;

#[tokio::main]
async fn main() {
    let config = HubConfig::parse();

    if let Err(e) = itwillsync_hub::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
