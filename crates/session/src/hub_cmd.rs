// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `itwillsync hub {info,status,stop}` — out-of-band hub queries issued
//! directly from the CLI, reading the hub's state file and, for `status`,
//! calling its internal API.

use serde::Deserialize;

use crate::paths;

#[derive(Debug, Deserialize)]
struct HubStateFile {
    #[serde(rename = "masterToken")]
    master_token: String,
    #[serde(rename = "externalPort")]
    external_port: u16,
    #[serde(rename = "internalPort")]
    internal_port: u16,
    pid: u32,
    #[serde(rename = "startedAt")]
    started_at: u64,
}

fn read_state_file() -> anyhow::Result<HubStateFile> {
    let raw = std::fs::read_to_string(paths::hub_json_path())
        .map_err(|_| anyhow::anyhow!("no hub is currently running"))?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn info() -> i32 {
    match read_state_file() {
        Ok(state) => {
            println!("pid: {}", state.pid);
            println!("external port: {}", state.external_port);
            println!("internal port: {}", state.internal_port);
            println!("started at: {}", state.started_at);
            println!("master token: {}", state.master_token);
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

pub async fn status() -> i32 {
    let state = match read_state_file() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let url = format!("http://127.0.0.1:{}/api/health", state.internal_port);
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(2))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() => {
            match resp.text().await {
                Ok(body) => println!("{body}"),
                Err(_) => println!("hub is running (pid {})", state.pid),
            }
            0
        }
        _ => {
            eprintln!("hub is not responding");
            1
        }
    }
}

pub async fn stop() -> i32 {
    let state = match read_state_file() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let url = format!("http://127.0.0.1:{}/api/shutdown", state.internal_port);
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    match client.post(url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("hub stopped");
            0
        }
        _ => {
            eprintln!("could not reach hub; it may already be stopped");
            1
        }
    }
}

pub fn setup() -> i32 {
    let config = paths::read_network_config();
    println!("networking mode: {}", config.networking_mode);
    println!(
        "(the interactive setup wizard is a separate front-end component; \
         edit {} directly to change this)",
        paths::config_json_path().display()
    );
    0
}
