// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::pty::ExitStatus;

#[test]
fn resolve_exit_code_prefers_process_exit_code() {
    let status = ExitStatus { code: Some(0), signal: None };
    assert_eq!(resolve_exit_code(&status), 0);

    let status = ExitStatus { code: Some(7), signal: Some(9) };
    assert_eq!(resolve_exit_code(&status), 7);
}

#[test]
fn resolve_exit_code_falls_back_to_130_on_signal_only() {
    let status = ExitStatus { code: None, signal: Some(15) };
    assert_eq!(resolve_exit_code(&status), 130);
}

#[test]
fn resolve_exit_code_falls_back_to_1_when_unknown() {
    let status = ExitStatus { code: None, signal: None };
    assert_eq!(resolve_exit_code(&status), 1);
}

#[tokio::test]
async fn run_rejects_empty_command() {
    let config = Config {
        port: 0,
        localhost: true,
        local: false,
        tailscale: false,
        no_qr: true,
        cols: 80,
        rows: 24,
        scrollback_chars: 1024,
        log_format: "text".to_string(),
        log_level: "error".to_string(),
        command: vec![],
        subcommand: None,
    };

    let err = run(config).await.unwrap_err();
    assert!(err.to_string().contains("no command specified"));
}
