// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, ForkResult, Pid};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

use super::nbio::{read_chunk, set_nonblocking, write_all, PtyFd};

/// Outcome of the wrapped process exiting.
#[derive(Debug, Clone, Copy)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Spawns and supervises a single agent process behind a pseudo-terminal.
///
/// `write()`/`resize()` are cheap, non-blocking calls; the read side runs as
/// a background task that forwards output on `output_tx` until the child
/// exits, at which point it sends the final [`ExitStatus`] on `exit_tx`.
pub struct PtySupervisor {
    master: Arc<AsyncFd<PtyFd>>,
    child_pid: Pid,
    cols: Arc<AtomicU16>,
    rows: Arc<AtomicU16>,
    exited: Arc<AtomicBool>,
    input_tx: mpsc::UnboundedSender<Bytes>,
}

impl PtySupervisor {
    /// Fork a child running `command` on a freshly allocated PTY.
    ///
    /// `TERM=xterm-256color` is injected into the child's environment on
    /// top of whatever the parent already has set, matching the rest of the
    /// user's shell environment.
    // forkpty leaves the child partially initialized until exec; confined here.
    #[allow(unsafe_code)]
    pub fn spawn(
        command: &[String],
        cols: u16,
        rows: u16,
        output_tx: mpsc::Sender<Bytes>,
    ) -> anyhow::Result<(Self, tokio::sync::oneshot::Receiver<ExitStatus>)> {
        anyhow::ensure!(!command.is_empty(), "command must have at least one argument");

        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: forkpty's child branch is in a partially-initialized state
        // until exec; we only set env vars and call execvp before exiting.
        let ForkptyResult { master, fork_result } =
            unsafe { forkpty(&winsize, None) }.context("forkpty failed")?;

        match fork_result {
            ForkResult::Child => {
                std::env::set_var("TERM", "xterm-256color");

                let c_args: Vec<CString> = command
                    .iter()
                    .map(|s| CString::new(s.as_bytes()))
                    .collect::<Result<_, _>>()
                    .context("invalid command argument")?;

                let _ = execvp(&c_args[0], &c_args);
                // execvp only returns on error; there is no sane recovery
                // inside the forked child.
                std::process::exit(127);
            }
            ForkResult::Parent { child } => {
                set_nonblocking(&master)?;
                let master = Arc::new(AsyncFd::new(PtyFd(master)).context("AsyncFd::new failed")?);
                let (input_tx, input_rx) = mpsc::unbounded_channel();
                let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();
                let exited = Arc::new(AtomicBool::new(false));

                let task_master = master.clone();
                let task_exited = exited.clone();
                tokio::spawn(async move {
                    let status = run_io(task_master, input_rx, output_tx, child).await;
                    task_exited.store(true, Ordering::Release);
                    let _ = exit_tx.send(status);
                });

                Ok((
                    Self {
                        master,
                        child_pid: child,
                        cols: Arc::new(AtomicU16::new(cols)),
                        rows: Arc::new(AtomicU16::new(rows)),
                        exited,
                        input_tx,
                    },
                    exit_rx,
                ))
            }
        }
    }

    /// Write raw bytes to the PTY input. Unbuffered: queued on an unbounded
    /// channel drained by the I/O task. A no-op once the child has exited.
    pub fn write(&self, data: Bytes) {
        if self.exited.load(Ordering::Acquire) {
            return;
        }
        let _ = self.input_tx.send(data);
    }

    /// Resize the PTY window. Non-fatal if the child has already exited.
    // TIOCSWINSZ is a well-defined ioctl for a live PTY master fd.
    #[allow(unsafe_code)]
    pub fn resize(&self, cols: u16, rows: u16) {
        if self.exited.load(Ordering::Acquire) {
            return;
        }
        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(rows, Ordering::Relaxed);

        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: `ws` is fully initialized and the fd outlives this call.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            tracing::debug!(error = %std::io::Error::last_os_error(), "TIOCSWINSZ failed");
        }
    }

    /// OS process id of the wrapped agent, stable for the lifetime of this
    /// supervisor.
    pub fn pid(&self) -> u32 {
        self.child_pid.as_raw() as u32
    }

    /// Idempotent kill: SIGHUP, then SIGKILL after a short grace period.
    pub fn kill(&self) {
        if self.exited.swap(true, Ordering::AcqRel) {
            return;
        }
        let pid = self.child_pid;
        tokio::spawn(async move {
            let _ = kill(pid, Signal::SIGHUP);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let _ = kill(pid, Signal::SIGKILL);
            let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
        });
    }
}

async fn run_io(
    master: Arc<AsyncFd<PtyFd>>,
    mut input_rx: mpsc::UnboundedReceiver<Bytes>,
    output_tx: mpsc::Sender<Bytes>,
    pid: Pid,
) -> ExitStatus {
    let mut buf = vec![0u8; 8192];
    let mut input_closed = false;

    loop {
        if input_closed {
            match read_chunk(&master, &mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if output_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break;
                    }
                }
                Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break,
                Err(_) => break,
            }
            continue;
        }

        tokio::select! {
            result = read_chunk(&master, &mut buf) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break,
                    Err(_) => break,
                }
            }
            input = input_rx.recv() => {
                match input {
                    Some(data) => {
                        if write_all(&master, &data).await.is_err() {
                            break;
                        }
                    }
                    None => input_closed = true,
                }
            }
        }
    }

    match tokio::task::spawn_blocking(move || wait_for_exit(pid)).await {
        Ok(status) => status,
        Err(_) => ExitStatus { code: None, signal: None },
    }
}

fn wait_for_exit(pid: Pid) -> ExitStatus {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return ExitStatus { code: Some(code), signal: None },
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                return ExitStatus { code: None, signal: Some(sig as i32) }
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => return ExitStatus { code: None, signal: None },
        }
    }
}
