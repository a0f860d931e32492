//! C5.3: the attach/session subsystem — raw-mode TTY, signal forwarding,
//! and resize propagation to a remote exec session.
//!
//! Terminal state is a process-wide resource; this module treats it as a
//! scoped acquisition with guaranteed release on every exit path, including
//! error and cancellation. Multiple concurrent attach sessions in one
//! process are disallowed by construction (the guard below is the only way
//! to enter raw mode).

use std::io::IsTerminal;

use crossterm::terminal;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::engine::{ContainerState, Engine, ExecOptions};
use crate::errors::{ReactorError, Result};

/// `SIGTSTP` has no `tokio::signal::unix::SignalKind` constructor; build it
/// from the raw signal number, which `libc` exposes on every Unix target.
fn sigtstp_kind() -> SignalKind {
    SignalKind::from_raw(libc::SIGTSTP)
}

/// RAII guard that enables raw mode on construction and restores the prior
/// terminal state on drop, however the session ends.
struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    fn enable(tty: bool) -> Result<Self> {
        if tty {
            terminal::enable_raw_mode().map_err(ReactorError::Io)?;
        }
        Ok(RawModeGuard { active: tty })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = terminal::disable_raw_mode();
        }
    }
}

fn signal_name(kind: SignalKind) -> &'static str {
    match kind {
        k if k == SignalKind::interrupt() => "INT",
        k if k == SignalKind::terminate() => "TERM",
        k if k == SignalKind::quit() => "QUIT",
        k if k == sigtstp_kind() => "TSTP",
        _ => "UNKNOWN",
    }
}

/// Run an interactive attach session against `container_id`, executing
/// `cmd` (a shell for plain attach, or a caller-supplied command for
/// `exec`). Blocks until the session ends; restores terminal state before
/// returning on every path.
#[instrument(skip(engine, cmd, cancel))]
pub async fn attach<E>(
    engine: E,
    container_id: &str,
    cmd: Vec<String>,
    cancel: CancellationToken,
) -> Result<i64>
where
    E: Engine + Clone + 'static,
{
    let info = engine.inspect(container_id, &cancel).await?;
    if info.state != ContainerState::Running {
        return Err(ReactorError::NotRunning(container_id.to_string()));
    }

    let stdin_is_tty = std::io::stdin().is_terminal();

    let exec_id = engine
        .exec_create(
            container_id,
            &ExecOptions {
                cmd,
                attach_stdin: true,
                attach_stdout: true,
                attach_stderr: true,
                tty: stdin_is_tty,
            },
            &cancel,
        )
        .await?;

    let stream = engine
        .exec_start_attached(&exec_id, stdin_is_tty, &cancel)
        .await?;
    let mut input = stream.input;
    let mut output = stream.output;

    // Raw mode must be entered before any stdin byte is forwarded; the
    // guard's Drop restores it on every exit path from this point on.
    let _raw_guard = RawModeGuard::enable(stdin_is_tty)?;

    if stdin_is_tty {
        if let Ok((cols, rows)) = terminal::size() {
            engine.exec_resize(&exec_id, rows, cols, &cancel).await.ok();
        }
    }

    let (done_tx, mut done_rx) = tokio::sync::mpsc::channel::<Result<()>>(4);

    // (b) host stdin -> engine stream, ends on stdin EOF.
    let tx_stdin = done_tx.clone();
    let stdin_task = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 4096];
        let result = loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    if let Err(e) = input.write_all(&buf[..n]).await {
                        break Err(ReactorError::Io(e));
                    }
                }
                Err(e) => break Err(ReactorError::Io(e)),
            }
        };
        let _ = tx_stdin.send(result).await;
    });

    // (c) engine stream -> host stdout, ends on stream close.
    let tx_output = done_tx.clone();
    let output_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        use futures::StreamExt;
        let result = loop {
            match output.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = stdout.write_all(chunk.as_ref()).await {
                        break Err(ReactorError::Io(e));
                    }
                    let _ = stdout.flush().await;
                }
                Some(Err(e)) => break Err(ReactorError::Io(e)),
                None => break Ok(()),
            }
        };
        let _ = tx_output.send(result).await;
    });

    // (a) exec_start already drove the process when we attached above.
    // (d) signal/resize handler.
    let tx_signals = done_tx.clone();
    let signal_engine = engine.clone();
    let signal_exec_id = exec_id.clone();
    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(signal_forward_loop(
        signal_engine,
        signal_exec_id,
        stdin_is_tty,
        tx_signals,
        signal_cancel,
    ));

    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReactorError::Cancelled),
        r = done_rx.recv() => r.unwrap_or(Ok(())),
    };

    stdin_task.abort();
    output_task.abort();
    signal_task.abort();

    first?;

    let (_, exit_code) = engine.exec_inspect(&exec_id, &cancel).await?;
    Ok(exit_code.unwrap_or(0))
}

/// Forwards SIGINT/SIGTERM/SIGQUIT/SIGTSTP to the exec session via
/// `engine.kill`; on resize (checked opportunistically alongside signals,
/// since tokio has no native SIGWINCH stream on all platforms) re-queries
/// terminal size and calls `exec_resize`. Runs until the caller aborts it
/// or `cancel` fires.
async fn signal_forward_loop<E: Engine>(
    engine: E,
    exec_id: String,
    tty: bool,
    _done: tokio::sync::mpsc::Sender<Result<()>>,
    cancel: CancellationToken,
) {
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut sigquit = match signal(SignalKind::quit()) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut sigtstp = match signal(sigtstp_kind()) {
        Ok(s) => s,
        Err(_) => return,
    };
    #[cfg(target_os = "linux")]
    let mut sigwinch = signal(SignalKind::window_change()).ok();
    #[cfg(not(target_os = "linux"))]
    let mut sigwinch: Option<tokio::signal::unix::Signal> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sigint.recv() => {
                forward(&engine, &exec_id, SignalKind::interrupt(), &cancel).await;
            }
            _ = sigterm.recv() => {
                forward(&engine, &exec_id, SignalKind::terminate(), &cancel).await;
            }
            _ = sigquit.recv() => {
                forward(&engine, &exec_id, SignalKind::quit(), &cancel).await;
            }
            _ = sigtstp.recv() => {
                forward(&engine, &exec_id, sigtstp_kind(), &cancel).await;
            }
            _ = async {
                match &mut sigwinch {
                    Some(s) => { s.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            }, if tty => {
                if let Ok((cols, rows)) = terminal::size() {
                    let _ = engine.exec_resize(&exec_id, rows, cols, &cancel).await;
                }
            }
        }
    }
}

async fn forward<E: Engine>(engine: &E, exec_id: &str, kind: SignalKind, cancel: &CancellationToken) {
    let name = signal_name(kind);
    if let Err(e) = engine.kill(exec_id, name, cancel).await {
        warn!(signal = name, error = %e, "failed to forward signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_name_maps_known_kinds() {
        assert_eq!(signal_name(SignalKind::interrupt()), "INT");
        assert_eq!(signal_name(SignalKind::terminate()), "TERM");
        assert_eq!(signal_name(SignalKind::quit()), "QUIT");
        assert_eq!(signal_name(sigtstp_kind()), "TSTP");
    }
}
