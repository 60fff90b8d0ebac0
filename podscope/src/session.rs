//! Control loop: consume events, render reports, react to termination
//!
//! One cooperative loop selects over the event queue, a timer (periodic tick
//! in live mode, a fixed deadline in batch mode) and the termination signal.
//! Rendering happens inline and pauses consumption while it runs.

use anyhow::{Context, Result};
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use log::{debug, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, Instant};

use crate::analysis::{Diagnostician, Format};
use crate::domain::Event;
use crate::process_names::ProcessNameResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Re-render the run-to-date report every `interval` until interrupted
    Live { interval: Duration },
    /// Render once after `duration` (or on interrupt)
    Batch { duration: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub mode: Mode,
    pub format: Format,
    pub quiet: bool,
}

/// Forward the first SIGINT or SIGTERM as a one-shot notification.
///
/// If no handler can be installed the receiver never fires.
#[must_use]
pub fn spawn_signal_task() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                warn!("failed to install signal handlers: {e}");
                // Keep tx alive so the session does not read this as a signal
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

async fn wait_for_termination() -> std::io::Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

/// Run until the mode's end condition or `shutdown` fires, writing reports
/// to `out`. Returns the diagnostician holding the full run history.
///
/// # Errors
/// Fails only if writing to `out` or serializing a report fails.
pub async fn run<W: Write>(
    mut events: mpsc::Receiver<Event>,
    mut shutdown: oneshot::Receiver<()>,
    names: Arc<ProcessNameResolver>,
    config: SessionConfig,
    out: &mut W,
) -> Result<Diagnostician> {
    let mut diag = Diagnostician::new(names);

    match config.mode {
        Mode::Live { interval } => {
            if !config.quiet {
                writeln!(out, "Tracing started. Press Ctrl+C to stop.")?;
                writeln!(
                    out,
                    "Real-time diagnostic updates every {}...\n",
                    humantime::format_duration(interval)
                )?;
            }

            let mut ticker = interval_at(Instant::now() + interval, interval);
            let mut printed = false;
            loop {
                tokio::select! {
                    Some(event) = events.recv() => accept(&mut diag, event),
                    _ = ticker.tick() => {
                        diag.finish();
                        if printed {
                            clear_screen(out)?;
                        }
                        writeln!(
                            out,
                            "=== Real-time Diagnostic Report (updating every {}) ===",
                            humantime::format_duration(interval)
                        )?;
                        writeln!(out, "Press Ctrl+C to stop and see final report.\n")?;
                        write_report(&diag, config.format, out)?;
                        printed = true;
                    }
                    _ = &mut shutdown => {
                        diag.finish();
                        if printed {
                            clear_screen(out)?;
                        }
                        writeln!(out, "=== Final Diagnostic Report ===\n")?;
                        write_report(&diag, config.format, out)?;
                        break;
                    }
                }
            }
        }
        Mode::Batch { duration } => {
            if !config.quiet {
                writeln!(out, "Running diagnose mode for {}...\n", humantime::format_duration(duration))?;
            }

            let deadline = sleep(duration);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    Some(event) = events.recv() => accept(&mut diag, event),
                    () = &mut deadline => break,
                    _ = &mut shutdown => break,
                }
            }
            diag.finish();
            write_report(&diag, config.format, out)?;
        }
    }

    out.flush()?;
    Ok(diag)
}

fn accept(diag: &mut Diagnostician, event: Event) {
    if let Some(message) = event.message() {
        debug!("{} {message}", event.pid);
    }
    diag.add_event(event);
}

fn write_report<W: Write>(diag: &Diagnostician, format: Format, out: &mut W) -> Result<()> {
    let rendered = diag.report().render(format).context("failed to serialize report")?;
    writeln!(out, "{rendered}")?;
    Ok(())
}

fn clear_screen<W: Write>(out: &mut W) -> Result<()> {
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    Ok(())
}
