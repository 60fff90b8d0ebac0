//! # podscope - Main Entry Point
//!
//! Resolve the target container, bring up the tracer, then hand the event
//! queue to the session loop. Teardown happens in a fixed order once the
//! session returns.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;

use podscope::capture::Tracer;
use podscope::cli::Args;
use podscope::preflight::{check_cgroup_path, run_preflight_checks};
use podscope::process_names::ProcessNameResolver;
use podscope::session::{self, SessionConfig};
use podscope::workload::{CgroupTreeResolver, WorkloadResolver};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("invalid container id") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Cgroup scope for the run: explicit `--cgroup` or the resolved container's.
fn resolve_scope(args: &Args) -> Result<String> {
    if let Some(ref path) = args.cgroup {
        check_cgroup_path(path)?;
        return Ok(path.to_string_lossy().into_owned());
    }

    let info = CgroupTreeResolver::new()
        .resolve(&args.target, &args.namespace)
        .context("failed to resolve workload")?;

    if !args.quiet {
        eprintln!("Resolved {}/{}:", info.namespace, info.name);
        eprintln!("  Container ID: {}", info.container_id);
        eprintln!("  Cgroup path: {}", info.cgroup_path.display());
        eprintln!();
    }
    Ok(info.cgroup_path.to_string_lossy().into_owned())
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();

    run_preflight_checks()?;
    let scope = resolve_scope(&args)?;

    let mut tracer = Tracer::new(args.object.as_deref()).context("failed to create tracer")?;
    tracer.attach_cgroup_scope(&scope);

    let names = Arc::new(ProcessNameResolver::new());
    let (events, _) = tracer.start(Arc::clone(&names), 0).context("failed to start tracer")?;

    let shutdown = session::spawn_signal_task();
    let config = SessionConfig { mode: args.mode(), format: args.format.into(), quiet: args.quiet };
    let outcome = session::run(events, shutdown, names, config, &mut std::io::stdout().lock()).await;

    // The session consumed the receiver, so a capture thread blocked on a
    // full queue is released before the reader is closed.
    if let Some(stats) = tracer.stop() {
        info!(
            "capture: {} decoded, {} malformed, {} filtered, {} lost, {} read errors, {} delivered",
            stats.decoded, stats.malformed, stats.filtered, stats.lost, stats.read_errors, stats.delivered
        );
    }

    outcome.map(drop)
}
