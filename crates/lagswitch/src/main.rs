//! LagSwitch entry point.
//!
//! Dispatches on the first command-line argument and maps each mode's result
//! to an exit code.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ (no args)  listen  ── sudo -v ── HelperClient ─► lagswitch --helper (root)
//!  │                                   └ fallback ──► lagswitch --worker (root, per press)
//!  ├─ --setup    setup   ── InstallFirewallUseCase
//!  ├─ --worker   worker  ── ToggleLagUseCase::toggle
//!  └─ --helper   helper  ── helper::serve(stdin, stdout)
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use lagswitch::cli::{parse_mode, Mode};
use lagswitch::commands::{self, CommandError};
use lagswitch::config::LagSwitchConfig;
use lagswitch::infrastructure::firewall::{PacketFilter, PfCtl};
use lagswitch::infrastructure::input_capture;
use lagswitch::infrastructure::privilege::Privilege;

#[tokio::main]
async fn main() -> ExitCode {
    let mode = parse_mode(std::env::args_os().skip(1));
    init_logging(&mode);

    if let Mode::Unknown(arg) = &mode {
        println!("Unknown argument: {arg}");
        return ExitCode::SUCCESS;
    }

    let privilege = Privilege::current();
    match mode {
        Mode::Setup => run_setup(privilege),
        Mode::Worker => run_worker(privilege),
        Mode::Helper => run_helper(privilege).await,
        Mode::Listen => run_listener(privilege).await,
        Mode::Unknown(_) => ExitCode::SUCCESS,
    }
}

/// Logs go to stderr: the helper's stdout carries the pipe protocol.
fn init_logging(mode: &Mode) {
    let default = match mode {
        Mode::Worker | Mode::Helper => "lagswitch=warn,lagswitch_core=warn",
        _ => "lagswitch=info,lagswitch_core=info",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn config() -> anyhow::Result<LagSwitchConfig> {
    LagSwitchConfig::resolve().context("resolving configuration")
}

fn pfctl() -> Arc<dyn PacketFilter> {
    Arc::new(PfCtl::default())
}

fn run_setup(privilege: Privilege) -> ExitCode {
    if let Err(e) = privilege.require_elevated(Mode::Setup.label()) {
        println!("[ERROR] {e}. Command: sudo lagswitch --setup");
        return ExitCode::FAILURE;
    }
    let result = config().and_then(|cfg| Ok(commands::setup(privilege, &cfg, pfctl())?));
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            println!("\n[FATAL ERROR] An error occurred during setup: {e:#}");
            println!(
                "Please ensure you are running with sudo and have permissions to modify system files."
            );
            ExitCode::FAILURE
        }
    }
}

fn run_worker(privilege: Privilege) -> ExitCode {
    let result = config().and_then(|cfg| Ok(commands::worker(privilege, &cfg, pfctl())?));
    match result {
        Ok(state) => {
            tracing::debug!(%state, "worker finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!("worker failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_helper(privilege: Privilege) -> ExitCode {
    let cfg = match config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::debug!("helper failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    match commands::helper(privilege, &cfg, pfctl()).await {
        Ok(summary) => {
            tracing::debug!(?summary, "helper finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!("helper failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_listener(privilege: Privilege) -> ExitCode {
    let cfg = match config() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("[FATAL ERROR] {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    match commands::listen(privilege, &cfg, input_capture::platform_source, shutdown).await {
        Ok(summary) => {
            if summary.lifted_on_exit {
                println!("[CLEANUP] Lag switch turned off.");
            }
            tracing::info!(presses = summary.presses, reason = ?summary.reason, "listener stopped");
            ExitCode::SUCCESS
        }
        Err(CommandError::Privilege(e)) => {
            println!("[ERROR] {e}. Just run: lagswitch");
            ExitCode::FAILURE
        }
        Err(CommandError::Elevation(e)) => {
            println!("[FATAL ERROR] Failed to authenticate with sudo ({e}). Please try again.");
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("[FATAL ERROR] {e}");
            ExitCode::FAILURE
        }
    }
}
