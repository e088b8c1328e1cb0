//! One entry point per command-line mode.
//!
//! Each function checks the privilege precondition before doing anything
//! else, so a mode entered with the wrong privilege touches no file and
//! starts no process.  User-facing progress lines are printed here; logs go
//! through `tracing` to stderr.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lagswitch_core::LagState;
use thiserror::Error;

use crate::application::install_firewall::{
    InstallError, InstallFirewallUseCase, InstallReport, InstallStep,
};
use crate::application::listen_hotkey::{FailoverToggler, HotkeyListener, StopReason, Toggler};
use crate::application::toggle_lag::{ToggleError, ToggleLagUseCase};
use crate::cli::Mode;
use crate::config::{ConfigError, LagSwitchConfig, AUTHOR, KEY_EVENT_BUFFER, WORKER_TIMEOUT_SECS};
use crate::infrastructure::elevation::{self, ElevationError};
use crate::infrastructure::firewall::PacketFilter;
use crate::infrastructure::helper::{
    serve, HelperClient, HelperError, HelperTimeouts, ServeSummary, WorkerSpawner,
};
use crate::infrastructure::input_capture::{self, CaptureError, HotkeySource};
use crate::infrastructure::privilege::{self, Privilege, PrivilegeError};
use crate::infrastructure::storage::StateStore;

/// Everything a mode can fail with.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Toggle(#[from] ToggleError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Helper(#[from] HelperError),

    #[error(transparent)]
    Elevation(#[from] ElevationError),

    #[error("could not locate this executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("failed to start the key event bridge: {0}")]
    Bridge(#[source] std::io::Error),
}

// ── Setup ─────────────────────────────────────────────────────────────────────

/// Runs the one-time installer.  Requires root.
pub fn setup(
    privilege: Privilege,
    config: &LagSwitchConfig,
    filter: Arc<dyn PacketFilter>,
) -> Result<InstallReport, CommandError> {
    privilege.require_elevated(Mode::Setup.label())?;
    println!("[INFO] Running one-time setup by {AUTHOR}...");

    let report = InstallFirewallUseCase::new(config, filter)
        .run_with_progress(|step| println!("{}", install_progress_line(step, config)))?;
    println!("\n[COMPLETE] Setup is finished. You can now run the listener.");
    Ok(report)
}

fn install_progress_line(step: InstallStep, config: &LagSwitchConfig) -> String {
    match step {
        InstallStep::RulesPresent => "[OK] Firewall rules already exist. Skipping.".to_string(),
        InstallStep::AddingRules => "[ACTION] Adding firewall rules...".to_string(),
        InstallStep::RulesAdded => format!("[SUCCESS] Rules added to {}.", config.pf_conf.display()),
        InstallStep::PreparingAnchorFile => "[ACTION] Creating anchor file...".to_string(),
        InstallStep::AnchorFileReady { created: true } => "[SUCCESS] Anchor file created.".to_string(),
        InstallStep::AnchorFileReady { created: false } => {
            "[OK] Anchor file already exists.".to_string()
        }
        InstallStep::ReloadingFirewall => "[ACTION] Reloading firewall configuration...".to_string(),
        InstallStep::FirewallReloaded => "[SUCCESS] Firewall reloaded and enabled.".to_string(),
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Performs exactly one toggle.  Requires root.
pub fn worker(
    privilege: Privilege,
    config: &LagSwitchConfig,
    filter: Arc<dyn PacketFilter>,
) -> Result<LagState, CommandError> {
    privilege.require_elevated(Mode::Worker.label())?;
    let use_case = ToggleLagUseCase::new(config, filter, privilege::current_pid());
    Ok(use_case.toggle()?)
}

// ── Helper ────────────────────────────────────────────────────────────────────

/// Serves toggle requests on stdin/stdout until stdin closes.  Requires root.
pub async fn helper(
    privilege: Privilege,
    config: &LagSwitchConfig,
    filter: Arc<dyn PacketFilter>,
) -> Result<ServeSummary, CommandError> {
    privilege.require_elevated(Mode::Helper.label())?;
    let pid = privilege::current_pid();
    let use_case = Arc::new(ToggleLagUseCase::new(config, filter, pid));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    Ok(serve(stdin, stdout, use_case, pid).await?)
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// What the listener did before it exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenSummary {
    pub reason: StopReason,
    pub presses: u64,
    /// The block was still on at exit and has been lifted.
    pub lifted_on_exit: bool,
}

/// Runs the hotkey listener until `shutdown` completes.  Must not be root.
///
/// `make_source` is called once, before any password prompt, so an
/// unsupported platform fails fast.
pub async fn listen<M, F>(
    privilege: Privilege,
    config: &LagSwitchConfig,
    make_source: M,
    shutdown: F,
) -> Result<ListenSummary, CommandError>
where
    M: FnOnce() -> Result<Box<dyn HotkeySource>, CaptureError>,
    F: Future<Output = ()>,
{
    privilege.require_unprivileged(Mode::Listen.label())?;
    let source = make_source()?;

    println!("--- Lag Switch Listener by {AUTHOR} ---");
    println!("[INFO] Initializing sudo session. You may be prompted for your password once.");
    elevation::preauthenticate()?;

    let exe = std::env::current_exe().map_err(CommandError::CurrentExe)?;
    let mut toggler = connect_toggler(exe, config).await;

    let keys = match source.start() {
        Ok(keys) => keys,
        Err(e) => {
            release(toggler.as_mut()).await;
            return Err(e.into());
        }
    };
    let mut events = match input_capture::forward_to_async(keys, KEY_EVENT_BUFFER) {
        Ok(events) => events,
        Err(e) => {
            source.stop();
            release(toggler.as_mut()).await;
            return Err(CommandError::Bridge(e));
        }
    };

    println!(
        "\n[SUCCESS] Listener is armed. Hotkey '{}' is active globally.",
        config.hotkey
    );
    println!("You can now focus on any application.");
    println!("Press Ctrl+C in this window to quit.");

    let mut listener = HotkeyListener::new(config.hotkey, toggler);
    let reason = listener.run(&mut events, shutdown).await;
    source.stop();
    println!("\n[EXIT] Shutting down listener.");

    let lifted_on_exit = match listener.shutdown().await {
        Ok(lifted) => lifted,
        Err(e) => {
            tracing::warn!("could not lift the block on exit: {e}");
            false
        }
    };
    if let Err(e) = listener.finish().await {
        tracing::warn!("helper did not shut down cleanly: {e}");
    }

    Ok(ListenSummary {
        reason,
        presses: listener.presses(),
        lifted_on_exit,
    })
}

/// Prefers the long-lived helper and falls back to one worker per press.
async fn connect_toggler(exe: PathBuf, config: &LagSwitchConfig) -> Box<dyn Toggler> {
    let fallback: Box<dyn Toggler> = Box::new(WorkerSpawner::new(
        exe.clone(),
        StateStore::new(config.state_file.clone()),
        Duration::from_secs(WORKER_TIMEOUT_SECS),
    ));
    match HelperClient::spawn(&exe, HelperTimeouts::default()).await {
        Ok(client) => {
            tracing::info!(helper_pid = client.helper_pid(), "using privileged helper");
            Box::new(FailoverToggler::new(Box::new(client), fallback))
        }
        Err(e) => {
            tracing::warn!("privileged helper unavailable ({e}); starting a worker per press");
            fallback
        }
    }
}

async fn release(toggler: &mut dyn Toggler) {
    if let Err(e) = toggler.finish().await {
        tracing::debug!("toggler release failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::firewall::mock::{FirewallCall, RecordingPacketFilter};
    use crate::infrastructure::input_capture::mock::MockHotkeySource;
    use std::fs;

    fn config_in(dir: &tempfile::TempDir) -> LagSwitchConfig {
        LagSwitchConfig::with_paths(
            &dir.path().join("pf.conf"),
            &dir.path().join("anchors").join("lag"),
            &dir.path().join(".lag_state"),
        )
        .unwrap()
    }

    #[test]
    fn test_setup_unprivileged_touches_nothing() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        fs::write(&cfg.pf_conf, "scrub-anchor \"com.apple/*\"\n").unwrap();
        let filter = Arc::new(RecordingPacketFilter::new());

        // Act
        let result = setup(Privilege::Unprivileged, &cfg, filter.clone());

        // Assert
        assert!(matches!(
            result,
            Err(CommandError::Privilege(PrivilegeError::NotElevated { .. }))
        ));
        assert_eq!(
            fs::read_to_string(&cfg.pf_conf).unwrap(),
            "scrub-anchor \"com.apple/*\"\n"
        );
        assert!(!cfg.anchor_file.exists());
        assert!(filter.calls().is_empty());
    }

    #[test]
    fn test_setup_elevated_reloads_then_enables() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        fs::write(&cfg.pf_conf, "").unwrap();
        let filter = Arc::new(RecordingPacketFilter::new());

        let report = setup(Privilege::Elevated, &cfg, filter.clone()).unwrap();

        assert!(report.rules_added);
        assert_eq!(
            filter.calls(),
            vec![
                FirewallCall::ReloadRuleset(cfg.pf_conf.clone()),
                FirewallCall::Enable
            ]
        );
    }

    #[test]
    fn test_install_progress_lines_announce_actions() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);

        assert_eq!(
            install_progress_line(InstallStep::AddingRules, &cfg),
            "[ACTION] Adding firewall rules..."
        );
        assert_eq!(
            install_progress_line(InstallStep::ReloadingFirewall, &cfg),
            "[ACTION] Reloading firewall configuration..."
        );
        assert_eq!(
            install_progress_line(InstallStep::AnchorFileReady { created: false }, &cfg),
            "[OK] Anchor file already exists."
        );
    }

    #[test]
    fn test_worker_unprivileged_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        let filter = Arc::new(RecordingPacketFilter::new());

        let result = worker(Privilege::Unprivileged, &cfg, filter.clone());

        assert!(matches!(result, Err(CommandError::Privilege(_))));
        assert!(!cfg.state_file.exists());
        assert!(!cfg.anchor_file.exists());
        assert!(filter.calls().is_empty());
    }

    #[test]
    fn test_worker_elevated_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        fs::create_dir_all(cfg.anchor_file.parent().unwrap()).unwrap();
        let filter = Arc::new(RecordingPacketFilter::new());

        let state = worker(Privilege::Elevated, &cfg, filter).unwrap();

        assert_eq!(state, LagState::Active);
        assert!(cfg.state_file.exists());
    }

    #[tokio::test]
    async fn test_helper_unprivileged_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);

        let result = helper(
            Privilege::Unprivileged,
            &cfg,
            Arc::new(RecordingPacketFilter::new()),
        )
        .await;

        assert!(matches!(result, Err(CommandError::Privilege(_))));
    }

    #[tokio::test]
    async fn test_listen_elevated_fails_before_anything_else() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        let mut source_made = false;

        let result = listen(
            Privilege::Elevated,
            &cfg,
            || {
                source_made = true;
                Ok(Box::new(MockHotkeySource::new()) as Box<dyn HotkeySource>)
            },
            std::future::pending(),
        )
        .await;

        assert!(matches!(
            result,
            Err(CommandError::Privilege(PrivilegeError::Elevated { .. }))
        ));
        assert!(!source_made);
    }

    #[tokio::test]
    async fn test_listen_reports_unsupported_platform() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);

        let result = listen(
            Privilege::Unprivileged,
            &cfg,
            || Err(CaptureError::UnsupportedPlatform("plan9".to_string())),
            std::future::pending(),
        )
        .await;

        assert!(matches!(
            result,
            Err(CommandError::Capture(CaptureError::UnsupportedPlatform(_)))
        ));
    }
}
