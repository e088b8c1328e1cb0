//! Integration tests for setup and the toggle worker.
//!
//! These tests exercise the command layer end-to-end against a scratch
//! directory: real files, a recording packet filter instead of `pfctl`.

use std::fs;
use std::sync::Arc;

use lagswitch::commands::{self, CommandError};
use lagswitch::config::LagSwitchConfig;
use lagswitch::infrastructure::firewall::mock::{FirewallCall, RecordingPacketFilter};
use lagswitch::infrastructure::privilege::Privilege;
use lagswitch_core::LagState;

const BLOCK_RULE: &str = "block out quick proto udp from any to any port 49152:65535\n";

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Sandbox {
    _dir: tempfile::TempDir,
    cfg: LagSwitchConfig,
}

fn sandbox(pf_conf: &str) -> Sandbox {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = LagSwitchConfig::with_paths(
        &dir.path().join("pf.conf"),
        &dir.path().join("pf.anchors").join("com.test.roblox"),
        &dir.path().join(".test_lag_state"),
    )
    .expect("valid config");
    fs::write(&cfg.pf_conf, pf_conf).expect("write pf.conf");
    Sandbox { _dir: dir, cfg }
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.lines().filter(|l| l.trim() == needle).count()
}

// ── Setup ─────────────────────────────────────────────────────────────────────

#[test]
fn test_setup_twice_is_idempotent() {
    // Arrange
    let sb = sandbox("scrub-anchor \"com.apple/*\"\nanchor \"com.apple/*\"\n");
    let filter = Arc::new(RecordingPacketFilter::new());

    // Act
    commands::setup(Privilege::Elevated, &sb.cfg, filter.clone()).expect("first setup");
    let after_first = fs::read(&sb.cfg.pf_conf).unwrap();
    let second = commands::setup(Privilege::Elevated, &sb.cfg, filter.clone()).expect("second setup");
    let after_second = fs::read(&sb.cfg.pf_conf).unwrap();

    // Assert
    assert_eq!(after_first, after_second, "second run must not change pf.conf");
    assert!(!second.rules_added);
    let conf = String::from_utf8(after_second).unwrap();
    assert_eq!(count(&conf, &sb.cfg.anchor.anchor_line()), 1);
    assert_eq!(count(&conf, &sb.cfg.anchor.load_line()), 1);
    assert_eq!(
        filter.calls(),
        vec![
            FirewallCall::ReloadRuleset(sb.cfg.pf_conf.clone()),
            FirewallCall::Enable,
            FirewallCall::ReloadRuleset(sb.cfg.pf_conf.clone()),
            FirewallCall::Enable,
        ]
    );
}

#[test]
fn test_setup_appends_exact_block() {
    let sb = sandbox("set skip on lo0\n");

    commands::setup(
        Privilege::Elevated,
        &sb.cfg,
        Arc::new(RecordingPacketFilter::new()),
    )
    .unwrap();

    let conf = fs::read_to_string(&sb.cfg.pf_conf).unwrap();
    let expected = format!(
        "set skip on lo0\n\nanchor \"roblox_block\"\nload anchor \"roblox_block\" from \"{}\"\n",
        sb.cfg.anchor_file.display()
    );
    assert_eq!(conf, expected);
}

// ── Worker ────────────────────────────────────────────────────────────────────

#[test]
fn test_n_worker_runs_leave_marker_iff_n_odd() {
    let sb = sandbox("");
    let filter = Arc::new(RecordingPacketFilter::new());
    commands::setup(Privilege::Elevated, &sb.cfg, filter.clone()).unwrap();

    for n in 1..=6 {
        let state = commands::worker(Privilege::Elevated, &sb.cfg, filter.clone())
            .expect("worker run");
        let odd = n % 2 == 1;
        assert_eq!(state.is_active(), odd, "state after run {n}");
        assert_eq!(sb.cfg.state_file.exists(), odd, "marker after run {n}");
        let anchor = fs::read_to_string(&sb.cfg.anchor_file).unwrap();
        assert_eq!(!anchor.is_empty(), odd, "anchor contents after run {n}");
    }
}

#[test]
fn test_activate_then_deactivate_round_trip() {
    let sb = sandbox("");
    let filter = Arc::new(RecordingPacketFilter::new());
    commands::setup(Privilege::Elevated, &sb.cfg, filter.clone()).unwrap();

    let on = commands::worker(Privilege::Elevated, &sb.cfg, filter.clone()).unwrap();
    assert_eq!(on, LagState::Active);
    assert_eq!(fs::read_to_string(&sb.cfg.anchor_file).unwrap(), BLOCK_RULE);

    let off = commands::worker(Privilege::Elevated, &sb.cfg, filter.clone()).unwrap();
    assert_eq!(off, LagState::Inactive);
    assert_eq!(fs::read(&sb.cfg.anchor_file).unwrap(), Vec::<u8>::new());

    let anchor_reloads = filter
        .calls()
        .into_iter()
        .filter(|c| matches!(c, FirewallCall::ReloadAnchor { anchor, .. } if anchor == "roblox_block"))
        .count();
    assert_eq!(anchor_reloads, 2);
}

#[test]
fn test_failed_reload_keeps_files_in_new_state() {
    let sb = sandbox("");
    let filter = Arc::new(RecordingPacketFilter::new());
    commands::setup(Privilege::Elevated, &sb.cfg, filter.clone()).unwrap();
    filter.fail_next_anchor_reload();

    let result = commands::worker(Privilege::Elevated, &sb.cfg, filter.clone());

    assert!(matches!(result, Err(CommandError::Toggle(_))));
    assert!(sb.cfg.state_file.exists());
    assert_eq!(fs::read_to_string(&sb.cfg.anchor_file).unwrap(), BLOCK_RULE);
}

// ── Privilege gating ──────────────────────────────────────────────────────────

#[test]
fn test_unprivileged_setup_and_worker_modify_nothing() {
    let untouched = "anchor \"com.apple/*\"\n";
    let sb = sandbox(untouched);
    let filter = Arc::new(RecordingPacketFilter::new());

    let setup = commands::setup(Privilege::Unprivileged, &sb.cfg, filter.clone());
    let worker = commands::worker(Privilege::Unprivileged, &sb.cfg, filter.clone());

    assert!(matches!(setup, Err(CommandError::Privilege(_))));
    assert!(matches!(worker, Err(CommandError::Privilege(_))));
    assert_eq!(fs::read_to_string(&sb.cfg.pf_conf).unwrap(), untouched);
    assert!(!sb.cfg.anchor_file.exists());
    assert!(!sb.cfg.state_file.exists());
    assert!(filter.calls().is_empty());
}
