//! HotkeyListener: turns hotkey presses into toggle requests.
//!
//! The listener itself never touches pf or the state file.  Each matching
//! press is forwarded to a [`Toggler`], which is either a long-lived
//! privileged helper or a one-shot elevated worker.  Presses are handled one
//! at a time in arrival order, so two quick presses always produce two
//! complete toggles.
//!
//! On shutdown the listener asks the toggler to deactivate, which restores
//! normal traffic if the block was left on.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use lagswitch_core::{Hotkey, KeyPress, LagState, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::infrastructure::storage::StoreError;

/// Error type for a single toggle request.  None of these stop the listener.
#[derive(Debug, Error)]
pub enum TogglerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("helper channel closed")]
    ChannelClosed,

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker exited with {0}")]
    WorkerFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("block is still active after asking the {0} to lift it")]
    StillActive(&'static str),
}

/// Something that can change the lag state on the listener's behalf.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Toggler: Send {
    /// Performs one toggle and returns the resulting state.
    async fn toggle(&mut self) -> Result<LagState, TogglerError>;

    /// Forces the inactive state.
    async fn deactivate(&mut self) -> Result<LagState, TogglerError>;

    /// Reports the current state without changing it.
    async fn status(&mut self) -> Result<LagState, TogglerError>;

    /// Short label used in log lines.
    fn describe(&self) -> &'static str;

    /// Releases whatever the toggler holds open.  The default does nothing.
    async fn finish(&mut self) -> Result<(), TogglerError> {
        Ok(())
    }
}

// ── Failover ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Op {
    Toggle,
    Deactivate,
    Status,
}

async fn dispatch(toggler: &mut dyn Toggler, op: Op) -> Result<LagState, TogglerError> {
    match op {
        Op::Toggle => toggler.toggle().await,
        Op::Deactivate => toggler.deactivate().await,
        Op::Status => toggler.status().await,
    }
}

/// `true` when the error means the toggler can no longer be used, as opposed
/// to one request failing on the privileged side.
fn is_channel_failure(e: &TogglerError) -> bool {
    match e {
        TogglerError::ChannelClosed | TogglerError::Timeout(..) | TogglerError::Io(_) => true,
        TogglerError::Protocol(p) => !matches!(p, ProtocolError::Rejected(_)),
        TogglerError::WorkerFailed(_) | TogglerError::Store(_) | TogglerError::StillActive(_) => {
            false
        }
    }
}

/// Uses `primary` until its channel breaks, then `fallback` for good.
///
/// A toggle that broke the channel is not retried: it may already have been
/// applied.  Status and deactivate requests are idempotent and are retried on
/// the fallback immediately.
pub struct FailoverToggler {
    primary: Option<Box<dyn Toggler>>,
    fallback: Box<dyn Toggler>,
}

impl FailoverToggler {
    pub fn new(primary: Box<dyn Toggler>, fallback: Box<dyn Toggler>) -> Self {
        Self {
            primary: Some(primary),
            fallback,
        }
    }

    /// `true` once the primary has been abandoned.
    pub fn on_fallback(&self) -> bool {
        self.primary.is_none()
    }

    async fn run(&mut self, op: Op) -> Result<LagState, TogglerError> {
        if let Some(primary) = self.primary.as_mut() {
            match dispatch(primary.as_mut(), op).await {
                Err(e) if is_channel_failure(&e) => {
                    tracing::warn!(
                        "{} unavailable ({e}); using {} from now on",
                        primary.describe(),
                        self.fallback.describe()
                    );
                    self.abandon_primary().await;
                    if matches!(op, Op::Toggle) {
                        return Err(e);
                    }
                }
                other => return other,
            }
        }
        dispatch(self.fallback.as_mut(), op).await
    }

    /// Releases the broken primary before the fallback is used.  A helper
    /// lifts the block itself once its input closes, and the fallback must
    /// observe the state after that, not before.
    async fn abandon_primary(&mut self) {
        if let Some(mut primary) = self.primary.take() {
            if let Err(e) = primary.finish().await {
                tracing::debug!("releasing {} failed: {e}", primary.describe());
            }
        }
    }
}

#[async_trait]
impl Toggler for FailoverToggler {
    async fn toggle(&mut self) -> Result<LagState, TogglerError> {
        self.run(Op::Toggle).await
    }

    async fn deactivate(&mut self) -> Result<LagState, TogglerError> {
        self.run(Op::Deactivate).await
    }

    async fn status(&mut self) -> Result<LagState, TogglerError> {
        self.run(Op::Status).await
    }

    fn describe(&self) -> &'static str {
        match &self.primary {
            Some(primary) => primary.describe(),
            None => self.fallback.describe(),
        }
    }

    async fn finish(&mut self) -> Result<(), TogglerError> {
        if let Some(mut primary) = self.primary.take() {
            primary.finish().await?;
        }
        self.fallback.finish().await
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Why [`HotkeyListener::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown future completed (Ctrl-C).
    Interrupted,
    /// The key event source closed its channel.
    SourceClosed,
}

pub struct HotkeyListener {
    hotkey: Hotkey,
    toggler: Box<dyn Toggler>,
    presses: u64,
    last_state: Option<LagState>,
}

impl HotkeyListener {
    pub fn new(hotkey: Hotkey, toggler: Box<dyn Toggler>) -> Self {
        Self {
            hotkey,
            toggler,
            presses: 0,
            last_state: None,
        }
    }

    /// Number of matching presses handled so far.
    pub fn presses(&self) -> u64 {
        self.presses
    }

    /// State reported by the most recent successful request, if any.
    pub fn last_state(&self) -> Option<LagState> {
        self.last_state
    }

    /// Handles one key event.  Returns `None` when the key is not the hotkey
    /// (or is an auto-repeat).
    pub async fn handle_press(
        &mut self,
        press: KeyPress,
    ) -> Option<Result<LagState, TogglerError>> {
        if !self.hotkey.matches(&press) {
            return None;
        }
        self.presses += 1;
        let result = self.toggler.toggle().await;
        match &result {
            Ok(state) => {
                self.last_state = Some(*state);
                tracing::info!(press = self.presses, state = %state, via = self.toggler.describe(), "toggled");
            }
            Err(e) => {
                tracing::warn!(press = self.presses, via = self.toggler.describe(), "toggle failed: {e}");
            }
        }
        Some(result)
    }

    /// Consumes key events until `shutdown` completes or the channel closes.
    pub async fn run<S>(&mut self, events: &mut mpsc::Receiver<KeyPress>, shutdown: S) -> StopReason
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => return StopReason::Interrupted,
                event = events.recv() => match event {
                    Some(press) => {
                        let _ = self.handle_press(press).await;
                    }
                    None => return StopReason::SourceClosed,
                },
            }
        }
    }

    /// Lets the toggler release its resources; call after [`shutdown`](Self::shutdown).
    pub async fn finish(&mut self) -> Result<(), TogglerError> {
        self.toggler.finish().await
    }

    /// Restores the inactive state.  Returns `true` if the block was on and
    /// has been lifted.
    ///
    /// # Errors
    ///
    /// Any toggler error, and [`TogglerError::StillActive`] when the toggler
    /// answers the deactivate request with anything but `Inactive`.
    pub async fn shutdown(&mut self) -> Result<bool, TogglerError> {
        let was_active = self.toggler.status().await?.is_active();
        if !was_active {
            return Ok(false);
        }
        let state = self.toggler.deactivate().await?;
        self.last_state = Some(state);
        if state.is_active() {
            return Err(TogglerError::StillActive(self.toggler.describe()));
        }
        tracing::info!(via = self.toggler.describe(), "block lifted on exit");
        Ok(true)
    }
}
