//! One elevated worker process per request.
//!
//! Used when the helper cannot be started.  Each toggle runs
//! `sudo -n <self> --worker` to completion; the resulting state is then read
//! back from the state file, which the worker wrote under the state lock.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use lagswitch_core::LagState;

use super::WORKER_FLAG;
use crate::application::listen_hotkey::{Toggler, TogglerError};
use crate::infrastructure::elevation::elevated_self_command;
use crate::infrastructure::storage::StateStore;

pub struct WorkerSpawner {
    exe: PathBuf,
    store: StateStore,
    timeout: Duration,
}

impl WorkerSpawner {
    pub fn new(exe: PathBuf, store: StateStore, timeout: Duration) -> Self {
        Self {
            exe,
            store,
            timeout,
        }
    }

    async fn run_worker(&self) -> Result<(), TogglerError> {
        let mut cmd = elevated_self_command(&self.exe, WORKER_FLAG);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);
        let status = tokio::time::timeout(self.timeout, cmd.status())
            .await
            .map_err(|_| TogglerError::Timeout(self.timeout, "worker"))??;
        if status.success() {
            Ok(())
        } else {
            Err(TogglerError::WorkerFailed(status.to_string()))
        }
    }
}

#[async_trait]
impl Toggler for WorkerSpawner {
    async fn toggle(&mut self) -> Result<LagState, TogglerError> {
        self.run_worker().await?;
        Ok(self.store.load()?)
    }

    async fn deactivate(&mut self) -> Result<LagState, TogglerError> {
        if self.store.load()?.is_active() {
            self.run_worker().await?;
        }
        Ok(self.store.load()?)
    }

    async fn status(&mut self) -> Result<LagState, TogglerError> {
        Ok(self.store.load()?)
    }

    fn describe(&self) -> &'static str {
        "worker"
    }
}
