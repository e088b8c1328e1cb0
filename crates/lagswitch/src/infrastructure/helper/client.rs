//! Listener side of the pipe protocol.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use lagswitch_core::{
    decode_line, encode_line, HelperCommand, HelperReply, HelperRequest, LagState, ProtocolError,
};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;

use super::framing::LineReader;
use super::{HelperError, HELPER_FLAG};
use crate::application::listen_hotkey::{Toggler, TogglerError};
use crate::config::{HELPER_HANDSHAKE_TIMEOUT_SECS, HELPER_REPLY_TIMEOUT_SECS};
use crate::infrastructure::elevation::elevated_self_command;

type ReplyLines = LineReader<Box<dyn AsyncBufRead + Send + Unpin>>;
type RequestSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Client-side timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperTimeouts {
    /// Maximum wait for the `ready` line.
    pub handshake: Duration,
    /// Maximum wait for each reply.
    pub reply: Duration,
}

impl Default for HelperTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(HELPER_HANDSHAKE_TIMEOUT_SECS),
            reply: Duration::from_secs(HELPER_REPLY_TIMEOUT_SECS),
        }
    }
}

/// Connection to a running helper.
///
/// After a reply timeout or an out-of-order reply the connection is marked
/// broken: replies can no longer be paired with requests, so every later
/// request fails with [`TogglerError::ChannelClosed`].
pub struct HelperClient {
    lines: ReplyLines,
    writer: Option<RequestSink>,
    child: Option<Child>,
    helper_pid: u32,
    timeouts: HelperTimeouts,
    broken: bool,
}

impl HelperClient {
    /// Starts `sudo -n <exe> --helper` and completes the handshake.
    ///
    /// # Errors
    ///
    /// [`HelperError::Spawn`] if `sudo` cannot be run, otherwise any
    /// handshake error from [`connect`](Self::connect).  When `sudo -n`
    /// refuses, the helper exits without writing and this returns
    /// [`HelperError::Closed`].
    pub async fn spawn(exe: &Path, timeouts: HelperTimeouts) -> Result<Self, HelperError> {
        let mut cmd = elevated_self_command(exe, HELPER_FLAG);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // Own process group: a terminal Ctrl-C must reach the listener only,
        // which then lifts the block through this helper.
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd.spawn().map_err(HelperError::Spawn)?;
        let stdin = child.stdin.take().ok_or(HelperError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(HelperError::MissingPipe("stdout"))?;

        let mut client = Self::connect(stdout, stdin, timeouts).await?;
        client.child = Some(child);
        Ok(client)
    }

    /// Completes the handshake over an existing pair of streams.
    ///
    /// # Errors
    ///
    /// - [`HelperError::HandshakeTimeout`] if no line arrives in time.
    /// - [`HelperError::Closed`] if the stream ends first.
    /// - [`HelperError::Protocol`] for a malformed line or a version mismatch.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        timeouts: HelperTimeouts,
    ) -> Result<Self, HelperError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(BufReader::new(reader));
        let mut lines = LineReader::new(reader);
        let first = tokio::time::timeout(timeouts.handshake, lines.next_frame())
            .await
            .map_err(|_| HelperError::HandshakeTimeout(timeouts.handshake))??
            .ok_or(HelperError::Closed)??;
        let helper_pid = decode_line::<HelperReply>(&first)?.into_ready()?;
        tracing::info!(helper_pid, "privileged helper ready");

        Ok(Self {
            lines,
            writer: Some(Box::new(writer)),
            child: None,
            helper_pid,
            timeouts,
            broken: false,
        })
    }

    /// PID the helper reported in its handshake.
    pub fn helper_pid(&self) -> u32 {
        self.helper_pid
    }

    /// Sends one request and waits for its acknowledgement.
    pub async fn request(&mut self, command: HelperCommand) -> Result<LagState, TogglerError> {
        if self.broken {
            return Err(TogglerError::ChannelClosed);
        }
        let result = self.exchange(command).await;
        if matches!(
            result,
            Err(TogglerError::Timeout(..))
                | Err(TogglerError::ChannelClosed)
                | Err(TogglerError::Io(_))
                | Err(TogglerError::Protocol(ProtocolError::IdMismatch { .. }))
                | Err(TogglerError::Protocol(ProtocolError::Malformed(_)))
                | Err(TogglerError::Protocol(ProtocolError::LineTooLong { .. }))
                | Err(TogglerError::Protocol(ProtocolError::UnexpectedReply(_)))
        ) {
            self.broken = true;
        }
        result
    }

    async fn exchange(&mut self, command: HelperCommand) -> Result<LagState, TogglerError> {
        let writer = self.writer.as_mut().ok_or(TogglerError::ChannelClosed)?;
        let request = HelperRequest::new(command);
        let line = encode_line(&request)?;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(closed_or_io)?;
        writer.flush().await.map_err(closed_or_io)?;

        let reply_line = tokio::time::timeout(self.timeouts.reply, self.lines.next_frame())
            .await
            .map_err(|_| TogglerError::Timeout(self.timeouts.reply, "helper reply"))??
            .ok_or(TogglerError::ChannelClosed)??;
        let reply: HelperReply = decode_line(&reply_line)?;
        Ok(reply.into_state_for(request.id)?)
    }

    /// Closes the request pipe and waits for the helper to exit.
    ///
    /// The helper lifts the block itself when its input closes.
    async fn close(&mut self) -> Result<(), TogglerError> {
        // Dropping the sink closes the pipe; the helper sees EOF.
        drop(self.writer.take());
        self.broken = true;

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(self.timeouts.reply, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    tracing::debug!(%status, "helper exited");
                }
                Err(_) => tracing::warn!("helper did not exit within {:?}", self.timeouts.reply),
            }
        }
        Ok(())
    }
}

fn closed_or_io(e: std::io::Error) -> TogglerError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        TogglerError::ChannelClosed
    } else {
        TogglerError::Io(e)
    }
}

#[async_trait]
impl Toggler for HelperClient {
    async fn toggle(&mut self) -> Result<LagState, TogglerError> {
        self.request(HelperCommand::Toggle).await
    }

    async fn deactivate(&mut self) -> Result<LagState, TogglerError> {
        self.request(HelperCommand::Deactivate).await
    }

    async fn status(&mut self) -> Result<LagState, TogglerError> {
        self.request(HelperCommand::Status).await
    }

    fn describe(&self) -> &'static str {
        "helper"
    }

    async fn finish(&mut self) -> Result<(), TogglerError> {
        self.close().await
    }
}
