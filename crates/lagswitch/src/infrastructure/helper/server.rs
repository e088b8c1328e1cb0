//! Helper side of the pipe protocol.
//!
//! Writes `ready`, then answers each request line in order.  The toggle use
//! case does blocking file locking and runs `pfctl`, so each request is
//! executed on the blocking pool.

use std::sync::Arc;

use lagswitch_core::protocol::messages::PROTOCOL_VERSION;
use lagswitch_core::{decode_line, encode_line, HelperCommand, HelperReply, HelperRequest};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use super::framing::LineReader;
use super::HelperError;
use crate::application::toggle_lag::{ToggleError, ToggleLagUseCase};

/// Counters reported when the helper exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    /// Request lines that decoded successfully.
    pub requests: u64,
    /// Lines answered with a `failed` reply (malformed or unsuccessful).
    pub failures: u64,
    /// `true` if the block was still active when serving ended and had to be lifted.
    pub deactivated_on_close: bool,
}

/// Serves requests until `reader` reaches EOF or either pipe fails.
///
/// However the loop ends, the block is lifted if it is still on.
///
/// # Errors
///
/// [`HelperError::Io`] if the pipes fail and [`HelperError::Cleanup`] if the
/// block could not be lifted.  A pipe error is reported after the cleanup has
/// run.  Failed requests are reported to the client and do not end the loop.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    use_case: Arc<ToggleLagUseCase>,
    pid: u32,
) -> Result<ServeSummary, HelperError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = ServeSummary::default();
    let ready = HelperReply::Ready {
        protocol: PROTOCOL_VERSION,
        pid,
    };
    let outcome = match write_reply(&mut writer, &ready).await {
        Ok(()) => {
            let lines = LineReader::new(reader);
            answer_requests(lines, &mut writer, &use_case, &mut summary).await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        tracing::warn!("helper channel failed: {e}");
    }

    summary.deactivated_on_close = deactivate_on_close(use_case).await?;
    tracing::debug!(?summary, "helper input closed");
    outcome.map(|()| summary)
}

async fn answer_requests<R, W>(
    mut lines: LineReader<R>,
    writer: &mut W,
    use_case: &Arc<ToggleLagUseCase>,
    summary: &mut ServeSummary,
) -> Result<(), HelperError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = lines.next_frame().await? {
        if matches!(&frame, Ok(line) if line.trim().is_empty()) {
            continue;
        }
        let reply = match frame.and_then(|line| decode_line::<HelperRequest>(&line)) {
            Ok(request) => {
                summary.requests += 1;
                execute(Arc::clone(use_case), request).await
            }
            Err(e) => {
                tracing::debug!("rejecting request line: {e}");
                HelperReply::Failed {
                    id: None,
                    reason: e.to_string(),
                }
            }
        };
        if matches!(reply, HelperReply::Failed { .. }) {
            summary.failures += 1;
        }
        write_reply(writer, &reply).await?;
    }
    Ok(())
}

async fn execute(use_case: Arc<ToggleLagUseCase>, request: HelperRequest) -> HelperReply {
    let command = request.command;
    let result = tokio::task::spawn_blocking(move || match command {
        HelperCommand::Toggle => use_case.toggle(),
        HelperCommand::Deactivate => use_case.deactivate(),
        HelperCommand::Status => use_case.current(),
    })
    .await;

    match result {
        Ok(Ok(state)) => HelperReply::Ack {
            id: request.id,
            state,
        },
        Ok(Err(e)) => HelperReply::Failed {
            id: Some(request.id),
            reason: e.to_string(),
        },
        Err(join) => HelperReply::Failed {
            id: Some(request.id),
            reason: format!("request task failed: {join}"),
        },
    }
}

async fn deactivate_on_close(use_case: Arc<ToggleLagUseCase>) -> Result<bool, HelperError> {
    let result = tokio::task::spawn_blocking(move || -> Result<bool, ToggleError> {
        let was_active = use_case.current()?.is_active();
        if was_active {
            use_case.deactivate()?;
        }
        Ok(was_active)
    })
    .await
    .map_err(|join| HelperError::Io(std::io::Error::other(join.to_string())))?;
    result.map_err(HelperError::Cleanup)
}

async fn write_reply<W>(writer: &mut W, reply: &HelperReply) -> Result<(), HelperError>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_line(reply)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LagSwitchConfig;
    use lagswitch_core::protocol::messages::MAX_LINE_LEN;
    use crate::infrastructure::firewall::mock::RecordingPacketFilter;
    use lagswitch_core::LagState;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::BufReader;

    /// Accepts the `ready` line, then fails every write like a closed pipe.
    #[derive(Default)]
    struct ClosesAfterReady {
        written: Vec<u8>,
    }

    impl AsyncWrite for ClosesAfterReady {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.written.is_empty() {
                self.written.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            } else {
                Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn use_case(dir: &tempfile::TempDir) -> (LagSwitchConfig, Arc<ToggleLagUseCase>) {
        let cfg = LagSwitchConfig::with_paths(
            &dir.path().join("pf.conf"),
            &dir.path().join("anchor"),
            &dir.path().join(".lag_state"),
        )
        .unwrap();
        let uc = ToggleLagUseCase::new(&cfg, Arc::new(RecordingPacketFilter::new()), 99);
        (cfg, Arc::new(uc))
    }

    async fn run_script(uc: Arc<ToggleLagUseCase>, script: &str) -> (ServeSummary, Vec<HelperReply>) {
        let mut output = Vec::new();
        let summary = serve(BufReader::new(script.as_bytes()), &mut output, uc, 99)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();
        let replies = text.lines().map(|l| decode_line(l).unwrap()).collect();
        (summary, replies)
    }

    #[tokio::test]
    async fn test_ready_is_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let (_, uc) = use_case(&dir);

        let (_, replies) = run_script(uc, "").await;

        assert_eq!(
            replies,
            vec![HelperReply::Ready {
                protocol: PROTOCOL_VERSION,
                pid: 99
            }]
        );
    }

    #[tokio::test]
    async fn test_requests_are_acked_in_order() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let (_, uc) = use_case(&dir);
        let first = HelperRequest::new(HelperCommand::Toggle);
        let second = HelperRequest::new(HelperCommand::Status);
        let script = format!(
            "{}{}",
            encode_line(&first).unwrap(),
            encode_line(&second).unwrap()
        );

        // Act
        let (summary, replies) = run_script(uc, &script).await;

        // Assert
        assert_eq!(summary.requests, 2);
        assert_eq!(
            replies[1],
            HelperReply::Ack {
                id: first.id,
                state: LagState::Active
            }
        );
        assert_eq!(
            replies[2],
            HelperReply::Ack {
                id: second.id,
                state: LagState::Active
            }
        );
        // Input closed while active, so the block was lifted.
        assert!(summary.deactivated_on_close);
    }

    #[tokio::test]
    async fn test_malformed_line_gets_failed_with_null_id() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, uc) = use_case(&dir);

        let (summary, replies) = run_script(uc, "not json\n").await;

        assert!(matches!(replies[1], HelperReply::Failed { id: None, .. }));
        assert_eq!(summary.failures, 1);
        assert!(!summary.deactivated_on_close);
        assert!(!cfg.state_file.exists());
    }

    #[tokio::test]
    async fn test_eof_restores_off_state() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, uc) = use_case(&dir);
        let script = encode_line(&HelperRequest::new(HelperCommand::Toggle)).unwrap();

        let (summary, _) = run_script(uc, &script).await;

        assert!(summary.deactivated_on_close);
        assert!(!cfg.state_file.exists());
        assert_eq!(std::fs::read(&cfg.anchor_file).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_broken_reply_pipe_still_lifts_block() {
        // Arrange: the listener vanished while its toggle was in flight.
        let dir = tempfile::tempdir().unwrap();
        let (cfg, uc) = use_case(&dir);
        let script = encode_line(&HelperRequest::new(HelperCommand::Toggle)).unwrap();
        let mut writer = ClosesAfterReady::default();

        // Act
        let result = serve(BufReader::new(script.as_bytes()), &mut writer, uc, 99).await;

        // Assert
        assert!(matches!(result, Err(HelperError::Io(_))));
        assert!(!cfg.state_file.exists());
        assert_eq!(std::fs::read(&cfg.anchor_file).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_rejected_and_serving_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, uc) = use_case(&dir);
        let toggle = HelperRequest::new(HelperCommand::Toggle);
        let status = HelperRequest::new(HelperCommand::Status);
        let mut script = encode_line(&toggle).unwrap().into_bytes();
        script.extend_from_slice(b"\xff\xfe\n");
        script.extend_from_slice(encode_line(&status).unwrap().as_bytes());
        let mut output = Vec::new();

        let summary = serve(BufReader::new(&script[..]), &mut output, uc, 99)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let replies: Vec<HelperReply> = text.lines().map(|l| decode_line(l).unwrap()).collect();
        assert_eq!(replies.len(), 4);
        assert!(matches!(replies[2], HelperReply::Failed { id: None, .. }));
        assert_eq!(
            replies[3],
            HelperReply::Ack {
                id: status.id,
                state: LagState::Active
            }
        );
        assert_eq!(summary.failures, 1);
        assert!(summary.deactivated_on_close);
        assert!(!cfg.state_file.exists());
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected_without_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let (_, uc) = use_case(&dir);
        let mut script = "x".repeat(MAX_LINE_LEN * 2);
        script.push('\n');
        script.push_str(&encode_line(&HelperRequest::new(HelperCommand::Status)).unwrap());

        let (summary, replies) = run_script(uc, &script).await;

        assert!(matches!(replies[1], HelperReply::Failed { id: None, .. }));
        assert!(matches!(replies[2], HelperReply::Ack { .. }));
        assert_eq!(summary.requests, 1);
    }
}
