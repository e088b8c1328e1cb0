//! Bounded line reader shared by both ends of the pipe.
//!
//! A line is read through `take(MAX_LINE_LEN + 1)`, so an endless line never
//! grows the buffer past the limit.  Over-long lines are skipped up to the
//! next `\n` and reported as [`ProtocolError::LineTooLong`]; lines that are not
//! UTF-8 are reported as [`ProtocolError::Malformed`].  Either way the stream
//! stays usable for the next line.

use std::io;

use lagswitch_core::protocol::messages::MAX_LINE_LEN;
use lagswitch_core::ProtocolError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// One framed line: its text, or why it could not be used.
pub type Frame = Result<String, ProtocolError>;

pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(256),
        }
    }

    /// Reads the next line without its terminator.  `Ok(None)` at EOF.
    ///
    /// # Errors
    ///
    /// Only I/O errors from the underlying stream.
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        self.buf.clear();
        let limit = MAX_LINE_LEN as u64 + 1;
        let n = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if self.buf.len() > MAX_LINE_LEN {
            let skipped = self.skip_rest_of_line().await?;
            return Ok(Some(Err(ProtocolError::LineTooLong {
                len: self.buf.len() + skipped,
            })));
        }

        let bytes = std::mem::take(&mut self.buf);
        Ok(Some(String::from_utf8(bytes).map_err(|e| {
            ProtocolError::Malformed(format!("line is not UTF-8: {}", e.utf8_error()))
        })))
    }

    /// Discards input up to and including the next `\n`.  Returns the number
    /// of bytes dropped before it.
    async fn skip_rest_of_line(&mut self) -> io::Result<usize> {
        let mut skipped = 0;
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(skipped + pos);
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                    skipped += len;
                }
            }
        }
    }
}
