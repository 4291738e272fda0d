//! Turn stream over a raw byte reader (normally a child's stdout).

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use super::{Turn, TurnFramer, TurnSource};

/// Frames turns out of an [`AsyncRead`] one byte at a time.
///
/// Reads go through a [`BufReader`] so the per-byte scan does not cost a
/// syscall per byte, but the framer still sees every byte individually.
/// Once the reader reports end of stream the sequence is finished for good;
/// a new process needs a new stream.
#[derive(Debug)]
pub struct ProcessTurnStream<R> {
    reader: BufReader<R>,
    framer: TurnFramer,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin + Send> ProcessTurnStream<R> {
    pub fn new(reader: R, sentinel: &str) -> Self {
        Self {
            reader: BufReader::new(reader),
            framer: TurnFramer::new(sentinel),
            exhausted: false,
        }
    }

    /// Whether end of stream has been observed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    async fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = self
            .reader
            .read(&mut byte)
            .await
            .context("failed to read from game output")?;
        Ok((n == 1).then_some(byte[0]))
    }
}

impl<R: AsyncRead + Unpin + Send> TurnSource for ProcessTurnStream<R> {
    async fn next_turn(&mut self) -> Result<Option<Turn>> {
        if self.exhausted {
            return Ok(None);
        }

        while let Some(byte) = self.read_byte().await? {
            if let Some(turn) = self.framer.push(byte) {
                return Ok(Some(turn));
            }
        }

        let dropped = self.framer.pending().len();
        if dropped > 0 {
            tracing::debug!(bytes = dropped, "discarding partial turn at end of stream");
        }
        self.framer.reset();
        self.exhausted = true;
        Ok(None)
    }
}
