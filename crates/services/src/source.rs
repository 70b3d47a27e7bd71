use crate::SnapshotSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use scrobble_bridge_core::Snapshot;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

/// Replays newline-delimited JSON snapshots, one per line.
///
/// Blank lines are skipped; lines that fail to parse are logged and skipped
/// so one bad sample does not end the session.
pub struct JsonLinesSource<R> {
    name: &'static str,
    lines: Lines<R>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(name: &'static str, reader: R) -> Self {
        Self {
            name,
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl JsonLinesSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open snapshot file {}", path.display()))?;
        Ok(Self::new("file", BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> SnapshotSource for JsonLinesSource<R> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn next_snapshot(&mut self) -> Result<Option<Snapshot>> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .context("failed to read snapshot line")?
            else {
                return Ok(None);
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Snapshot>(&line) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(err) => {
                    warn!(source = self.name, line = self.line_no, error = %err, "skipping malformed snapshot");
                }
            }
        }
    }
}
