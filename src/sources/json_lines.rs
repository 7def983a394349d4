//! # Newline-delimited JSON file source (`JsonLinesSource`).
//!
//! Replays a file of JSON records, one per line, deriving each record's routing
//! key with a closure. Optional pacing spaces records out, which turns a recorded
//! capture into a live-looking feed.
//!
//! ## Rules
//! - Blank lines are skipped; malformed lines (bad JSON or bad UTF-8) are logged
//!   with `warn!` and skipped.
//! - A missing file is a transient failure (the runner reconnects).
//! - A read error after records were published is fatal, so a reconnect never
//!   replays the head of the file.
//! - Reaching the end of the file completes the source.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde::Deserialize;
//! use keyfan::{JsonLinesSource, SourceRef};
//!
//! #[derive(Clone, Deserialize)]
//! struct Deposit { user_id: String, amount: u64 }
//!
//! let src: SourceRef<String, Deposit> =
//!     JsonLinesSource::new("deposits", "deposits.jsonl", |d: &Deposit| d.user_id.clone())
//!         .with_pace(Duration::from_millis(500))
//!         .into_arc();
//! assert_eq!(src.name(), "deposits");
//! ```

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::Publisher;
use crate::error::SourceError;
use crate::sources::source::{Source, forward};

/// Source replaying JSON records from a file.
pub struct JsonLinesSource<F> {
    name: Cow<'static, str>,
    path: PathBuf,
    key_fn: F,
    pace: Option<Duration>,
}

impl<F> JsonLinesSource<F> {
    /// Creates a source over `path`, keying each record with `key_fn`.
    pub fn new(name: impl Into<Cow<'static, str>>, path: impl Into<PathBuf>, key_fn: F) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            key_fn,
            pace: None,
        }
    }

    /// Waits `delay` after each published record.
    pub fn with_pace(mut self, delay: Duration) -> Self {
        self.pace = Some(delay).filter(|d| !d.is_zero());
        self
    }

    /// Wraps the source in an `Arc`.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl<K, V, F> Source<K, V> for JsonLinesSource<F>
where
    K: Send + 'static,
    V: DeserializeOwned + Send + 'static,
    F: Fn(&V) -> K + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, publisher: Publisher<K, V>, ctx: CancellationToken) -> Result<(), SourceError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| SourceError::fail(format!("open {}: {e}", self.path.display())))?;
        let mut lines = BufReader::new(file).split(b'\n');
        let mut line_no = 0u64;

        loop {
            let line = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(SourceError::Canceled),
                line = lines.next_segment() => line
                    .map_err(|e| SourceError::fatal(format!("read {} after line {line_no}: {e}", self.path.display())))?,
            };
            let Some(line) = line else {
                debug!(source = %self.name, records = line_no, "end of file");
                return Ok(());
            };
            line_no += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let record: V = match serde_json::from_slice(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(source = %self.name, line = line_no, error = %e, "skipping malformed record");
                    continue;
                }
            };
            let key = (self.key_fn)(&record);
            forward(&publisher, key, record, &ctx).await?;

            if let Some(delay) = self.pace {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Err(SourceError::Canceled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::capture;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Deposit {
        user: String,
        amount: u64,
    }

    #[tokio::test]
    async fn replays_records_skipping_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user":"u1","amount":10}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"user":"u2","amount":20}}"#).unwrap();
        file.flush().unwrap();

        let (publisher, mut rx) = capture::<String, Deposit>();
        let src = JsonLinesSource::new("deposits", file.path(), |d: &Deposit| d.user.clone());
        assert_eq!(src.run(publisher, CancellationToken::new()).await, Ok(()));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.key, "u1");
        assert_eq!(first.payload.amount, 10);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.key, "u2");
        assert_eq!(second.seq, first.seq + 1);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user":"u1","amount":1}}"#).unwrap();
        file.write_all(b"\xff\xfe\n").unwrap();
        writeln!(file, r#"{{"user":"u2","amount":2}}"#).unwrap();
        file.flush().unwrap();

        let (publisher, mut rx) = capture::<String, Deposit>();
        let src = JsonLinesSource::new("deposits", file.path(), |d: &Deposit| d.user.clone());
        assert_eq!(src.run(publisher, CancellationToken::new()).await, Ok(()));

        assert_eq!(rx.recv().await.unwrap().payload.amount, 1);
        assert_eq!(rx.recv().await.unwrap().payload.amount, 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn crlf_line_endings_are_accepted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"user\":\"u1\",\"amount\":7}\r\n").unwrap();
        file.flush().unwrap();

        let (publisher, mut rx) = capture::<String, Deposit>();
        let src = JsonLinesSource::new("deposits", file.path(), |d: &Deposit| d.user.clone());
        assert_eq!(src.run(publisher, CancellationToken::new()).await, Ok(()));
        assert_eq!(rx.recv().await.unwrap().payload.amount, 7);
    }

    #[tokio::test]
    async fn missing_file_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let (publisher, _rx) = capture::<String, Deposit>();
        let src = JsonLinesSource::new("deposits", dir.path().join("absent.jsonl"), |d: &Deposit| {
            d.user.clone()
        });
        let err = src.run(publisher, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_spaces_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for user in ["a", "b", "c"] {
            writeln!(file, r#"{{"user":"{user}","amount":1}}"#).unwrap();
        }
        file.flush().unwrap();

        let (publisher, _rx) = capture::<String, Deposit>();
        let src = JsonLinesSource::new("paced", file.path(), |d: &Deposit| d.user.clone())
            .with_pace(Duration::from_millis(500));

        let started = tokio::time::Instant::now();
        src.run(publisher, CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }
}
