//! Call records and failure diagnostics.
//!
//! Every intercepted call on a description produces a [`CallRecord`] kept in
//! the session's ring buffer. When a call fails and the exception handler asks
//! for it, a [`DiagnosticArtifact`] (error text plus an optional screenshot of
//! the focused surface) is handed to the session's [`DiagnosticSink`].
//!
//! # Example
//!
//! ```
//! use surfkit_core::diagnostics::{CallOutcome, CallRecord};
//!
//! let record = CallRecord::new(3, "LoginPage", "submit", CallOutcome::Success, 1, Some(42));
//! println!("{} {} at {}", record.type_name, record.method, record.timestamp);
//! ```

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// How an intercepted call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOutcome {
    /// The body returned normally.
    Success,

    /// The body failed and the handler substituted the default value.
    Suppressed(String),

    /// The body failed and the error was returned to the caller.
    Failure(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success)
    }
}

/// One intercepted method call on a model node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// When the call completed.
    pub timestamp: DateTime<Utc>,

    /// Model node the call was made on.
    pub node: u64,

    /// Description type of the node.
    pub type_name: String,

    /// Name of the intercepted method.
    pub method: String,

    pub outcome: CallOutcome,

    /// Number of times the body ran (1 unless the handler retried).
    pub attempts: u32,

    /// Wall-clock duration of the whole call including retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Screenshot captured after a successful call (base64-encoded PNG).
    ///
    /// Wrapped in `Arc` for cheap cloning when broadcasting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Arc<String>>,
}

impl CallRecord {
    /// Creates a record with a fresh id and the current time.
    pub fn new(
        node: u64,
        type_name: impl Into<String>,
        method: impl Into<String>,
        outcome: CallOutcome,
        attempts: u32,
        duration_ms: Option<u64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            node,
            type_name: type_name.into(),
            method: method.into(),
            outcome,
            attempts,
            duration_ms,
            screenshot: None,
        }
    }

    pub fn with_screenshot(mut self, screenshot: Option<Arc<String>>) -> Self {
        self.screenshot = screenshot;
        self
    }
}

/// Evidence collected when an intercepted call fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticArtifact {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub node: u64,
    pub type_name: String,
    pub method: String,
    /// Display text of the failure.
    pub error: String,
    /// Screenshot of the focused surface (base64-encoded PNG), when one could be taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Arc<String>>,
}

impl DiagnosticArtifact {
    pub fn new(
        node: u64,
        type_name: impl Into<String>,
        method: impl Into<String>,
        error: impl Into<String>,
        screenshot: Option<Arc<String>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            node,
            type_name: type_name.into(),
            method: method.into(),
            error: error.into(),
            screenshot,
        }
    }

    /// Decodes the screenshot back to raw PNG bytes.
    pub fn screenshot_png(&self) -> Option<Vec<u8>> {
        let encoded = self.screenshot.as_ref()?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .ok()
    }
}

/// Encodes raw PNG bytes the way artifacts and call records store them.
pub fn encode_screenshot(png: &[u8]) -> Arc<String> {
    Arc::new(base64::engine::general_purpose::STANDARD.encode(png))
}

/// Destination for diagnostic artifacts.
///
/// Recording must not fail the call that produced the artifact, so
/// implementations log their own errors instead of returning them.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn record(&self, artifact: Arc<DiagnosticArtifact>);
}

/// Sink that drops every artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl DiagnosticSink for NullSink {
    async fn record(&self, _artifact: Arc<DiagnosticArtifact>) {}
}

/// Sink that keeps artifacts in memory, mostly for tests and reporting.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: parking_lot::Mutex<Vec<Arc<DiagnosticArtifact>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded artifact, oldest first.
    pub fn artifacts(&self) -> Vec<Arc<DiagnosticArtifact>> {
        self.artifacts.lock().clone()
    }

    pub fn clear(&self) {
        self.artifacts.lock().clear();
    }
}

#[async_trait]
impl DiagnosticSink for MemorySink {
    async fn record(&self, artifact: Arc<DiagnosticArtifact>) {
        self.artifacts.lock().push(artifact);
    }
}

/// Sink that appends artifacts to a JSON Lines file.
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<std::fs::File>>,
}

impl JsonlSink {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Creates `{dir}/{name}_{timestamp}.jsonl`.
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> std::io::Result<Self> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        Self::create(dir.as_ref().join(format!("{}_{}.jsonl", name, timestamp)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DiagnosticSink for JsonlSink {
    async fn record(&self, artifact: Arc<DiagnosticArtifact>) {
        let line = match serde_json::to_string(artifact.as_ref()) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize diagnostic artifact");
                return;
            }
        };
        let mut writer = self.writer.lock().await;
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(path = %self.path.display(), error = %e, "failed to write diagnostic artifact");
        }
    }
}

impl std::fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink").field("path", &self.path).finish()
    }
}
