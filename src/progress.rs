//! Hierarchical progress reporting and cooperative cancellation.
//!
//! [Progress] carries a prefix chain ("node/batch 2/5/...") and forwards
//! resolved status lines to a [ProgressSink]. The default sink logs through
//! `tracing`. Progress is purely observational and never influences control
//! flow; cancellation goes through [CancelToken] instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives resolved progress status lines.
pub trait ProgressSink: Send + Sync {
  fn report(&self, status: &str);
}

/// Default sink: forwards status lines to `tracing` at info level.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
  fn report(&self, status: &str) {
    tracing::info!(status = %status, "progress");
  }
}

/// A progress handle scoped to a prefix chain, e.g. `"Threshold/Data row 3/10"`.
#[derive(Clone)]
pub struct Progress {
  prefix: String,
  sink: Arc<dyn ProgressSink>,
}

impl Progress {
  pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
    Self {
      prefix: String::new(),
      sink,
    }
  }

  /// A root progress handle logging through [TracingSink].
  pub fn tracing() -> Self {
    Self::new(Arc::new(TracingSink))
  }

  /// Returns a child handle whose statuses are prefixed with `segment`.
  pub fn nested(&self, segment: &str) -> Self {
    let prefix = if self.prefix.is_empty() {
      segment.to_string()
    } else {
      format!("{}/{}", self.prefix, segment)
    };
    Self {
      prefix,
      sink: Arc::clone(&self.sink),
    }
  }

  /// Reports a status line under the current prefix.
  pub fn report(&self, status: &str) {
    if self.prefix.is_empty() {
      self.sink.report(status);
    } else {
      self.sink.report(&format!("{}: {}", self.prefix, status));
    }
  }
}

impl std::fmt::Debug for Progress {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Progress")
      .field("prefix", &self.prefix)
      .finish()
  }
}

/// Cooperative cancellation flag shared across a run.
///
/// Checked before each unit of work starts; units already running are not
/// aborted mid-execution.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  flag: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// Requests cancellation. Idempotent.
  pub fn cancel(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }
}
