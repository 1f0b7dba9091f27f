//! Diagnostic events.
//!
//! Readers and writers emit `(severity, origin, message)` triples. Every event
//! goes to `tracing` and, when one is registered, to a caller supplied
//! [`LogSink`]. Each handle owns its own sink; there is no global registry.
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use mdf_engine::log::{LogSink, Severity};
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<String>>);
//!
//! impl LogSink for Collect {
//!     fn log(&self, severity: Severity, origin: &str, message: &str) {
//!         self.0.lock().unwrap().push(format!("{severity} {origin}: {message}"));
//!     }
//! }
//!
//! # fn main() -> mdf_engine::Result<()> {
//! let sink = Arc::new(Collect::default());
//! let mut reader = mdf_engine::MdfReader::new("recording.mf4")?;
//! reader.set_log_sink(sink.clone());
//! if !reader.read_everything_but_data() {
//!     println!("{:?}", sink.0.lock().unwrap());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// Receiver of diagnostic events.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, origin: &str, message: &str);
}

/// Per-handle diagnostics dispatcher.
#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<Arc<dyn LogSink>>,
}

impl core::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Diagnostics {
    pub fn new(sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { sink }
    }

    pub fn set_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.sink = Some(sink);
    }

    pub fn clear_sink(&mut self) {
        self.sink = None;
    }

    pub fn emit(&self, severity: Severity, origin: &str, message: &str) {
        match severity {
            Severity::Trace => tracing::trace!(origin, "{message}"),
            Severity::Debug => tracing::debug!(origin, "{message}"),
            Severity::Info => tracing::info!(origin, "{message}"),
            Severity::Warning => tracing::warn!(origin, "{message}"),
            Severity::Error => tracing::error!(origin, "{message}"),
        }
        if let Some(sink) = &self.sink {
            sink.log(severity, origin, message);
        }
    }

    pub fn debug(&self, origin: &str, message: &str) {
        self.emit(Severity::Debug, origin, message);
    }

    pub fn info(&self, origin: &str, message: &str) {
        self.emit(Severity::Info, origin, message);
    }

    pub fn warning(&self, origin: &str, message: &str) {
        self.emit(Severity::Warning, origin, message);
    }

    pub fn error(&self, origin: &str, message: &str) {
        self.emit(Severity::Error, origin, message);
    }
}
