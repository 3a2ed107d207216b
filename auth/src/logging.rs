//! Flow log port.
//!
//! Every component writes its diagnostic lines through [`FlowLog`]. The
//! default sink forwards to `tracing`; tests use a recording sink.

use std::fmt;
use std::sync::Arc;

/// Severity of a flow log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    /// Progress information.
    Info,
    /// Something unexpected that does not stop the flow.
    Warning,
    /// A failure.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// A sink accepting leveled text lines.
pub trait FlowLog: Send + Sync {
    /// Write one line.
    fn log(&self, level: LogLevel, message: &str);

    /// Write an info line.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Write a warning line.
    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Write an error line.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Shared handle to a flow log.
pub type SharedLog = Arc<dyn FlowLog>;

/// Forwards flow lines to `tracing` under the `wopi_auth::flow` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFlowLog;

impl TracingFlowLog {
    /// A shared tracing sink.
    #[must_use]
    pub fn shared() -> SharedLog {
        Arc::new(Self)
    }
}

impl FlowLog for TracingFlowLog {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!(target: "wopi_auth::flow", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "wopi_auth::flow", "{message}"),
            LogLevel::Error => tracing::error!(target: "wopi_auth::flow", "{message}"),
        }
    }
}

impl<T: FlowLog + ?Sized> FlowLog for Arc<T> {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message);
    }
}
