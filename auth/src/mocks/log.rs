//! Recording flow log.

use crate::logging::{FlowLog, LogLevel};
use std::sync::{Mutex, PoisonError};

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line so far, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Just the text of every line.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, line)| line).collect()
    }

    /// Whether any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|(_, line)| line.contains(needle))
    }

    /// Whether any line at `level` contains `needle`.
    #[must_use]
    pub fn contains_at(&self, level: LogLevel, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(at, line)| *at == level && line.contains(needle))
    }

    /// How many lines contain `needle`.
    #[must_use]
    pub fn count(&self, needle: &str) -> usize {
        self.entries()
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .count()
    }
}

impl FlowLog for RecordingLog {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}
