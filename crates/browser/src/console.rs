use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use pagebridge_tools::console::{ConsoleEntry, ConsoleLevel};

pub const DEFAULT_CONSOLE_CAPACITY: usize = 1000;

/// Bounded record of console output. The page writes through it; the oldest
/// entry is dropped once capacity is reached.
pub struct ConsoleSink {
    capacity: usize,
    entries: Mutex<VecDeque<ConsoleEntry>>,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

impl ConsoleSink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CONSOLE_CAPACITY))),
        }
    }

    pub fn write(&self, level: ConsoleLevel, message: impl Into<String>) {
        let entry = ConsoleEntry {
            level,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.write(ConsoleLevel::Log, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.write(ConsoleLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.write(ConsoleLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.write(ConsoleLevel::Error, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.write(ConsoleLevel::Debug, message);
    }

    /// Entries oldest first.
    pub fn snapshot(&self) -> Vec<ConsoleEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
