//! Console sink for script output

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "LOG",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One line written by a script or by error reporting
#[derive(Debug, Clone)]
pub struct ConsoleMessage {
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl ConsoleMessage {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            level,
            message: message.into(),
            timestamp,
        }
    }
}

/// Bounded buffer of console lines; the oldest line is dropped when full
#[derive(Debug)]
pub struct Console {
    messages: VecDeque<ConsoleMessage>,
    capacity: usize,
}

impl Console {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(ConsoleMessage::new(level, message));
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Log, message);
    }

    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &ConsoleMessage> {
        self.messages.iter()
    }

    /// Text of every retained line, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.message.clone()).collect()
    }

    /// Remove and return every retained line
    pub fn drain(&mut self) -> Vec<ConsoleMessage> {
        self.messages.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::with_capacity(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_keeps_order() {
        let mut console = Console::default();
        console.log("first");
        console.push(LogLevel::Error, "second");
        assert_eq!(console.lines(), vec!["first", "second"]);
        assert_eq!(console.messages().last().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn test_console_capacity() {
        let mut console = Console::with_capacity(3);
        for i in 0..5 {
            console.log(format!("Message {}", i));
        }
        assert_eq!(console.len(), 3);
        assert_eq!(console.lines()[0], "Message 2");
    }

    #[test]
    fn test_console_drain() {
        let mut console = Console::default();
        console.log("message");
        assert_eq!(console.drain().len(), 1);
        assert!(console.is_empty());
    }

    #[test]
    fn test_log_level_str() {
        assert_eq!(LogLevel::Error.as_str(), "ERROR");
        assert_eq!(LogLevel::Warn.as_str(), "WARN");
    }
}
