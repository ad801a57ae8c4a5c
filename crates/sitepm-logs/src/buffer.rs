//! Bounded in-memory tail of recent log lines

use std::collections::VecDeque;

use crate::writer::LogStream;

#[derive(Debug, Clone)]
struct Entry {
    stream: LogStream,
    line: String,
}

/// FIFO ring buffer; the oldest line is evicted once capacity is reached
#[derive(Debug)]
pub struct LogBuffer {
    entries: VecDeque<Entry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, stream: LogStream, line: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Entry {
            stream,
            line: line.into(),
        });
    }

    /// Last `limit` lines, oldest first
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries
            .iter()
            .skip(skip)
            .map(|e| e.line.clone())
            .collect()
    }

    /// Last `limit` lines of one stream, oldest first
    pub fn recent_from(&self, stream: LogStream, limit: usize) -> Vec<String> {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .rev()
            .filter(|e| e.stream == stream)
            .take(limit)
            .map(|e| e.line.clone())
            .collect();
        lines.reverse();
        lines
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut buffer = LogBuffer::new(1000);
        for i in 0..1500 {
            buffer.push(LogStream::Stdout, format!("line {}", i));
        }

        assert_eq!(buffer.len(), 1000);
        let lines = buffer.recent(usize::MAX);
        assert_eq!(lines.first().unwrap(), "line 500");
        assert_eq!(lines.last().unwrap(), "line 1499");
    }

    #[test]
    fn test_recent_limit() {
        let mut buffer = LogBuffer::new(10);
        for i in 0..5 {
            buffer.push(LogStream::Stdout, format!("line {}", i));
        }
        assert_eq!(buffer.recent(2), vec!["line 3", "line 4"]);
        assert_eq!(buffer.recent(50).len(), 5);
        assert!(buffer.recent(0).is_empty());
    }

    #[test]
    fn test_recent_from_stream() {
        let mut buffer = LogBuffer::new(10);
        buffer.push(LogStream::Stdout, "out 1");
        buffer.push(LogStream::Stderr, "err 1");
        buffer.push(LogStream::Stdout, "out 2");
        buffer.push(LogStream::Stderr, "err 2");
        buffer.push(LogStream::System, "exited");

        assert_eq!(buffer.recent_from(LogStream::Stderr, 10), vec!["err 1", "err 2"]);
        assert_eq!(buffer.recent_from(LogStream::Stderr, 1), vec!["err 2"]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut buffer = LogBuffer::new(0);
        buffer.push(LogStream::Stdout, "a");
        buffer.push(LogStream::Stdout, "b");
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.recent(10), vec!["b"]);
    }
}
