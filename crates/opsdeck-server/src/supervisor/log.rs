use chrono::Utc;
use std::collections::VecDeque;
use std::path::Path;

/// Bounded ring of recent output lines; the oldest line is evicted first.
#[derive(Debug, Clone)]
pub struct LogTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Most recent non-blank line.
    pub fn last(&self) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .map(String::as_str)
            .find(|l| !l.trim().is_empty())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Append one timestamped line to the role's persistent log file.
pub(crate) fn append_log_line(path: &Path, line: &str) -> opsdeck_core::Result<()> {
    let stamped = format!("{} {}\n", Utc::now().to_rfc3339(), line);
    opsdeck_core::io::append_text(path, &stamped)
}
