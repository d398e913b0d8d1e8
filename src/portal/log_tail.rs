// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Rotation-robust log tailing for the `log` SSE event and `/api/logs`.
//!
//! Every poll compares `(dev, ino)` against what was last observed and
//! reopens from byte 0 on a mismatch, so a rotate-and-rename is picked
//! up automatically; a same-inode shrink (`copytruncate`) is caught
//! separately by comparing the new length against the last read
//! position. Neither case needs operator intervention.

use std::io::{Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SaiCamError};

pub struct LogTailer {
    path: PathBuf,
    dev_ino: Option<(u64, u64)>,
    pos: u64,
    carry: String,
}

impl LogTailer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            dev_ino: None,
            pos: 0,
            carry: String::new(),
        }
    }

    /// Return any complete lines appended since the last poll. Blocking
    /// file IO; callers run this inside `spawn_blocking`.
    pub fn poll(&mut self) -> Result<Vec<String>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SaiCamError::Io(e)),
        };

        let meta = file.metadata().map_err(SaiCamError::Io)?;
        let current = (meta.dev(), meta.ino());

        let mut file = file;
        if self.dev_ino != Some(current) {
            self.dev_ino = Some(current);
            self.pos = 0;
            self.carry.clear();
        }

        if meta.len() < self.pos {
            // Truncated in place (log rotation's `copytruncate` mode).
            self.pos = 0;
            self.carry.clear();
        }

        file.seek(SeekFrom::Start(self.pos)).map_err(SaiCamError::Io)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf).map_err(SaiCamError::Io)?;
        self.pos = meta.len();

        if buf.is_empty() {
            return Ok(Vec::new());
        }

        self.carry.push_str(&buf);
        let mut lines = Vec::new();
        while let Some(idx) = self.carry.find('\n') {
            lines.push(self.carry[..idx].to_string());
            self.carry.drain(..=idx);
        }
        Ok(lines)
    }
}

/// One-shot read of the last `n` lines, for `/api/logs?lines=N`.
pub fn tail_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SaiCamError::Io(e)),
    };
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_returns_only_new_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let mut tailer = LogTailer::new(path.clone());
        let first = tailer.poll().unwrap();
        assert_eq!(first, vec!["line one", "line two"]);

        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        std::fs::write(&path, "line one\nline two\nline three\n").unwrap();
        let second = tailer.poll().unwrap();
        assert_eq!(second, vec!["line three"]);
    }

    #[test]
    fn poll_handles_rotation_by_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        std::fs::write(&path, "before rotation\n").unwrap();

        let mut tailer = LogTailer::new(path.clone());
        assert_eq!(tailer.poll().unwrap(), vec!["before rotation"]);

        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, "after rotation\n").unwrap();
        assert_eq!(tailer.poll().unwrap(), vec!["after rotation"]);
    }

    #[test]
    fn tail_lines_returns_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        std::fs::write(&path, "a\nb\nc\nd\n").unwrap();
        assert_eq!(tail_lines(&path, 2).unwrap(), vec!["c", "d"]);
    }
}
