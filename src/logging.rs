// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Log rate limiting.
//!
//! Repeated identical messages from one source are collapsed to "N more
//! occurrences in the last M seconds" after the first emission. This
//! exists specifically so a flapping camera or a racing cleanup pass
//! can't dominate disk I/O with log spam — the historical Python
//! implementation emitted hundreds of megabytes/day of error logs when
//! cleanup raced with its own prior deletions. Cleanup-of-missing-file
//! is silenced to `debug` at the call site rather than routed through
//! the deduper, since it should never reach `warn`/`error` at all.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

struct Entry {
    first_seen: Instant,
    suppressed: u64,
}

/// Collapses repeated identical messages keyed by an arbitrary source
/// string (e.g. `"camera:cam1:capture_failed"`).
pub struct LogDeduper {
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl LogDeduper {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Call at the point you would otherwise log `message`. Returns
    /// `true` if the caller should actually emit the log line now.
    /// When it returns `false`, the occurrence has been counted silently
    /// and will surface as a summary once the window expires.
    pub fn should_emit(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.first_seen) < self.window => {
                entry.suppressed += 1;
                false
            }
            Some(entry) => {
                let suppressed = entry.suppressed;
                if suppressed > 0 {
                    warn!(
                        key,
                        suppressed, "{} more occurrences in the last {:?}", suppressed, self.window
                    );
                }
                entry.first_seen = now;
                entry.suppressed = 0;
                true
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        first_seen: now,
                        suppressed: 0,
                    },
                );
                true
            }
        }
    }
}

impl Default for LogDeduper {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_always_emits() {
        let d = LogDeduper::new(Duration::from_secs(60));
        assert!(d.should_emit("auth_failed"));
    }

    #[test]
    fn repeated_occurrence_within_window_is_suppressed() {
        let d = LogDeduper::new(Duration::from_secs(60));
        assert!(d.should_emit("auth_failed"));
        assert!(!d.should_emit("auth_failed"));
        assert!(!d.should_emit("auth_failed"));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let d = LogDeduper::new(Duration::from_secs(60));
        assert!(d.should_emit("camera:a"));
        assert!(d.should_emit("camera:b"));
    }
}
