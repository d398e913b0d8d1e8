// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera state tracker: a small state machine consulted before
//! every scheduled capture and updated after every attempt.
//!
//! Two-failure tolerance before declaring OFFLINE absorbs transient
//! network loss without flapping; the capped exponential backoff keeps
//! log noise bounded while guaranteeing a dead camera is retried at
//! least every 12x its capture interval.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    Healthy,
    Failing,
    Offline,
}

const BACKOFF_CAP: u32 = 12;

/// Tracks health and backoff for a single camera. Owned and mutated only
/// by that camera's worker; the health monitor reads a cheap snapshot
/// copy, never the live tracker.
#[derive(Debug, Clone)]
pub struct CameraStateTracker {
    state: CameraState,
    consecutive_failures: u32,
    multiplier: u32,
    capture_interval: Duration,
    next_attempt: Instant,
    last_success: Option<Instant>,
    last_error: Option<String>,
}

/// A point-in-time copy safe to hand to the health monitor without
/// holding any lock on the live tracker.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackerSnapshot {
    pub state: CameraState,
    pub consecutive_failures: u32,
    pub multiplier: u32,
    pub last_success_age_secs: Option<u64>,
    pub last_error: Option<String>,
}

impl CameraStateTracker {
    pub fn new(capture_interval: Duration) -> Self {
        Self {
            state: CameraState::Healthy,
            consecutive_failures: 0,
            multiplier: 1,
            capture_interval,
            next_attempt: Instant::now(),
            last_success: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True iff the current time is at or past the next scheduled
    /// attempt.
    pub fn should_attempt_capture(&self) -> bool {
        Instant::now() >= self.next_attempt
    }

    pub fn record_success(&mut self) {
        self.state = CameraState::Healthy;
        self.consecutive_failures = 0;
        self.multiplier = 1;
        self.last_success = Some(Instant::now());
        self.last_error = None;
        self.next_attempt = Instant::now() + self.capture_interval;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_error = Some(error.into());

        self.state = match self.state {
            CameraState::Healthy => CameraState::Failing,
            CameraState::Failing if self.consecutive_failures >= 3 => CameraState::Offline,
            other => other,
        };

        if self.state == CameraState::Offline {
            self.multiplier = (self.multiplier * 2).min(BACKOFF_CAP);
        }

        self.next_attempt = Instant::now() + self.capture_interval * self.multiplier;
    }

    /// True once the tracker has decided reconnection (not just another
    /// capture attempt) is warranted — i.e. the camera has gone OFFLINE.
    pub fn reconnect_warranted(&self) -> bool {
        self.state == CameraState::Offline
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            multiplier: self.multiplier,
            last_success_age_secs: self.last_success.map(|t| t.elapsed().as_secs()),
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> CameraStateTracker {
        CameraStateTracker::new(Duration::from_millis(1))
    }

    #[test]
    fn starts_healthy() {
        let t = tracker();
        assert_eq!(t.state(), CameraState::Healthy);
        assert_eq!(t.multiplier(), 1);
    }

    #[test]
    fn three_failures_reach_offline() {
        let mut t = tracker();
        t.record_failure("e1");
        assert_eq!(t.state(), CameraState::Failing);
        t.record_failure("e2");
        assert_eq!(t.state(), CameraState::Failing);
        t.record_failure("e3");
        assert_eq!(t.state(), CameraState::Offline);
    }

    #[test]
    fn multiplier_only_grows_while_offline() {
        let mut t = tracker();
        t.record_failure("e1");
        assert_eq!(t.multiplier(), 1);
        t.record_failure("e2");
        assert_eq!(t.multiplier(), 1);
        t.record_failure("e3"); // -> OFFLINE
        assert_eq!(t.multiplier(), 2);
        t.record_failure("e4");
        assert_eq!(t.multiplier(), 4);
        t.record_failure("e5");
        assert_eq!(t.multiplier(), 8);
        t.record_failure("e6");
        assert_eq!(t.multiplier(), 12);
        t.record_failure("e7");
        assert_eq!(t.multiplier(), 12, "multiplier caps at 12");
    }

    #[test]
    fn multiplier_always_in_allowed_set_while_offline() {
        let mut t = tracker();
        for i in 0..10 {
            t.record_failure(format!("e{i}"));
            if t.state() == CameraState::Offline {
                assert!([1, 2, 4, 8, 12].contains(&t.multiplier()));
            }
        }
    }

    #[test]
    fn success_resets_everything() {
        let mut t = tracker();
        t.record_failure("e1");
        t.record_failure("e2");
        t.record_failure("e3");
        assert_eq!(t.state(), CameraState::Offline);
        t.record_success();
        assert_eq!(t.state(), CameraState::Healthy);
        assert_eq!(t.multiplier(), 1);
        assert_eq!(t.consecutive_failures(), 0);
    }

    #[test]
    fn reconnect_only_warranted_once_offline() {
        let mut t = tracker();
        assert!(!t.reconnect_warranted());
        t.record_failure("e1");
        assert!(!t.reconnect_warranted());
        t.record_failure("e2");
        assert!(!t.reconnect_warranted());
        t.record_failure("e3");
        assert!(t.reconnect_warranted());
    }

    #[test]
    fn should_attempt_capture_respects_backoff() {
        let mut t = CameraStateTracker::new(Duration::from_secs(60));
        assert!(t.should_attempt_capture(), "fresh tracker is immediately due");
        t.record_failure("e1");
        t.record_failure("e2");
        t.record_failure("e3"); // offline, multiplier=2, next_attempt = now + 120s
        assert!(!t.should_attempt_capture());
    }

    #[test]
    fn record_success_is_not_due_again_until_capture_interval_elapses() {
        let mut t = CameraStateTracker::new(Duration::from_millis(200));
        t.record_success();
        assert!(
            !t.should_attempt_capture(),
            "a healthy camera must wait a full capture_interval before its next attempt, \
             not be due again on the very next poll tick"
        );
        std::thread::sleep(Duration::from_millis(250));
        assert!(t.should_attempt_capture());
    }
}
