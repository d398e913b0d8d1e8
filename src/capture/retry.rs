// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Retry supervisor for cameras that failed initial setup.
//!
//! A camera that never came up at startup (bad config, device not yet
//! plugged in, network not yet routed) is retried here on linear
//! backoff, separately from the per-camera worker loop that handles
//! post-setup reconnection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CameraSpec;
use crate::error::Result;

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Repeatedly calls `try_setup` until it produces a ready value or
/// `cancel` fires, backing off linearly (capped) between attempts.
/// Returns `None` only on cancellation.
pub async fn retry_until_ready<F, Fut, T>(
    spec: &CameraSpec,
    cancel: &CancellationToken,
    mut try_setup: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return None;
        }

        attempt += 1;
        match try_setup().await {
            Ok(value) => {
                info!(camera = spec.id, attempt, "initial setup succeeded");
                return Some(value);
            }
            Err(e) => {
                warn!(
                    camera = spec.id,
                    attempt,
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "initial setup failed, will retry"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => return None,
                }
                backoff = (backoff + INITIAL_BACKOFF).min(MAX_BACKOFF);
            }
        }
    }
}
