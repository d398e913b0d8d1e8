// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Tiered `/api/events` SSE stream: `health` ticks fast and is the only
//! one the dashboard needs for a live "is it working" view, `status`
//! and `slow` carry data that barely changes, and `log` pushes new
//! log lines as they're written. Splitting the tiers keeps the common
//! case (watching a health snapshot blink green) cheap while still
//! giving the dashboard everything it needs on a single connection.
//! The client is expected to reconnect with backoff; every reconnect
//! gets a fresh snapshot on each tier rather than a resumed cursor.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;

use crate::portal::health_client;
use crate::portal::log_tail::LogTailer;
use crate::portal::state::AppState;
use crate::update::UpdateState;

const HEALTH_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_INTERVAL: Duration = Duration::from_secs(20);
const SLOW_INTERVAL: Duration = Duration::from_secs(500);
const LOG_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = build_stream(state);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn build_stream(state: Arc<AppState>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        let mut health_tick = tokio::time::interval(HEALTH_INTERVAL);
        let mut status_tick = tokio::time::interval(STATUS_INTERVAL);
        let mut slow_tick = tokio::time::interval(SLOW_INTERVAL);
        let mut log_tick = tokio::time::interval(LOG_POLL_INTERVAL);
        let mut tailer = LogTailer::new(state.log_path.clone());
        let mut last_health_json: Option<String> = None;

        loop {
            tokio::select! {
                _ = health_tick.tick() => {
                    match health_client::full(&state.health_socket).await {
                        Ok(snapshot) => {
                            let payload = serde_json::to_string(&snapshot).unwrap_or_default();
                            if last_health_json.as_deref() != Some(payload.as_str()) {
                                last_health_json = Some(payload.clone());
                                yield Ok(Event::default().event("health").data(payload));
                            }
                        }
                        Err(e) => {
                            yield Ok(Event::default().event("health").data(
                                json!({ "error": e.to_string() }).to_string(),
                            ));
                        }
                    }
                }
                _ = status_tick.tick() => {
                    let network = state.config.read().network.clone();
                    let update = UpdateState::load_or_init(
                        &state.update_state_path,
                        state.version,
                        state.config.read().updates.channel,
                    ).ok();
                    let payload = json!({ "network": network, "update": update }).to_string();
                    yield Ok(Event::default().event("status").data(payload));
                }
                _ = slow_tick.tick() => {
                    let root = state.storage_root.clone();
                    let totals = tokio::task::spawn_blocking(move || directory_size(&root)).await.unwrap_or(0);
                    let payload = json!({ "storage_bytes": totals }).to_string();
                    yield Ok(Event::default().event("slow").data(payload));
                }
                _ = log_tick.tick() => {
                    if let Ok(lines) = tailer.poll() {
                        for line in lines {
                            yield Ok(Event::default().event("log").data(line));
                        }
                    }
                }
            }
        }
    }
}

fn directory_size(dir: &std::path::Path) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&d) else { continue };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}
