// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The portal: a separate HTTP process that serves the operator
//! dashboard, relays read-only health data, and forwards operator
//! actions to the agent over the control socket. Holds no mutable
//! camera state of its own.

pub mod api;
pub mod health_client;
pub mod log_tail;
pub mod reload;
pub mod sse;
pub mod state;

pub use api::{build_router, start_server};
pub use state::AppState;
