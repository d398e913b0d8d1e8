// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The periodic update controller and the persistent `UpdateState` it
//! writes, that the agent and portal only ever read.

pub mod controller;
pub mod preflight;
pub mod release;
pub mod state;

pub use controller::{RunOptions, UpdateController};
pub use state::{UpdateState, UpdateStatus};
