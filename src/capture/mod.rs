// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Capture coordination: one worker per camera, supervised and retried.

pub mod command;
pub mod coordinator;
pub mod retry;
pub mod worker;

pub use command::CameraCommand;
pub use coordinator::CaptureCoordinator;
