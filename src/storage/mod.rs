// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! On-disk image storage: layout, the storage manager (store / mark
//! uploaded / cleanup), and the upload queue rehydrated from disk.

pub mod layout;
pub mod manager;
pub mod queue;

pub use layout::{CapturedImage, Metadata, PendingRef, UploadStatus};
pub use manager::StorageManager;
pub use queue::UploadQueue;
