// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

pub mod child_process;
pub mod clock;
pub mod config;
pub mod error;
pub mod file_mover;
pub mod frame;
pub mod frame_consumer;
pub mod http_api;
pub mod log_ring;
pub mod pipeline;
pub mod segment_tracker;
pub mod space_enforcer;
pub mod supervisor;
