//! Synchronization module
//!
//! This module drives the time exchange through the modem and persists the
//! result: `TimeSync` runs one attempt over the candidate servers, and
//! `SyncManager` repeats it on a fixed period.

pub mod manager;
pub mod pipeline;

pub use self::manager::{SyncManager, SyncStats};
pub use self::pipeline::TimeSync;
