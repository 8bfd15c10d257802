//! Core types for the RTC synchronization engine
//!
//! This module contains the error taxonomy, the calendar and configuration
//! types shared by the modem protocol, the sync pipeline and the clock driver.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{BusStep, Error, Result};
pub use self::types::{
    CalendarTime,
    NetworkEndpoint,
    SyncConfig,
    Timeouts,
    WifiStatus,
};

/// Well-known time protocol port
pub const NTP_PORT: u16 = 123;

/// Capacity of the modem receive buffer in bytes
pub const RECEIVE_CAPACITY: usize = 512;

/// Size of a time protocol packet in bytes
pub const NTP_PACKET_SIZE: usize = 48;
