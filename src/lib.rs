//! RTC sync: hardware clock synchronization over a serial Wi-Fi modem
//!
//! This library drives a time protocol exchange through a modem that only
//! speaks line-oriented AT commands, slices the binary reply out of the
//! modem's text stream, converts it to local calendar time and stores it in
//! an ISL1208 real-time clock over an `embedded-hal` two-wire bus.
pub mod core;
pub mod network;
pub mod protocol;
pub mod sync;
pub mod testing;
pub mod time;
pub mod util;

// Re-export commonly used items
pub use core::{CalendarTime, Error, Result, SyncConfig, WifiStatus};
pub use network::{Modem, SerialPortLink, StreamTransport, Transceiver, TransportShim};
pub use sync::{SyncManager, TimeSync};
pub use time::{Isl1208, RtcClock};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
