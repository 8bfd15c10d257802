//! Time conversion and clock storage
//!
//! This module turns time protocol timestamps into local calendar time and
//! stores that time in a battery-backed clock chip:
//!
//! - `calendar`: epoch conversion, UTC offset and Gregorian field split
//! - `rtc`: the `RtcClock` seam and the ISL1208 register driver
//!
//! # Examples
//!
//! ```
//! use rtc_sync::time::{unix_to_calendar, Isl1208, RtcClock};
//! use rtc_sync::testing::SimulatedIsl1208;
//!
//! let mut rtc = Isl1208::new(SimulatedIsl1208::new());
//! let time = unix_to_calendar(1_657_843_200);
//! rtc.write_time(&time).unwrap();
//! assert_eq!(rtc.read_time().unwrap(), time);
//! ```

pub mod calendar;
pub mod rtc;

pub use self::calendar::{
    apply_utc_offset,
    is_leap_year,
    ntp_to_unix,
    packet_to_calendar,
    unix_to_calendar,
    NTP_UNIX_OFFSET,
};
pub use self::rtc::{Isl1208, RtcClock, ISL1208_ADDRESS};
