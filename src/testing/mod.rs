//! Test doubles for the modem link and the clock chip.
//!
//! Used by the unit tests, the integration tests and the demo; neither double
//! touches real hardware.

mod scripted_modem;
mod simulated_rtc;

pub use self::scripted_modem::{ipd_frame, ntp_reply, ScriptedModem, Transcript};
pub use self::simulated_rtc::SimulatedIsl1208;
