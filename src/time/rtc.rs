//! Register-level driver for the ISL1208 real-time clock.
//!
//! The chip keeps seven BCD time registers followed by a status register.
//! Time registers only accept writes while the status register's WRTC bit is
//! set, so every write is bracketed by setting and clearing that bit. The
//! RTCF bit reports that the oscillator lost power and the stored time is
//! meaningless.

use embedded_hal::i2c::I2c;
use tracing::{debug, warn};

use crate::core::{BusStep, CalendarTime, Error, Result};
use crate::util::{bcd_to_bin, bin_to_bcd};

/// 7-bit bus address of the chip
pub const ISL1208_ADDRESS: u8 = 0x6F;

/// Seconds register, BCD 0-59
pub const REG_SECONDS: u8 = 0x00;
/// Minutes register, BCD 0-59
pub const REG_MINUTES: u8 = 0x01;
/// Hours register with the format and meridiem flags
pub const REG_HOURS: u8 = 0x02;
/// Day of month register, BCD 1-31
pub const REG_DATE: u8 = 0x03;
/// Month register, BCD 1-12
pub const REG_MONTH: u8 = 0x04;
/// Year register, BCD offset from 2000
pub const REG_YEAR: u8 = 0x05;
/// Day of week register, 0-6
pub const REG_WEEKDAY: u8 = 0x06;
/// Status register holding the write-enable and clock-failed bits
pub const REG_STATUS: u8 = 0x07;

/// Hours register: 24-hour format
pub const HOURS_MIL: u8 = 1 << 7;
/// Hours register: PM in 12-hour format
pub const HOURS_PM: u8 = 1 << 5;
/// Status register: time registers writable
pub const STATUS_WRTC: u8 = 1 << 4;
/// Status register: clock failed, time unreliable
pub const STATUS_RTCF: u8 = 1 << 0;

/// Number of time registers
pub const TIME_BLOCK_LEN: usize = 7;

const YEAR_BASE: u16 = 2000;

/// A clock that keeps calendar time across power cycles
pub trait RtcClock {
    /// Stores a calendar time
    fn write_time(&mut self, time: &CalendarTime) -> Result<()>;

    /// Reads the stored calendar time
    fn read_time(&mut self) -> Result<CalendarTime>;
}

/// ISL1208 driver over any two-wire bus
#[derive(Debug)]
pub struct Isl1208<I2C> {
    bus: I2C,
    address: u8,
}

impl<I2C: I2c> Isl1208<I2C> {
    /// Creates a driver at the default address
    pub fn new(bus: I2C) -> Self {
        Self::with_address(bus, ISL1208_ADDRESS)
    }

    /// Creates a driver at a custom address
    pub fn with_address(bus: I2C, address: u8) -> Self {
        Isl1208 { bus, address }
    }

    /// Shared access to the bus
    pub fn bus(&self) -> &I2C {
        &self.bus
    }

    /// Exclusive access to the bus
    pub fn bus_mut(&mut self) -> &mut I2C {
        &mut self.bus
    }

    /// Releases the bus
    pub fn release(self) -> I2C {
        self.bus
    }

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> std::result::Result<(), I2C::Error> {
        self.bus.write_read(self.address, &[reg], buf)
    }

    fn write_regs(&mut self, reg: u8, data: &[u8]) -> std::result::Result<(), I2C::Error> {
        let mut frame = [0u8; TIME_BLOCK_LEN + 2];
        frame[0] = reg;
        frame[1..=data.len()].copy_from_slice(data);
        self.bus.write(self.address, &frame[..=data.len()])
    }

    fn encode(time: &CalendarTime) -> [u8; TIME_BLOCK_LEN] {
        [
            bin_to_bcd(time.second),
            bin_to_bcd(time.minute),
            bin_to_bcd(time.hour) | HOURS_MIL,
            bin_to_bcd(time.day),
            bin_to_bcd(time.month),
            bin_to_bcd((time.year - YEAR_BASE) as u8),
            bin_to_bcd(time.weekday & 0x07),
        ]
    }

    fn decode(regs: &[u8]) -> CalendarTime {
        let hr = regs[usize::from(REG_HOURS)];
        let hour = if hr & HOURS_MIL != 0 {
            bcd_to_bin(hr & 0x3f)
        } else {
            let hour = bcd_to_bin(hr & 0x1f);
            if hr & HOURS_PM != 0 {
                hour + 12
            } else {
                hour
            }
        };

        CalendarTime {
            second: bcd_to_bin(regs[usize::from(REG_SECONDS)]),
            minute: bcd_to_bin(regs[usize::from(REG_MINUTES)]),
            hour,
            day: bcd_to_bin(regs[usize::from(REG_DATE)]),
            month: bcd_to_bin(regs[usize::from(REG_MONTH)]),
            year: YEAR_BASE + u16::from(bcd_to_bin(regs[usize::from(REG_YEAR)])),
            weekday: bcd_to_bin(regs[usize::from(REG_WEEKDAY)]),
        }
    }
}

impl<I2C: I2c> RtcClock for Isl1208<I2C> {
    fn write_time(&mut self, time: &CalendarTime) -> Result<()> {
        time.validate()?;
        let regs = Self::encode(time);

        let mut sr = [0u8; 1];
        self.read_regs(REG_STATUS, &mut sr)
            .map_err(|e| Error::clock_bus(BusStep::StatusRead, e))?;

        let enabled = sr[0] | STATUS_WRTC;
        self.write_regs(REG_STATUS, &[enabled])
            .map_err(|e| Error::clock_bus(BusStep::EnableSet, e))?;

        if let Err(e) = self.write_regs(REG_SECONDS, &regs) {
            // Leave the time registers locked even though the burst failed
            if self.write_regs(REG_STATUS, &[enabled & !STATUS_WRTC]).is_err() {
                warn!("write-enable bit left set after failed time write");
            }
            return Err(Error::clock_bus(BusStep::TimeBlockWrite, e));
        }

        self.write_regs(REG_STATUS, &[enabled & !STATUS_WRTC])
            .map_err(|e| Error::clock_bus(BusStep::EnableClear, e))?;

        debug!(%time, "clock time written");
        Ok(())
    }

    fn read_time(&mut self) -> Result<CalendarTime> {
        let mut regs = [0u8; TIME_BLOCK_LEN + 1];
        self.read_regs(REG_SECONDS, &mut regs)
            .map_err(|e| Error::clock_bus(BusStep::BlockRead, e))?;

        if regs[usize::from(REG_STATUS)] & STATUS_RTCF != 0 {
            warn!("clock reports power failure, stored time is unreliable");
            return Err(Error::ClockUnreliable);
        }

        Ok(Self::decode(&regs))
    }
}
