//! Conversion of time protocol timestamps into calendar time.

use crate::core::CalendarTime;
use crate::protocol::NtpPacket;

/// Seconds between the 1900 protocol epoch and the 1970 Unix epoch
pub const NTP_UNIX_OFFSET: u32 = 2_208_988_800;

/// First year of the Unix epoch
pub const EPOCH_YEAR: u32 = 1970;

/// Weekday of 1970-01-01 (Thursday, 0 = Sunday)
pub const EPOCH_WEEKDAY: u64 = 4;

const SECS_PER_DAY: u64 = 86_400;
const DAYS_PER_400_YEARS: u64 = 146_097;
const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Gregorian leap year rule
pub fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_year(year: u32) -> u64 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

/// Converts a 64-bit protocol timestamp into Unix seconds.
///
/// Only the integer-seconds half is used. The subtraction wraps in 32 bits,
/// which keeps timestamps from the era starting in 2036 mapping forward.
pub fn ntp_to_unix(ntp_timestamp: u64) -> u64 {
    let seconds = (ntp_timestamp >> 32) as u32;
    u64::from(seconds.wrapping_sub(NTP_UNIX_OFFSET))
}

/// Shifts Unix seconds by a fixed UTC offset, clamping at the epoch
pub fn apply_utc_offset(unix: u64, offset_secs: i64) -> u64 {
    let shifted = i128::from(unix) + i128::from(offset_secs);
    u64::try_from(shifted.max(0)).unwrap_or(u64::MAX)
}

/// Splits Unix seconds into calendar fields
pub fn unix_to_calendar(unix: u64) -> CalendarTime {
    let total_days = unix / SECS_PER_DAY;
    let secs_of_day = unix % SECS_PER_DAY;

    let mut days = total_days;
    let mut year = EPOCH_YEAR;

    // Whole 400-year cycles have a fixed length
    let cycles = days / DAYS_PER_400_YEARS;
    days %= DAYS_PER_400_YEARS;
    year = year.saturating_add(u32::try_from(cycles.saturating_mul(400)).unwrap_or(u32::MAX));

    while days >= days_in_year(year) {
        days -= days_in_year(year);
        year += 1;
    }

    let mut month_lengths = DAYS_IN_MONTH;
    if is_leap_year(year) {
        month_lengths[1] = 29;
    }

    let mut month = 0;
    while days >= month_lengths[month] {
        days -= month_lengths[month];
        month += 1;
    }

    CalendarTime {
        second: (secs_of_day % 60) as u8,
        minute: ((secs_of_day % 3600) / 60) as u8,
        hour: (secs_of_day / 3600) as u8,
        day: (days + 1) as u8,
        month: (month + 1) as u8,
        year: u16::try_from(year).unwrap_or(u16::MAX),
        weekday: ((total_days + EPOCH_WEEKDAY) % 7) as u8,
    }
}

/// Local calendar time carried by a server reply
pub fn packet_to_calendar(packet: &NtpPacket, utc_offset_secs: i64) -> CalendarTime {
    let unix = ntp_to_unix(packet.transmit_timestamp);
    unix_to_calendar(apply_utc_offset(unix, utc_offset_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rand::Rng;

    fn reply_with_seconds(seconds: u32) -> NtpPacket {
        let mut data = [0u8; 48];
        data[0] = 0x24;
        data[40..44].copy_from_slice(&seconds.to_be_bytes());
        NtpPacket::decode(&data).unwrap()
    }

    #[test]
    fn test_known_vector() {
        // 2022-07-15 00:00:00 UTC
        let packet = reply_with_seconds(0xE67B_2C80);
        assert_eq!(ntp_to_unix(packet.transmit_timestamp), 1_657_843_200);

        let time = packet_to_calendar(&packet, 0);
        assert_eq!(
            time,
            CalendarTime {
                second: 0,
                minute: 0,
                hour: 0,
                day: 15,
                month: 7,
                year: 2022,
                weekday: 5,
            }
        );
    }

    #[test]
    fn test_utc_offset() {
        let packet = reply_with_seconds(0xE67B_2C80);
        let time = packet_to_calendar(&packet, 8 * 3600);
        assert_eq!((time.day, time.hour), (15, 8));

        let time = packet_to_calendar(&packet, -3600);
        assert_eq!((time.day, time.hour, time.weekday), (14, 23, 4));
    }

    #[test]
    fn test_epoch_start() {
        let time = packet_to_calendar(&reply_with_seconds(NTP_UNIX_OFFSET), 0);
        assert_eq!((time.year, time.month, time.day), (1970, 1, 1));
        assert_eq!(u64::from(time.weekday), EPOCH_WEEKDAY);
        assert_eq!(time.weekday_name(), "Thursday");
    }

    #[test]
    fn test_leap_day_boundary() {
        // Day 59 of 2024 (leap) and of 2023 (common)
        let leap = unix_to_calendar(1_704_067_200 + 59 * SECS_PER_DAY);
        assert_eq!((leap.month, leap.day), (2, 29));

        let common = unix_to_calendar(1_672_531_200 + 59 * SECS_PER_DAY);
        assert_eq!((common.month, common.day), (3, 1));
    }

    #[test]
    fn test_century_rules() {
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(2100));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2023));
    }

    #[test]
    fn test_era_rollover() {
        // Seconds field wraps to zero on 2036-02-07 06:28:16 UTC
        let time = packet_to_calendar(&reply_with_seconds(0), 0);
        assert_eq!(time.to_string(), "2036-02-07 06:28:16");
    }

    #[test]
    fn test_offset_clamps_at_epoch() {
        assert_eq!(apply_utc_offset(100, -3600), 0);
        assert_eq!(apply_utc_offset(100, 3600), 3700);
    }

    #[test]
    fn test_matches_chrono() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let unix: u64 = rng.gen_range(946_684_800..4_102_444_800);
            let ours = unix_to_calendar(unix);
            let reference = chrono::DateTime::from_timestamp(unix as i64, 0)
                .unwrap()
                .naive_utc();

            assert_eq!(u32::from(ours.second), reference.second());
            assert_eq!(u32::from(ours.minute), reference.minute());
            assert_eq!(u32::from(ours.hour), reference.hour());
            assert_eq!(u32::from(ours.day), reference.day());
            assert_eq!(u32::from(ours.month), reference.month());
            assert_eq!(i32::from(ours.year), reference.year());
            assert_eq!(
                u32::from(ours.weekday),
                reference.weekday().num_days_from_sunday()
            );
            assert_eq!(ours.to_naive(), Some(reference));
        }
    }
}
