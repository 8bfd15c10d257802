use std::fmt;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{Error, Result};

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Broken-down wall-clock time as kept by the clock chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalendarTime {
    /// Seconds (0-59)
    pub second: u8,
    /// Minutes (0-59)
    pub minute: u8,
    /// Hours (0-23)
    pub hour: u8,
    /// Day of month (1-31)
    pub day: u8,
    /// Month (1-12)
    pub month: u8,
    /// Absolute year
    pub year: u16,
    /// Day of week, 0 = Sunday
    pub weekday: u8,
}

impl CalendarTime {
    /// Checks every field against the range the clock chip can store
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, u16, u16, u16); 7] = [
            ("second", self.second.into(), 0, 59),
            ("minute", self.minute.into(), 0, 59),
            ("hour", self.hour.into(), 0, 23),
            ("day", self.day.into(), 1, 31),
            ("month", self.month.into(), 1, 12),
            ("year", self.year, 2000, 2099),
            ("weekday", self.weekday.into(), 0, 6),
        ];

        for (field, value, min, max) in checks {
            if value < min || value > max {
                return Err(Error::invalid_param(format!(
                    "{} {} outside {}..={}",
                    field, value, min, max
                )));
            }
        }
        Ok(())
    }

    /// English name of the weekday
    pub fn weekday_name(&self) -> &'static str {
        WEEKDAY_NAMES[usize::from(self.weekday % 7)]
    }

    /// Converts to a chrono datetime, `None` if the fields do not name a real date
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year.into(), self.month.into(), self.day.into())?
            .and_hms_opt(self.hour.into(), self.minute.into(), self.second.into())
    }
}

impl fmt::Display for CalendarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// A candidate time server reached through the modem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    /// Host name or address, resolved by the modem
    pub host: String,
    /// UDP port
    pub port: u16,
}

impl NetworkEndpoint {
    /// Creates an endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NetworkEndpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NetworkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Wireless association state of the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Per-command response budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Liveness probe (`AT`)
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub probe: Duration,
    /// Mode and multiplexing setup
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub setup: Duration,
    /// Joining an access point
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub join: Duration,
    /// Opening a channel to a server
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub open: Duration,
    /// Waiting for the data prompt after a send-size command
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub prompt: Duration,
    /// Waiting for the send confirmation
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub confirm: Duration,
    /// Waiting for the time server's reply frame
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub response: Duration,
    /// Closing a channel
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub close: Duration,
    /// Transport shim receive wait
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub recv: Duration,
    /// Pause between failed candidates
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub retry_pause: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            probe: Duration::from_secs(1),
            setup: Duration::from_secs(2),
            join: Duration::from_secs(15),
            open: Duration::from_secs(5),
            prompt: Duration::from_secs(2),
            confirm: Duration::from_secs(5),
            response: Duration::from_secs(10),
            close: Duration::from_secs(1),
            recv: Duration::from_secs(5),
            retry_pause: Duration::from_secs(1),
        }
    }
}

/// Configuration for a synchronization node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Serial device the modem is attached to
    pub device: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Access point name
    pub ssid: String,
    /// Access point passphrase
    pub password: String,
    /// Candidate time servers, tried in order
    pub servers: Vec<NetworkEndpoint>,
    /// Fixed local offset from UTC in hours
    pub utc_offset_hours: i8,
    /// Modem link slot used for the time exchange
    pub link_id: u8,
    /// Response budgets
    pub timeouts: Timeouts,
}

impl SyncConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::config("No time servers configured"));
        }
        if self.servers.iter().any(|s| s.host.is_empty()) {
            return Err(Error::config("Time server host is empty"));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(Error::config(format!(
                "UTC offset {}h out of range",
                self.utc_offset_hours
            )));
        }
        if self.link_id > 4 {
            return Err(Error::config("Link id must be 0-4"));
        }
        Ok(())
    }

    /// Validates the Wi-Fi credentials for joining an access point
    pub fn validate_wifi(&self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(Error::config("SSID is empty"));
        }
        Ok(())
    }

    /// UTC offset in seconds
    pub fn utc_offset_secs(&self) -> i64 {
        i64::from(self.utc_offset_hours) * 3600
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            ssid: String::new(),
            password: String::new(),
            servers: vec![
                NetworkEndpoint::new("pool.ntp.org", super::NTP_PORT),
                NetworkEndpoint::new("ntp.aliyun.com", super::NTP_PORT),
                NetworkEndpoint::new("cn.pool.ntp.org", super::NTP_PORT),
            ],
            utc_offset_hours: 8,
            link_id: 0,
            timeouts: Timeouts::default(),
        }
    }
}
