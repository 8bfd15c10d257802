use std::fmt;
use std::io;
use thiserror::Error;

/// Step of a clock-register access that failed on the two-wire bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStep {
    /// Reading the status register before a write
    StatusRead,
    /// Writing the status register with the write-enable bit set
    EnableSet,
    /// Burst write of the seven time registers
    TimeBlockWrite,
    /// Writing the status register with the write-enable bit cleared
    EnableClear,
    /// Burst read of the time registers and status register
    BlockRead,
}

impl fmt::Display for BusStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusStep::StatusRead => "status read",
            BusStep::EnableSet => "write-enable set",
            BusStep::TimeBlockWrite => "time block write",
            BusStep::EnableClear => "write-enable clear",
            BusStep::BlockRead => "time block read",
        };
        f.write_str(name)
    }
}

/// Custom error types for RTC synchronization
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Transport timeout waiting for {0}")]
    TransportTimeout(String),

    #[error("Transport protocol error: {0}")]
    TransportProtocol(String),

    #[error("Malformed frame: {0}")]
    FrameMalformed(String),

    #[error("Frame did not complete before the deadline")]
    FrameTimeout,

    #[error("Peer closed the link")]
    PeerClosed,

    #[error("Clock reports lost time, stored value is unreliable")]
    ClockUnreliable,

    #[error("Clock bus error during {step}: {kind:?}")]
    ClockBus {
        /// Register access step that failed
        step: BusStep,
        /// Bus level failure reported by the driver
        kind: embedded_hal::i2c::ErrorKind,
    },

    #[error("All time servers exhausted")]
    AllServersExhausted,

    #[error("WiFi is not connected")]
    WifiNotConnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new transport timeout error
    pub fn transport_timeout(waiting_for: impl Into<String>) -> Self {
        Error::TransportTimeout(waiting_for.into())
    }

    /// Creates a new transport protocol error
    pub fn transport_protocol(msg: impl Into<String>) -> Self {
        Error::TransportProtocol(msg.into())
    }

    /// Creates a new malformed frame error
    pub fn frame_malformed(msg: impl Into<String>) -> Self {
        Error::FrameMalformed(msg.into())
    }

    /// Creates a new clock bus error from any `embedded-hal` bus error
    pub fn clock_bus<E: embedded_hal::i2c::Error>(step: BusStep, err: E) -> Self {
        Error::ClockBus {
            step,
            kind: err.kind(),
        }
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid parameter error
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParam(msg.into())
    }

    /// Whether the error came from the modem link rather than the clock chip
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::TransportTimeout(_)
                | Error::TransportProtocol(_)
                | Error::FrameMalformed(_)
                | Error::FrameTimeout
                | Error::PeerClosed
                | Error::Serial(_)
        )
    }
}
