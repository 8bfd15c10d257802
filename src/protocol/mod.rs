//! Protocol implementation module
//!
//! This module defines the modem command dialect, the byte framer that turns
//! the receive stream into terminator and frame events, the embedded binary
//! frame decoder, the time protocol packet and the sync state machine.

pub mod codec;
pub mod framer;
pub mod message;
pub mod state;

pub use self::codec::{AtCodec, AtCommand, IpdCodec, IpdFrame};
pub use self::framer::{Framer, ResponseEvent};
pub use self::message::NtpPacket;
pub use self::state::SyncState;

/// Command executed successfully
pub const TOKEN_OK: &str = "OK";
/// Command rejected
pub const TOKEN_ERROR: &str = "ERROR";
/// Command failed (e.g. access point join)
pub const TOKEN_FAIL: &str = "FAIL";
/// Payload accepted by the modem
pub const TOKEN_SEND_OK: &str = "SEND OK";
/// Modem is ready to take raw payload bytes
pub const TOKEN_PROMPT: &str = ">";
/// Peer closed the link
pub const TOKEN_CLOSED: &str = "CLOSED";
/// Link status report for an established connection
pub const TOKEN_STATUS_CONNECTED: &str = "STATUS:3";
/// Prefix announcing an embedded binary frame
pub const IPD_PREFIX: &str = "+IPD,";

/// Whole-line form of [`TOKEN_OK`]; status tokens only count on a line of their own
pub const LINE_OK: &str = "\r\nOK\r\n";
/// Whole-line form of [`TOKEN_ERROR`]
pub const LINE_ERROR: &str = "\r\nERROR\r\n";
/// Whole-line form of [`TOKEN_FAIL`]
pub const LINE_FAIL: &str = "\r\nFAIL\r\n";

/// Lines that always end an exchange in failure
pub const ERROR_LINES: [&str; 2] = [LINE_ERROR, LINE_FAIL];

/// Outcome an exchange is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Plain command acknowledgement
    Ok,
    /// Data prompt after a send-size command
    Prompt,
    /// Confirmation after raw payload bytes
    SendOk,
}

impl Expect {
    /// Token that signals this outcome on the wire
    pub fn token(&self) -> &'static str {
        match self {
            Expect::Ok => TOKEN_OK,
            Expect::Prompt => TOKEN_PROMPT,
            Expect::SendOk => TOKEN_SEND_OK,
        }
    }

    /// Bytes that end the exchange on the wire
    pub fn terminator(&self) -> &'static str {
        match self {
            Expect::Ok => LINE_OK,
            Expect::Prompt => TOKEN_PROMPT,
            Expect::SendOk => TOKEN_SEND_OK,
        }
    }

    /// Candidate set scanned by the framer, the expected terminator first
    pub fn candidates(&self) -> [&'static str; 3] {
        [self.terminator(), ERROR_LINES[0], ERROR_LINES[1]]
    }
}
