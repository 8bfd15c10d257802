use std::fmt;

use crate::core::CalendarTime;

/// State of one synchronization attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No attempt in progress
    Idle,

    /// Opening a channel to a candidate server
    Connecting {
        /// Index into the candidate list
        candidate: usize,
    },

    /// Sending the request packet
    Sending {
        /// Index into the candidate list
        candidate: usize,
    },

    /// Waiting for the reply frame
    AwaitingResponse {
        /// Index into the candidate list
        candidate: usize,
    },

    /// Reply decoded into local calendar time
    Decoded(CalendarTime),

    /// Every candidate failed
    Failed,
}

impl SyncState {
    /// Candidate the attempt is currently working on
    pub fn candidate(&self) -> Option<usize> {
        match self {
            SyncState::Connecting { candidate }
            | SyncState::Sending { candidate }
            | SyncState::AwaitingResponse { candidate } => Some(*candidate),
            _ => None,
        }
    }

    /// Whether the attempt has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Decoded(_) | SyncState::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Connecting { candidate } => write!(f, "connecting[{}]", candidate),
            SyncState::Sending { candidate } => write!(f, "sending[{}]", candidate),
            SyncState::AwaitingResponse { candidate } => write!(f, "awaiting[{}]", candidate),
            SyncState::Decoded(time) => write!(f, "decoded({})", time),
            SyncState::Failed => write!(f, "failed"),
        }
    }
}
