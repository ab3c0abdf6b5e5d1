//! Typed error surface for the driver.
//!
//! Each distinct failure mode gets its own variant rather than a bare
//! `String`, since this is a published library crate callers need to
//! match on.

use std::fmt;

use crate::session::SbdSessionResult;

/// Everything that can go wrong talking to the modem.
#[derive(Debug, thiserror::Error)]
pub enum IridiumError {
    /// The engine already has an in-flight command.
    #[error("modem is busy with another command")]
    Busy,

    /// The transport is not open.
    #[error("transport is not open")]
    NotOpen,

    /// The command did not complete within its timeout.
    #[error("command timed out")]
    Timeout,

    /// The modem replied with `ERROR` (or a custom error pattern).
    /// Carries whatever response lines had been accumulated before
    /// the error line arrived — may be empty.
    #[error("modem reported an error: {0:?}")]
    CommandError(String),

    /// A session-level failure. Carries the structured result when one
    /// was available, for diagnosis.
    #[error("session failed: {0}")]
    SessionError(SessionError),

    /// The `SBDWB` phase-2 response code was non-zero or unparsable.
    #[error("binary write failed: {0}")]
    BinaryWriteError(BinaryWriteResult),

    /// `unlockDevice` was called with the wrong key.
    #[error("incorrect unlock key")]
    Locked,

    /// `unlockDevice` was called on a permanently locked modem.
    #[error("modem is permanently locked")]
    PermanentlyLocked,

    /// `-MSSTM` reported no network service.
    #[error("no network service available for system time")]
    NoNetworkTime,

    /// The trailing checksum on an `SBDRB` read did not match the payload.
    #[error("checksum mismatch reading MT buffer")]
    ChecksumError,

    /// The transport rejected a write or the connection dropped.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `close()` was called while a command was in flight.
    #[error("driver closed with a command in flight")]
    Aborted,
}

/// Carries context for [`IridiumError::SessionError`].
#[derive(Debug, Clone)]
pub enum SessionError {
    /// `moStatus` came back greater than 4 (MO transfer failed).
    MoFailed(SbdSessionResult),
    /// `mtStatus == 2` (mailbox check error) with `fail_on_mailbox_check_error` set.
    MailboxCheckFailed(SbdSessionResult),
    /// The `+SBDIX`/`+SBDIXA` response line did not have the expected shape.
    MalformedResponse(String),
    /// Clearing the MO buffer after a successful session failed.
    ClearMoBufferFailed(SbdSessionResult),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MoFailed(r) => write!(f, "MO transfer failed (moStatus={})", r.mo_status),
            Self::MailboxCheckFailed(r) => {
                write!(f, "mailbox check error (mtStatus={})", r.mt_status)
            }
            Self::MalformedResponse(s) => write!(f, "malformed session response: {s:?}"),
            Self::ClearMoBufferFailed(r) => write!(
                f,
                "message sent (moStatus={}) but MO buffer clear failed afterwards",
                r.mo_status
            ),
        }
    }
}

/// Result codes for the `SBDWB` phase-2 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryWriteResult {
    /// The modem accepted the buffer and checksum.
    Success,
    /// The modem timed out waiting for the payload.
    Timeout,
    /// The checksum sent did not match the payload.
    ChecksumMismatch,
    /// The declared length was outside `1..=340`.
    SizeOutOfRange,
    /// A code the vendor manual does not document.
    Unknown(u8),
}

impl BinaryWriteResult {
    /// Decode the single leading digit of an `SBDWB` phase-2 response line.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Timeout,
            2 => Self::ChecksumMismatch,
            3 => Self::SizeOutOfRange,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for BinaryWriteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Timeout => write!(f, "timeout during transfer"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::SizeOutOfRange => write!(f, "message size out of range"),
            Self::Unknown(code) => write!(f, "unrecognised result code {code}"),
        }
    }
}

/// Errors surfaced while loading [`crate::config::Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid baud rate {0}: must be nonzero")]
    InvalidBaudRate(u32),
}
