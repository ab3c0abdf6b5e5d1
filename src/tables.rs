//! Reference tables: MO status codes, detach error codes, lock/ring status.
//!
//! Typed enums with `Display` so the catalog returns meaningful values
//! instead of raw integers the caller has to look up in the vendor manual
//! themselves.

use std::fmt;

/// Result of a Mobile-Originated transfer attempt, from `+SBDIX`/`+SBDIXA`.
///
/// `0..=4` are success codes (`moStatus <= 4` means MO success); everything
/// else is a failure, per the 9602/9603 vendor manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoStatus(pub u8);

impl MoStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        self.0 <= 4
    }

    #[must_use]
    pub fn text(self) -> &'static str {
        match self.0 {
            0 => "MO message transferred successfully",
            1 => "MO message transferred successfully, more MT messages to send",
            2 => "MO message transferred successfully, but SIM card MO buffer still full",
            3 => "MO message transferred successfully, but MTMSN queue full at gateway",
            4 => "MO message transferred successfully, but could not queue MT message",
            5 => "reserved, unknown failure",
            10 => "GSS reported that the call did not complete in the allowed time",
            11 => "MO message queue at the gateway is full",
            12 => "MO message has too many segments",
            13 => "GSS reported that the session did not complete",
            14 => "invalid segment size",
            15 => "access is denied",
            16 => "ISU has been locked and may not make SBD calls",
            17 => "gateway not responding (Iridium network congestion)",
            18 => "connection lost (RF drop)",
            19 => "link failure (no network acknowledgment of packets sent)",
            32 => "no network service, unable to initiate call",
            33 => "antenna fault, unable to initiate call",
            34 => "radio is disabled, unable to initiate call (satellite simulator)",
            35 => "ISU is busy, unable to initiate call",
            36 => "try later, must wait 3 minutes since last registration or session",
            37 => "SBD service is temporarily disabled",
            38 => "try later, traffic management period",
            64 => "band violation (satellite simulator only)",
            65 => "PLL lock failure; hardware error during attempted transmit",
            _ => "unrecognised moStatus code",
        }
    }
}

impl fmt::Display for MoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.text())
    }
}

/// Result of a Mobile-Terminated delivery attempt, also from `+SBDIX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtStatus(pub u8);

impl MtStatus {
    /// `mtStatus == 1`: an MT message has just been delivered to the MT
    /// buffer and must be read before the next session.
    #[must_use]
    pub fn delivered(self) -> bool {
        self.0 == 1
    }

    /// `mtStatus == 2`: mailbox check error. Treated as advisory
    /// (warn-only) by default; see [`crate::session::SessionOptions::fail_on_mailbox_check_error`].
    #[must_use]
    pub fn mailbox_check_error(self) -> bool {
        self.0 == 2
    }

    #[must_use]
    pub fn text(self) -> &'static str {
        match self.0 {
            0 => "no SBD message to receive from the GSS",
            1 => "SBD message successfully received from the GSS",
            2 => "an error occurred while attempting to perform a mailbox check or receive a message",
            _ => "unrecognised mtStatus code",
        }
    }
}

impl fmt::Display for MtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.text())
    }
}

/// `AT+CULK` lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    Locked,
    PermanentlyLocked,
}

impl LockStatus {
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unlocked),
            1 => Some(Self::Locked),
            2 => Some(Self::PermanentlyLocked),
            _ => None,
        }
    }
}

/// `AT+CRIS` ring indication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingIndicationStatus {
    None,
    RingReceived,
}

impl RingIndicationStatus {
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::RingReceived),
            _ => None,
        }
    }
}

/// `+SBDDET` non-zero error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachError(pub u8);

impl DetachError {
    #[must_use]
    pub fn text(self) -> &'static str {
        match self.0 {
            0 => "no error",
            1 => "unable to detach, SBD session in progress",
            2 => "unable to detach, modem not registered",
            _ => "unrecognised detach error code",
        }
    }
}

impl fmt::Display for DetachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mo_status_success_boundary() {
        assert!(MoStatus(4).is_success());
        assert!(!MoStatus(5).is_success());
    }

    #[test]
    fn mt_status_delivered_only_on_one() {
        assert!(MtStatus(1).delivered());
        assert!(!MtStatus(0).delivered());
        assert!(!MtStatus(2).delivered());
        assert!(MtStatus(2).mailbox_check_error());
    }

    #[test]
    fn lock_status_from_code() {
        assert_eq!(LockStatus::from_code(0), Some(LockStatus::Unlocked));
        assert_eq!(LockStatus::from_code(2), Some(LockStatus::PermanentlyLocked));
        assert_eq!(LockStatus::from_code(9), None);
    }

    #[test]
    fn every_documented_mo_status_has_text() {
        for code in [0, 1, 2, 3, 4, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 32, 33, 34, 35, 36, 37, 38, 64, 65] {
            assert_ne!(MoStatus(code).text(), "unrecognised moStatus code");
        }
    }
}
