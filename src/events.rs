//! The driver's public event surface.
//!
//! Log lines, inbound messages, and ring alerts all fan out through one
//! typed `tokio::sync::broadcast` channel rather than three separate
//! callback registrations, so any number of subscribers can listen without
//! the driver tracking a registration list.

use tracing::Level;

/// Severity of a [`DriverEvent::Log`] line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// A single log line emitted by the engine or orchestrator.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

/// Everything an application can subscribe to via
/// [`crate::driver::IridiumSbd::events`].
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// A diagnostic log line. Also always mirrored through `tracing`.
    Log(LogEvent),
    /// An MT message was read off the modem during a session.
    InboundMessage(Vec<u8>),
    /// An `SBDRING` line arrived — an MT message is waiting at the gateway.
    RingAlert,
}

/// Capacity of the broadcast channel. Events are not expected to pile up
/// faster than a slow subscriber can drain within one session's worth of
/// activity.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;
