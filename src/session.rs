//! The SBD session orchestrator: `writeBinary`'s two-phase `SBDWB`
//! protocol, `waitForNetwork`, and the full `sendTextMessage`/
//! `sendBinaryMessage` pipeline.
//!
//! This is the one layer above the catalog that issues more than one AT
//! command per call, composing catalog methods into the multi-step
//! sequences a satellite session actually needs.

use std::time::Duration;

use regex::Regex;
use tokio::sync::broadcast;

use crate::catalog::DEFAULT_TIMEOUT;
use crate::codec::TextCodec;
use crate::descriptor::{error_pattern, CommandDescriptor, Payload, NO_TIMEOUT};
use crate::engine::{checksum16, EngineHandle};
use crate::error::{BinaryWriteResult, IridiumError, SessionError};
use crate::events::{DriverEvent, LogEvent, LogLevel};
use crate::tables::{MoStatus, MtStatus};

/// Largest MO/MT payload the 9602/9603 will carry in one session.
pub const MAX_SBD_PAYLOAD_LEN: usize = 340;

/// Tunables for [`send_text_message`]/[`send_binary_message`]/
/// [`mailbox_check`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Minimum `+CIEV:0,N` signal quality `wait_for_network` accepts before
    /// initiating a session. Default `1`.
    pub signal_quality: u8,
    /// Run outbound text through [`TextCodec::compress`] before writing it.
    pub compressed: bool,
    /// Timeout applied to `wait_for_network`, the `SBDIXA` session, and the
    /// `SBDRB` MT read. `None` waits indefinitely, matching the vendor
    /// modem's own behaviour for these steps.
    pub timeout: Option<Duration>,
    /// Treat `mtStatus == 2` (mailbox check error) as a hard failure
    /// instead of a warning. Off by default because the vendor manual
    /// documents it as advisory, not fatal.
    pub fail_on_mailbox_check_error: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            signal_quality: 1,
            compressed: false,
            timeout: None,
            fail_on_mailbox_check_error: false,
        }
    }
}

/// Decoded `+SBDIX`/`+SBDIXA` session result.
///
/// `moStatusText`/`mtStatusText` are not stored redundantly — call
/// [`SbdSessionResult::mo_status_text`]/[`mt_status_text`] instead, since
/// [`MoStatus`]/[`MtStatus`] already carry the vendor-table text.
#[derive(Debug, Clone, Copy)]
pub struct SbdSessionResult {
    pub mo_status: MoStatus,
    pub mo_msn: i32,
    pub mt_status: MtStatus,
    pub mt_msn: i32,
    pub mt_length: i32,
    pub mt_queued: i32,
}

impl SbdSessionResult {
    #[must_use]
    pub fn mo_status_text(&self) -> &'static str {
        self.mo_status.text()
    }

    #[must_use]
    pub fn mt_status_text(&self) -> &'static str {
        self.mt_status.text()
    }
}

/// Run the `SBDWB` two-phase write: announce the payload length, wait for
/// `READY`, then send `payload ++ checksum` with no timeout — the modem
/// itself bounds this step, not the host.
pub async fn write_binary(engine: &EngineHandle, payload: &[u8]) -> Result<(), IridiumError> {
    if payload.is_empty() || payload.len() > MAX_SBD_PAYLOAD_LEN {
        return Err(IridiumError::BinaryWriteError(
            BinaryWriteResult::SizeOutOfRange,
        ));
    }

    let ready_pattern = Regex::new(r"^READY$").expect("static pattern is valid");
    let announce = CommandDescriptor::simple(format!("AT+SBDWB={}", payload.len()), DEFAULT_TIMEOUT)
        .with_success_pattern(ready_pattern);
    engine.execute(announce).await?;

    let checksum = checksum16(payload);
    let mut wire = Vec::with_capacity(payload.len() + 2);
    wire.extend_from_slice(payload);
    wire.extend_from_slice(&checksum.to_be_bytes());

    let digit_pattern = Regex::new(r"^\d$").expect("static pattern is valid");
    let write = CommandDescriptor {
        payload: Payload::Bytes(wire),
        description: "SBDWB payload".to_string(),
        timeout: NO_TIMEOUT,
        success_pattern: digit_pattern.clone(),
        error_pattern: error_pattern(),
        buffer_pattern: Some(digit_pattern),
    };
    let response = engine.execute(write).await?;
    let code: u8 = response.trim().parse().map_err(|_| {
        IridiumError::CommandError(format!("unparsable SBDWB result: {response:?}"))
    })?;
    let result = BinaryWriteResult::from_code(code);
    if result.is_success() {
        Ok(())
    } else {
        Err(IridiumError::BinaryWriteError(result))
    }
}

/// Subscribe to `+CIEV` signal-quality indicators and wait for one at or
/// above `min_signal`. `timeout` of `None` waits indefinitely.
///
/// On success, a follow-up `indicatorEventReportingDisable` is issued and
/// awaited before returning. On failure (most importantly, the caller's
/// explicit `timeout` expiring) indicator reporting is deliberately left
/// *enabled* — the caller is responsible for disabling it on its own error
/// path, per the vendor driver's documented behaviour for this call.
pub async fn wait_for_network(
    engine: &EngineHandle,
    min_signal: u8,
    timeout: Option<Duration>,
) -> Result<(), IridiumError> {
    engine
        .indicator_event_reporting_enable_signal(Some(DEFAULT_TIMEOUT))
        .await?;

    let min_signal = min_signal.min(5);
    let pattern = Regex::new(&format!(r"^\+CIEV:0,[{min_signal}-5]$"))
        .expect("bounded digit class is always a valid pattern");
    let listen = CommandDescriptor::wait_for("waitForNetwork", pattern, timeout);
    engine.execute(listen).await?;

    engine
        .indicator_event_reporting_disable(Some(DEFAULT_TIMEOUT))
        .await
}

async fn initiate_session(
    engine: &EngineHandle,
    timeout: Option<Duration>,
) -> Result<SbdSessionResult, IridiumError> {
    let pattern = Regex::new(r"^\+SBDIX:").expect("static pattern is valid");
    let descriptor = CommandDescriptor::with_buffer(
        "AT+SBDIXA",
        timeout.unwrap_or(Duration::from_secs(60)),
        pattern,
    );
    let response = engine.execute(descriptor).await?;
    parse_sbdix_response(&response)
}

/// Parse a `+SBDIX: <moStatus>,<moMsn>,<mtStatus>,<mtMsn>,<mtLength>,<mtQueued>`
/// line into a [`SbdSessionResult`].
fn parse_sbdix_response(response: &str) -> Result<SbdSessionResult, IridiumError> {
    let malformed = || IridiumError::SessionError(SessionError::MalformedResponse(response.to_string()));

    let line = response
        .lines()
        .find(|l| l.trim_start().starts_with("+SBDIX"))
        .ok_or_else(malformed)?;
    let data = line.split_once(':').map(|(_, v)| v).ok_or_else(malformed)?;
    let fields: Vec<i32> = data
        .split(',')
        .map(|s| s.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;
    if fields.len() < 6 {
        return Err(malformed());
    }

    Ok(SbdSessionResult {
        mo_status: MoStatus(fields[0] as u8),
        mo_msn: fields[1],
        mt_status: MtStatus(fields[2] as u8),
        mt_msn: fields[3],
        mt_length: fields[4],
        mt_queued: fields[5],
    })
}

fn emit_warning(events_tx: &broadcast::Sender<DriverEvent>, message: String) {
    tracing::warn!("{message}");
    let _ = events_tx.send(DriverEvent::Log(LogEvent {
        level: LogLevel::Warn,
        message,
    }));
}

/// Which write/read half of the catalog a session pipeline run should use.
/// The MO write goes out via `SBDWT=<text>` *or* the binary two-phase
/// protocol depending on the call (`send_text_message` vs
/// `send_binary_message`); any MT reply is read back in the same form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionVariant {
    Text,
    Binary,
}

async fn read_mt_message(
    engine: &EngineHandle,
    variant: SessionVariant,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, IridiumError> {
    match variant {
        SessionVariant::Binary => engine.read_binary_buffer(timeout).await,
        SessionVariant::Text => Ok(engine.text_read(timeout).await?.into_bytes()),
    }
}

/// Shared body of [`send_text_message`]/[`send_binary_message`], run after
/// the MO payload has already been written: wait for network → initiate
/// session → interpret result → read and clear the MT buffer if one was
/// delivered → unconditionally clear the MO buffer.
async fn run_session(
    engine: &EngineHandle,
    events_tx: &broadcast::Sender<DriverEvent>,
    variant: SessionVariant,
    options: &SessionOptions,
) -> Result<SbdSessionResult, IridiumError> {
    wait_for_network(engine, options.signal_quality, options.timeout).await?;
    let result = initiate_session(engine, options.timeout).await?;

    if !result.mo_status.is_success() {
        let _ = engine.clear_mo_buffer(Some(DEFAULT_TIMEOUT)).await;
        return Err(IridiumError::SessionError(SessionError::MoFailed(result)));
    }

    if result.mt_status.mailbox_check_error() {
        if options.fail_on_mailbox_check_error {
            let _ = engine.clear_mo_buffer(Some(DEFAULT_TIMEOUT)).await;
            return Err(IridiumError::SessionError(SessionError::MailboxCheckFailed(
                result,
            )));
        }
        emit_warning(
            events_tx,
            format!("mailbox check error (mtStatus={})", result.mt_status),
        );
    }

    if result.mt_status.delivered() {
        match read_mt_message(engine, variant, options.timeout).await {
            Ok(bytes) => {
                let _ = events_tx.send(DriverEvent::InboundMessage(bytes));
                // Host code must clear the MT buffer after reading it, or
                // the next session replays the same mtStatus==1.
                let _ = engine.clear_mt_buffer(Some(DEFAULT_TIMEOUT)).await;
            }
            Err(e) => {
                let _ = engine.clear_mo_buffer(Some(DEFAULT_TIMEOUT)).await;
                return Err(e);
            }
        }
    }

    engine
        .clear_mo_buffer(Some(DEFAULT_TIMEOUT))
        .await
        .map_err(|_| IridiumError::SessionError(SessionError::ClearMoBufferFailed(result)))?;

    Ok(result)
}

/// Full `sendBinaryMessage` pipeline: the two-phase `SBDWB` write followed
/// by [`run_session`]'s shared wait/session/read/clear steps.
pub async fn send_binary_message(
    engine: &EngineHandle,
    events_tx: &broadcast::Sender<DriverEvent>,
    payload: &[u8],
    options: &SessionOptions,
) -> Result<SbdSessionResult, IridiumError> {
    write_binary(engine, payload).await?;
    run_session(engine, events_tx, SessionVariant::Binary, options).await
}

/// Compress (if requested), write via `SBDWT`, then run the shared
/// pipeline reading any MT reply back as text via `SBDRT`.
pub async fn send_text_message(
    engine: &EngineHandle,
    events_tx: &broadcast::Sender<DriverEvent>,
    codec: &dyn TextCodec,
    text: &str,
    options: &SessionOptions,
) -> Result<SbdSessionResult, IridiumError> {
    let wire_text = if options.compressed {
        // The compressed bytes are re-interpreted as text; the codec is
        // responsible for producing a representation `SBDWT` can carry
        // (e.g. a hex or base-N encoding of the compressed bytes).
        String::from_utf8_lossy(&codec.compress(text)).into_owned()
    } else {
        text.to_string()
    };
    engine
        .text_write(&wire_text, Some(DEFAULT_TIMEOUT))
        .await?;
    run_session(engine, events_tx, SessionVariant::Text, options).await
}

/// Trigger a session with an empty MO payload purely to check the
/// mailbox for a pending MT message. Compression is meaningless for an
/// empty string, so it is always disabled here regardless of `options`.
pub async fn mailbox_check(
    engine: &EngineHandle,
    events_tx: &broadcast::Sender<DriverEvent>,
    codec: &dyn TextCodec,
    options: &SessionOptions,
) -> Result<SbdSessionResult, IridiumError> {
    let options = SessionOptions {
        compressed: false,
        ..options.clone()
    };
    send_text_message(engine, events_tx, codec, "", &options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sbdix_response() {
        let result = parse_sbdix_response("+SBDIX: 0, 12, 1, 7, 25, 0\r\nOK").unwrap();
        assert_eq!(result.mo_status, MoStatus(0));
        assert_eq!(result.mo_msn, 12);
        assert_eq!(result.mt_status, MtStatus(1));
        assert_eq!(result.mt_msn, 7);
        assert_eq!(result.mt_length, 25);
        assert_eq!(result.mt_queued, 0);
        assert!(result.mt_status.delivered());
    }

    #[test]
    fn rejects_malformed_sbdix_response() {
        assert!(matches!(
            parse_sbdix_response("garbage"),
            Err(IridiumError::SessionError(SessionError::MalformedResponse(_)))
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_payload() {
        // The length guard short-circuits before any I/O, so a transport
        // that is never actually driven is fine here.
        let (host, _modem) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(host);
        let transport =
            crate::transport::LineTransport::new(r, w, crate::transport::DEFAULT_MAX_LINE_LENGTH);
        let (events_tx, _events_rx) = broadcast::channel(4);
        let (handle, _join) = crate::engine::spawn(transport, events_tx);

        let oversized = vec![0u8; MAX_SBD_PAYLOAD_LEN + 1];
        let result = write_binary(&handle, &oversized).await;
        assert!(matches!(
            result,
            Err(IridiumError::BinaryWriteError(BinaryWriteResult::SizeOutOfRange))
        ));
    }
}
