//! The AT command engine: single in-flight command, response buffering,
//! unsolicited-line classification, and timeout resolution.
//!
//! One dedicated task owns the transport and the in-flight slot; callers
//! submit a [`CommandDescriptor`] through an `mpsc`/`oneshot` request/reply
//! pair and get a future back. Commands that arrive while one is already in
//! flight queue up (bounded) instead of being rejected outright, and the
//! scattered command/resolve/timeout/buffer state of a naive translation is
//! collapsed into one `SlotState` variant.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::descriptor::{ring_alert_pattern, CommandDescriptor, Payload};
use crate::error::IridiumError;
use crate::events::{DriverEvent, LogEvent, LogLevel};
use crate::transport::LineTransport;

/// Bound on queued-but-not-yet-started commands, to keep memory use under a
/// runaway caller predictable.
pub const ENGINE_QUEUE_CAPACITY: usize = 32;

/// What a submitted [`EngineRequest`] actually wants done.
///
/// Almost everything is a text [`AtCommand`](EngineJob::AtCommand) dispatched
/// through the line-oriented `SlotState::InFlight` machinery below. `SBDRB`
/// is the one exception in the catalog: its response is a raw, length-
/// prefixed binary buffer rather than a CRLF-delimited line, so it is
/// handled as its own job variant that runs the exchange inline against
/// [`LineTransport::read_exact_raw`] instead of waiting on `next_line`.
enum EngineJob {
    AtCommand(CommandDescriptor),
    ReadBinaryBuffer { timeout: Option<Duration> },
}

/// What a completed [`EngineRequest`] resolves to.
enum EngineOutcome {
    Text(String),
    Bytes(Vec<u8>),
}

struct EngineRequest {
    job: EngineJob,
    reply: oneshot::Sender<Result<EngineOutcome, IridiumError>>,
}

struct InFlightCommand {
    descriptor: CommandDescriptor,
    reply: oneshot::Sender<Result<EngineOutcome, IridiumError>>,
    response: String,
    outbound_echo: Option<String>,
    deadline: Option<Instant>,
}

enum SlotState {
    Idle,
    InFlight(InFlightCommand),
}

impl SlotState {
    fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Idle => None,
            Self::InFlight(cmd) => cmd.deadline,
        }
    }
}

/// Cloneable handle used by the catalog and orchestrator to submit commands.
///
/// Cloning just clones the `mpsc::Sender` — every clone talks to the same
/// single I/O owner task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Submit `descriptor` and await its resolution.
    ///
    /// Fails immediately with [`IridiumError::Busy`] if the queue is at
    /// capacity, or [`IridiumError::NotOpen`] if the engine task has shut
    /// down.
    pub async fn execute(&self, descriptor: CommandDescriptor) -> Result<String, IridiumError> {
        match self.submit(EngineJob::AtCommand(descriptor)).await? {
            EngineOutcome::Text(text) => Ok(text),
            EngineOutcome::Bytes(_) => Err(IridiumError::Aborted),
        }
    }

    /// Run the `SBDRB` exchange: write the command, read the raw
    /// length-prefixed payload, verify its trailing checksum, and consume
    /// the closing `OK` line. `timeout` of `None` waits indefinitely — this
    /// step is bounded by the modem, not the host.
    pub async fn read_binary_buffer(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, IridiumError> {
        match self.submit(EngineJob::ReadBinaryBuffer { timeout }).await? {
            EngineOutcome::Bytes(bytes) => Ok(bytes),
            EngineOutcome::Text(_) => Err(IridiumError::Aborted),
        }
    }

    async fn submit(&self, job: EngineJob) -> Result<EngineOutcome, IridiumError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .try_send(EngineRequest { job, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => IridiumError::Busy,
                mpsc::error::TrySendError::Closed(_) => IridiumError::NotOpen,
            })?;
        reply_rx.await.map_err(|_| IridiumError::Aborted)?
    }
}

/// Spawn the engine's I/O-owning task over `transport` and return a handle
/// plus its `JoinHandle`. Dropping every [`EngineHandle`] clone shuts the
/// task down.
pub fn spawn<R, W>(
    transport: LineTransport<R, W>,
    events_tx: broadcast::Sender<DriverEvent>,
) -> (EngineHandle, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(ENGINE_QUEUE_CAPACITY);
    let join = tokio::spawn(run(transport, rx, events_tx));
    (EngineHandle { tx }, join)
}

fn emit_log(events_tx: &broadcast::Sender<DriverEvent>, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    match level {
        LogLevel::Debug => debug!("{message}"),
        LogLevel::Warn => warn!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
    let _ = events_tx.send(DriverEvent::Log(LogEvent { level, message }));
}

async fn run<R, W>(
    mut transport: LineTransport<R, W>,
    mut rx: mpsc::Receiver<EngineRequest>,
    events_tx: broadcast::Sender<DriverEvent>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut slot = SlotState::Idle;
    let mut queue: VecDeque<EngineRequest> = VecDeque::new();

    loop {
        let deadline = slot.deadline();
        let sleep_until = deadline.unwrap_or_else(|| Instant::now() + std::time::Duration::from_secs(3600));

        tokio::select! {
            biased;

            maybe_req = rx.recv() => {
                let Some(req) = maybe_req else {
                    // Every handle dropped: abort anything in flight and exit.
                    fail_everything(&mut slot, &mut queue, IridiumError::Aborted);
                    return;
                };
                // Queueing first then draining keeps FIFO order intact even
                // when a job (e.g. ReadBinaryBuffer) resolves synchronously
                // and leaves the slot Idle again within the same await.
                queue.push_back(req);
                if matches!(slot, SlotState::Idle) {
                    slot = promote_next(&mut transport, &mut queue, &events_tx).await;
                }
            }

            line = transport.next_line() => {
                match line {
                    None => {
                        emit_log(&events_tx, LogLevel::Error, "transport closed");
                        fail_everything(&mut slot, &mut queue, IridiumError::Io(
                            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "transport closed"),
                        ));
                        return;
                    }
                    Some(Err(e)) => {
                        emit_log(&events_tx, LogLevel::Error, format!("transport read error: {e}"));
                        if let SlotState::InFlight(cmd) = std::mem::replace(&mut slot, SlotState::Idle) {
                            let _ = cmd.reply.send(Err(IridiumError::Io(e)));
                        }
                        slot = promote_next(&mut transport, &mut queue, &events_tx).await;
                    }
                    Some(Ok(line)) => {
                        slot = handle_line(&mut transport, slot, &mut queue, &line, &events_tx).await;
                    }
                }
            }

            () = tokio::time::sleep_until(sleep_until.into()), if deadline.is_some() => {
                if let SlotState::InFlight(cmd) = std::mem::replace(&mut slot, SlotState::Idle) {
                    emit_log(&events_tx, LogLevel::Warn, format!("command timed out: {}", cmd.descriptor.description));
                    let _ = cmd.reply.send(Err(IridiumError::Timeout));
                }
                slot = promote_next(&mut transport, &mut queue, &events_tx).await;
            }
        }
    }
}

fn fail_everything(slot: &mut SlotState, queue: &mut VecDeque<EngineRequest>, err: IridiumError) {
    if let SlotState::InFlight(cmd) = std::mem::replace(slot, SlotState::Idle) {
        let _ = cmd.reply.send(Err(clone_error(&err)));
    }
    while let Some(req) = queue.pop_front() {
        let _ = req.reply.send(Err(clone_error(&err)));
    }
}

/// [`IridiumError`] is not `Clone` (it wraps `std::io::Error`); build a
/// fresh equivalent for each waiting caller instead.
fn clone_error(err: &IridiumError) -> IridiumError {
    match err {
        IridiumError::Aborted => IridiumError::Aborted,
        IridiumError::Io(e) => IridiumError::Io(std::io::Error::new(e.kind(), e.to_string())),
        other => IridiumError::Io(std::io::Error::other(other.to_string())),
    }
}

/// Dispatch one queued [`EngineRequest`] to its job handler.
async fn start_job<R, W>(
    transport: &mut LineTransport<R, W>,
    req: EngineRequest,
    events_tx: &broadcast::Sender<DriverEvent>,
) -> SlotState
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match req.job {
        EngineJob::AtCommand(descriptor) => {
            start_command(transport, descriptor, req.reply, events_tx).await
        }
        EngineJob::ReadBinaryBuffer { timeout } => {
            emit_log(events_tx, LogLevel::Debug, "-> AT+SBDRB");
            let result = read_binary_buffer(transport, timeout).await;
            let _ = req.reply.send(result.map(EngineOutcome::Bytes));
            SlotState::Idle
        }
    }
}

async fn start_command<R, W>(
    transport: &mut LineTransport<R, W>,
    descriptor: CommandDescriptor,
    reply: oneshot::Sender<Result<EngineOutcome, IridiumError>>,
    events_tx: &broadcast::Sender<DriverEvent>,
) -> SlotState
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    emit_log(
        events_tx,
        LogLevel::Debug,
        format!("-> {}", descriptor.description),
    );

    let outbound_echo = match &descriptor.payload {
        Payload::Text(text) => {
            if let Err(e) = transport.write_line(text).await {
                let _ = reply.send(Err(IridiumError::Io(e)));
                return SlotState::Idle;
            }
            Some(text.clone())
        }
        Payload::Bytes(bytes) => {
            if let Err(e) = transport.write_bytes(bytes).await {
                let _ = reply.send(Err(IridiumError::Io(e)));
                return SlotState::Idle;
            }
            None
        }
        Payload::None => None,
    };

    let deadline = descriptor.timeout.map(|d| Instant::now() + d);
    SlotState::InFlight(InFlightCommand {
        descriptor,
        reply,
        response: String::new(),
        outbound_echo,
        deadline,
    })
}

/// Pop and start queued requests until one is left genuinely in flight
/// (awaiting a line) or the queue runs dry. A job that resolves inline
/// (`ReadBinaryBuffer`, or an `AtCommand` whose initial write failed)
/// would otherwise strand everything queued behind it until the next
/// unrelated event woke the select loop.
async fn promote_next<R, W>(
    transport: &mut LineTransport<R, W>,
    queue: &mut VecDeque<EngineRequest>,
    events_tx: &broadcast::Sender<DriverEvent>,
) -> SlotState
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(req) = queue.pop_front() {
        match start_job(transport, req, events_tx).await {
            SlotState::Idle => continue,
            in_flight => return in_flight,
        }
    }
    SlotState::Idle
}

/// Byte-sum checksum (lower 16 bits of the sum, mod 2^16) appended to the
/// `SBDWB`/`SBDRB` wire payload.
pub(crate) fn checksum16(bytes: &[u8]) -> u16 {
    let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
    (sum & 0xFFFF) as u16
}

/// Run the full `SBDRB` exchange against `transport`: write the command,
/// read the 2-byte big-endian length prefix, the payload, and the 2-byte
/// checksum, then verify it. The trailing `OK` line is drained by the
/// caller via `next_line` once this returns successfully.
async fn read_binary_buffer<R, W>(
    transport: &mut LineTransport<R, W>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, IridiumError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let exchange = async {
        transport.write_line("AT+SBDRB").await?;
        let len_bytes = transport.read_exact_raw(2).await?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let payload = transport.read_exact_raw(len).await?;
        let checksum_bytes = transport.read_exact_raw(2).await?;
        Ok::<_, std::io::Error>((payload, checksum_bytes))
    };

    let (payload, checksum_bytes) = match timeout {
        Some(d) => tokio::time::timeout(d, exchange)
            .await
            .map_err(|_| IridiumError::Timeout)?
            .map_err(IridiumError::Io)?,
        None => exchange.await.map_err(IridiumError::Io)?,
    };

    let expected = u16::from_be_bytes([checksum_bytes[0], checksum_bytes[1]]);
    if checksum16(&payload) != expected {
        return Err(IridiumError::ChecksumError);
    }

    match transport.next_line().await {
        Some(Ok(line)) if line == "OK" => Ok(payload),
        Some(Ok(other)) => Err(IridiumError::CommandError(other)),
        Some(Err(e)) => Err(IridiumError::Io(e)),
        None => Err(IridiumError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "transport closed",
        ))),
    }
}

/// Classify and dispatch one inbound line: ring alert, then error, then
/// buffer-append, then success — in that order.
async fn handle_line<R, W>(
    transport: &mut LineTransport<R, W>,
    mut slot: SlotState,
    queue: &mut VecDeque<EngineRequest>,
    line: &str,
    events_tx: &broadcast::Sender<DriverEvent>,
) -> SlotState
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // (a) Ring alerts are unsolicited and never disturb the slot, even if
    // a command's own buffer pattern would otherwise have matched this
    // exact text.
    if ring_alert_pattern().is_match(line) {
        let _ = events_tx.send(DriverEvent::RingAlert);
        return slot;
    }

    let SlotState::InFlight(mut cmd) = slot else {
        emit_log(
            events_tx,
            LogLevel::Warn,
            format!("no command in flight, discarding line: {line:?}"),
        );
        return SlotState::Idle;
    };

    // (c) error pattern, evaluated before buffering/success: a line that
    // matches both an error and a buffer/success pattern is treated as an
    // error, never both.
    if cmd.descriptor.error_pattern.is_match(line) {
        let _ = cmd.reply.send(Err(IridiumError::CommandError(cmd.response)));
        return promote_next(transport, queue, events_tx).await;
    }

    // (d) buffer append, skipping a byte-for-byte echo of the outbound text.
    let is_echo = cmd.outbound_echo.as_deref() == Some(line);
    if !is_echo {
        if let Some(pattern) = &cmd.descriptor.buffer_pattern {
            if pattern.is_match(line) {
                if !cmd.response.is_empty() {
                    cmd.response.push('\n');
                }
                cmd.response.push_str(line);
            }
        }
    }

    // (e) success pattern — a line may match both buffer and success; it
    // is appended above and terminates the command here.
    if cmd.descriptor.success_pattern.is_match(line) {
        let response = cmd.response.clone();
        let _ = cmd.reply.send(Ok(EngineOutcome::Text(response)));
        return promote_next(transport, queue, events_tx).await;
    }

    slot = SlotState::InFlight(cmd);
    slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ok_pattern;
    use regex::Regex;
    use std::time::Duration;
    use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};

    fn setup() -> (
        EngineHandle,
        tokio::io::DuplexStream,
        broadcast::Receiver<DriverEvent>,
        JoinHandle<()>,
    ) {
        let (host, modem) = duplex(4096);
        let (r, w) = split(host);
        let transport = LineTransport::new(r, w, crate::transport::DEFAULT_MAX_LINE_LENGTH);
        let (events_tx, events_rx) = broadcast::channel(16);
        let (handle, join) = spawn(transport, events_tx);
        (handle, modem, events_rx, join)
    }

    #[tokio::test]
    async fn simple_ok_command_resolves_empty() {
        let (handle, mut modem, _events, _join) = setup();
        let fut = handle.execute(CommandDescriptor::simple("ATE0", Duration::from_secs(1)));
        let mut buf = [0u8; 16];
        let n = modem.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ATE0\r\n");
        modem.write_all(b"OK\r\n").await.unwrap();
        assert_eq!(fut.await.unwrap(), "");
    }

    #[tokio::test]
    async fn error_line_surfaces_command_error() {
        let (handle, mut modem, _events, _join) = setup();
        let fut = handle.execute(CommandDescriptor::simple("ATZ9", Duration::from_secs(1)));
        let mut buf = [0u8; 16];
        modem.read(&mut buf).await.unwrap();
        modem.write_all(b"ERROR\r\n").await.unwrap();
        match fut.await {
            Err(IridiumError::CommandError(body)) => assert_eq!(body, ""),
            other => panic!("expected CommandError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn buffered_response_excludes_echo() {
        let (handle, mut modem, _events, _join) = setup();
        let pattern = Regex::new(r"^\+CSQ:\d$").unwrap();
        let fut = handle.execute(CommandDescriptor::with_buffer(
            "AT+CSQ",
            Duration::from_secs(1),
            pattern,
        ));
        let mut buf = [0u8; 16];
        modem.read(&mut buf).await.unwrap();
        modem.write_all(b"+CSQ:4\r\nOK\r\n").await.unwrap();
        assert_eq!(fut.await.unwrap(), "+CSQ:4");
    }

    #[tokio::test]
    async fn timeout_fires_without_response() {
        let (handle, _modem, _events, _join) = setup();
        let fut = handle.execute(CommandDescriptor::simple(
            "AT+SBDIX",
            Duration::from_millis(20),
        ));
        assert!(matches!(fut.await, Err(IridiumError::Timeout)));
    }

    #[tokio::test]
    async fn ring_alert_does_not_complete_in_flight_command() {
        let (handle, mut modem, mut events, _join) = setup();
        let fut = handle.execute(CommandDescriptor::simple("AT", Duration::from_secs(1)));
        modem.read(&mut [0u8; 16]).await.unwrap();
        modem.write_all(b"SBDRING\r\n").await.unwrap();
        modem.write_all(b"OK\r\n").await.unwrap();

        assert_eq!(fut.await.unwrap(), "");
        let mut saw_ring = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, DriverEvent::RingAlert) {
                saw_ring = true;
            }
        }
        assert!(saw_ring);
    }

    #[tokio::test]
    async fn busy_queues_instead_of_rejecting() {
        let (handle, mut modem, _events, _join) = setup();
        let first = handle.execute(CommandDescriptor::simple("AT+A", Duration::from_secs(1)));
        let second = handle.execute(CommandDescriptor::simple("AT+B", Duration::from_secs(1)));

        let mut buf = [0u8; 16];
        let n = modem.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT+A\r\n");
        modem.write_all(b"OK\r\n").await.unwrap();
        assert_eq!(first.await.unwrap(), "");

        let n = modem.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT+B\r\n");
        modem.write_all(b"OK\r\n").await.unwrap();
        assert_eq!(second.await.unwrap(), "");
    }

    #[tokio::test]
    async fn read_binary_buffer_returns_payload_after_checksum_matches() {
        let (handle, mut modem, _events, _join) = setup();
        let fut = handle.read_binary_buffer(Some(Duration::from_secs(1)));

        let mut buf = [0u8; 16];
        let n = modem.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT+SBDRB\r\n");

        // length = 3, payload = "ABC" (0x41+0x42+0x43 = 0xC6), then OK.
        modem
            .write_all(b"\x00\x03ABC\x00\xC6OK\r\n")
            .await
            .unwrap();
        assert_eq!(fut.await.unwrap(), b"ABC");
    }

    #[tokio::test]
    async fn read_binary_buffer_rejects_checksum_mismatch() {
        let (handle, mut modem, _events, _join) = setup();
        let fut = handle.read_binary_buffer(Some(Duration::from_secs(1)));

        modem.read(&mut [0u8; 16]).await.unwrap();
        modem
            .write_all(b"\x00\x03ABC\x00\x00OK\r\n")
            .await
            .unwrap();
        assert!(matches!(fut.await, Err(IridiumError::ChecksumError)));
    }

    #[tokio::test]
    async fn read_binary_buffer_queues_behind_an_in_flight_command() {
        let (handle, mut modem, _events, _join) = setup();
        let first = handle.execute(CommandDescriptor::simple("AT+A", Duration::from_secs(1)));
        let second = handle.read_binary_buffer(Some(Duration::from_secs(1)));

        let mut buf = [0u8; 16];
        let n = modem.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT+A\r\n");
        modem.write_all(b"OK\r\n").await.unwrap();
        assert_eq!(first.await.unwrap(), "");

        let n = modem.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT+SBDRB\r\n");
        modem
            .write_all(b"\x00\x01X\x00\x58OK\r\n")
            .await
            .unwrap();
        assert_eq!(second.await.unwrap(), b"X");
    }

    #[test]
    fn checksum16_wraps_mod_2_16() {
        assert_eq!(checksum16(b"ABC"), 0x00C6);
        assert_eq!(checksum16(&[0xFF; 300]), ((0xFFu32 * 300) & 0xFFFF) as u16);
    }

    #[test]
    fn ok_pattern_matches_bare_ok() {
        assert!(ok_pattern().is_match("OK"));
        assert!(!ok_pattern().is_match("OK "));
    }
}
