//! The public driver handle: owns the engine task and event channel, runs
//! the boot sequence, and exposes the session pipeline.
//!
//! `IridiumSbd::new`/`with_codec` spawn the I/O owner as its own task and
//! hand back a cheaply-cloneable handle; this handle also owns the
//! `broadcast::Sender<DriverEvent>` the session pipeline publishes to.

use std::ops::Deref;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::codec::{IdentityCodec, TextCodec};
use crate::engine::{self, EngineHandle};
use crate::error::IridiumError;
use crate::events::{DriverEvent, EVENT_CHANNEL_CAPACITY};
use crate::session::{self, SbdSessionResult, SessionOptions};
use crate::transport::LineTransport;

/// A host-side driver for one Iridium 9602/9603 transceiver.
///
/// Derefs to [`EngineHandle`] so the single-shot catalog commands in
/// [`crate::catalog`] (`signal_quality`, `sbd_status`, `detach`, ...) can
/// be called directly on the driver; the multi-step session pipeline is
/// implemented here instead, since it also needs the event channel and
/// text codec the bare engine handle doesn't carry.
pub struct IridiumSbd {
    engine: EngineHandle,
    events_tx: broadcast::Sender<DriverEvent>,
    codec: Box<dyn TextCodec + Send + Sync>,
    join: JoinHandle<()>,
}

impl Deref for IridiumSbd {
    type Target = EngineHandle;

    fn deref(&self) -> &EngineHandle {
        &self.engine
    }
}

impl IridiumSbd {
    /// Spawn the engine over an already-open transport, using
    /// [`IdentityCodec`] for compressed text. Use [`IridiumSbd::with_codec`]
    /// to plug in a real Unishox2-style compressor.
    pub fn new<R, W>(transport: LineTransport<R, W>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_codec(transport, IdentityCodec)
    }

    /// Spawn the engine with an explicit [`TextCodec`].
    pub fn with_codec<R, W, C>(transport: LineTransport<R, W>, codec: C) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        C: TextCodec + Send + Sync + 'static,
    {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (engine, join) = engine::spawn(transport, events_tx.clone());
        Self {
            engine,
            events_tx,
            codec: Box::new(codec),
            join,
        }
    }

    /// Subscribe to the driver's event stream (log lines, inbound
    /// messages, ring alerts). Each subscriber gets every event published
    /// from the moment it subscribes onward.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<DriverEvent> {
        self.events_tx.subscribe()
    }

    /// Run the modem boot sequence: disable RTS/CTS flow control, disable
    /// echo, disable indicator event reporting, clear both buffers, enable
    /// automatic registration, enable ring alerts, then read ring-indication
    /// status. Fails fast on the first error — a half-configured modem is
    /// surfaced immediately rather than limped along with defaults.
    pub async fn init(&self) -> Result<(), IridiumError> {
        self.engine.flow_control_disable(None).await?;
        self.engine.echo_off(None).await?;
        self.engine.indicator_event_reporting_disable(None).await?;
        self.engine.clear_both_buffers(None).await?;
        self.engine.registration_auto_enable(None).await?;
        self.engine.ring_alert_enable(None).await?;
        self.engine.ring_indication_status(None).await?;
        Ok(())
    }

    /// Run the full text-send pipeline: optional compression, `SBDWT`,
    /// wait-for-network, `SBDIXA`, and MT buffer read/clear.
    pub async fn send_text_message(
        &self,
        text: &str,
        options: &SessionOptions,
    ) -> Result<SbdSessionResult, IridiumError> {
        session::send_text_message(&self.engine, &self.events_tx, self.codec.as_ref(), text, options)
            .await
    }

    /// Same pipeline as [`IridiumSbd::send_text_message`], skipping the
    /// text/compression step for a caller-supplied binary payload.
    pub async fn send_binary_message(
        &self,
        payload: &[u8],
        options: &SessionOptions,
    ) -> Result<SbdSessionResult, IridiumError> {
        session::send_binary_message(&self.engine, &self.events_tx, payload, options).await
    }

    /// Trigger a session with an empty MO payload purely to collect any
    /// MT message waiting at the gateway.
    pub async fn mailbox_check(
        &self,
        options: &SessionOptions,
    ) -> Result<SbdSessionResult, IridiumError> {
        session::mailbox_check(&self.engine, &self.events_tx, self.codec.as_ref(), options).await
    }

    /// `waitForNetwork` on its own, for callers that want to gate on
    /// signal quality without immediately sending.
    pub async fn wait_for_network(
        &self,
        min_signal: u8,
        timeout: Option<Duration>,
    ) -> Result<(), IridiumError> {
        session::wait_for_network(&self.engine, min_signal, timeout).await
    }

    /// Shut the engine task down and wait for it to exit. Any command in
    /// flight resolves to [`IridiumError::Aborted`] first.
    pub async fn close(self) {
        drop(self.engine);
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DEFAULT_MAX_LINE_LENGTH;
    use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};

    fn setup() -> (IridiumSbd, tokio::io::DuplexStream) {
        let (host, modem) = duplex(4096);
        let (r, w) = split(host);
        let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
        (IridiumSbd::new(transport), modem)
    }

    #[tokio::test]
    async fn init_runs_boot_sequence_in_order() {
        let (driver, mut modem) = setup();
        let init = tokio::spawn(async move { driver.init().await });

        let expected = [
            "AT&K0",
            "ATE0",
            "AT+CIER=1,0,0,0",
            "AT+SBDD2",
            "AT+SBDAREG=1",
            "AT+SBDMTA=1",
            "AT+CRIS",
        ];

        for cmd in expected {
            let mut buf = vec![0u8; cmd.len() + 2];
            modem.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, format!("{cmd}\r\n").into_bytes());
            if cmd == "AT+CRIS" {
                modem.write_all(b"+CRIS:0,0\r\nOK\r\n").await.unwrap();
            } else {
                modem.write_all(b"OK\r\n").await.unwrap();
            }
        }

        init.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn events_subscriber_sees_ring_alert() {
        let (driver, mut modem) = setup();
        let mut events = driver.events();
        modem.write_all(b"SBDRING\r\n").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, DriverEvent::RingAlert));
    }
}
