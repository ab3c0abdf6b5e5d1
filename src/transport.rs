//! Line-framed byte transport to the modem.
//!
//! Opening the physical serial port and the raw byte plumbing underneath
//! it are out of scope for this module — it only owns the CRLF line framer
//! on top of any `AsyncRead + AsyncWrite` pair. A reference implementation
//! wiring this up to a real serial device via `tokio-serial` is provided
//! behind the `serial` feature, behind a narrow handle the rest of the
//! crate never touches directly.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec};

/// A line-framed connection to the modem.
///
/// `R`/`W` are the split halves of whatever duplex byte stream the host
/// application provides — a real serial port, a `tokio::io::duplex` pair
/// in tests, or anything else implementing the standard async I/O traits.
pub struct LineTransport<R, W> {
    lines: FramedRead<R, LinesCodec>,
    writer: W,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap a read half and write half. `max_line_length` bounds a single
    /// inbound line to guard against a runaway modem never sending CRLF.
    pub fn new(reader: R, writer: W, max_line_length: usize) -> Self {
        // LinesCodec returns lines with the trailing `\r`/`\n` already
        // stripped.
        let codec = LinesCodec::new_with_max_length(max_line_length);
        Self {
            lines: FramedRead::new(reader, codec),
            writer,
        }
    }

    /// Send `text + CRLF`.
    pub async fn write_line(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await
    }

    /// Send `buf` verbatim — used only for the `SBDWB` phase-2 payload.
    pub async fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(buf).await?;
        self.writer.flush().await
    }

    /// Await the next complete inbound line, CRLF stripped.
    ///
    /// Returns `None` when the underlying stream has closed.
    pub async fn next_line(&mut self) -> Option<std::io::Result<String>> {
        use futures::StreamExt;
        self.lines.next().await.map(|r| {
            r.map_err(|e| match e {
                tokio_util::codec::LinesCodecError::Io(io) => io,
                tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "line too long")
                }
            })
        })
    }

    /// Read exactly `n` raw bytes, bypassing line framing.
    ///
    /// Used only by the `SBDRB` binary read, whose payload is a raw,
    /// length-prefixed byte buffer rather than CRLF-delimited text — any
    /// bytes the line codec had already buffered (e.g. because the
    /// `OK`/command-echo line before it arrived in the same TCP/serial
    /// read) are drained first so no data is lost at the boundary.
    pub async fn read_exact_raw(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        use bytes::Buf;
        use tokio::io::AsyncReadExt;

        let mut out = Vec::with_capacity(n);
        {
            let buffered = self.lines.read_buffer_mut();
            let take = buffered.len().min(n);
            out.extend_from_slice(&buffered[..take]);
            buffered.advance(take);
        }
        if out.len() < n {
            let mut rest = vec![0u8; n - out.len()];
            self.lines.get_mut().read_exact(&mut rest).await?;
            out.extend_from_slice(&rest);
        }
        Ok(out)
    }
}

/// Default cap on a single inbound line. SBD text messages top out at 340
/// bytes and status lines are short; this leaves generous headroom.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

#[cfg(feature = "serial")]
pub mod serial {
    //! Reference transport over a real serial port via `tokio-serial`.

    use super::{LineTransport, DEFAULT_MAX_LINE_LENGTH};
    use tokio::io::{ReadHalf, WriteHalf};
    use tokio_serial::{SerialPortBuilderExt, SerialStream};

    /// Open `path` at `baud_rate` and wrap it in a [`LineTransport`].
    pub fn open(
        path: &str,
        baud_rate: u32,
    ) -> std::io::Result<LineTransport<ReadHalf<SerialStream>, WriteHalf<SerialStream>>> {
        let port = tokio_serial::new(path, baud_rate).open_native_async()?;
        let (reader, writer) = tokio::io::split(port);
        Ok(LineTransport::new(reader, writer, DEFAULT_MAX_LINE_LENGTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split};

    #[tokio::test]
    async fn write_line_appends_crlf() {
        let (a, mut b) = duplex(256);
        let (r, w) = split(a);
        let mut transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
        transport.write_line("AT").await.unwrap();

        let mut buf = [0u8; 4];
        tokio::io::AsyncReadExt::read_exact(&mut b, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"AT\r\n");
    }

    #[tokio::test]
    async fn next_line_strips_crlf() {
        let (a, mut b) = duplex(256);
        let (r, w) = split(a);
        let mut transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
        tokio::io::AsyncWriteExt::write_all(&mut b, b"OK\r\n")
            .await
            .unwrap();

        let line = transport.next_line().await.unwrap().unwrap();
        assert_eq!(line, "OK");
    }

    #[tokio::test]
    async fn read_exact_raw_drains_buffered_bytes_first() {
        let (a, mut b) = duplex(256);
        let (r, w) = split(a);
        let mut transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
        // "READY\r\n" gets consumed as a line, leaving "\x00\x03ABC\x00\xC6"
        // sitting in the codec's internal buffer for read_exact_raw to drain.
        tokio::io::AsyncWriteExt::write_all(&mut b, b"READY\r\n\x00\x03ABC\x00\xC6")
            .await
            .unwrap();

        let line = transport.next_line().await.unwrap().unwrap();
        assert_eq!(line, "READY");

        let raw = transport.read_exact_raw(7).await.unwrap();
        assert_eq!(raw, b"\x00\x03ABC\x00\xC6");
    }
}
