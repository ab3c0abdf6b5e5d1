//! Optional string-compression codec, used by `send_text_message` when
//! `compressed` is requested.
//!
//! The actual compression algorithm (a Unishox2-style scheme, typically) is
//! treated as an opaque external codec the core does not depend on. This
//! module defines the trait seam and a no-op implementation; a real
//! Unishox2 binding can implement [`TextCodec`] without touching the
//! orchestrator.

/// Compress/decompress text for the wire. Implementations must round-trip:
/// `decompress(compress(s)) == s` for any `s` the modem can carry.
pub trait TextCodec: Send + Sync {
    fn compress(&self, text: &str) -> Vec<u8>;
    fn decompress(&self, bytes: &[u8]) -> Result<String, std::string::FromUtf8Error>;
}

/// Pass-through codec used when no real compressor is wired in. Not
/// suitable for production use — it exists so `compressed: true` has a
/// well-defined (if useless) behaviour out of the box.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl TextCodec for IdentityCodec {
    fn compress(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn decompress(&self, bytes: &[u8]) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_codec_round_trips() {
        let codec = IdentityCodec;
        let compressed = codec.compress("HELLO");
        assert_eq!(codec.decompress(&compressed).unwrap(), "HELLO");
    }
}
