//! Length-prefixed frame codec shared by both ends of the worker pipe.
//!
//! Every message is framed as a 4-byte little-endian payload length followed
//! by exactly that many bytes of UTF-8 JSON. A zero-length frame is the
//! orderly-shutdown marker and carries no payload.

/// Number of bytes in the length prefix.
pub const HEADER_LEN: usize = 4;

/// Upper bound on a declared payload length.
///
/// A prefix above this cannot be a real envelope; the stream is treated as
/// desynchronized instead of waiting for bytes that will never make sense.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// One decoded unit from the transport stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete payload.
    Message(Vec<u8>),
    /// The zero-length shutdown marker.
    Shutdown,
}

/// Frame-level decode failure. Fatal to the connection: once the length
/// prefix cannot be trusted the stream cannot be re-synchronized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("declared frame length {declared} exceeds maximum {max}")]
pub struct OversizeFrame {
    /// Length the prefix claimed.
    pub declared: usize,
    /// The configured ceiling.
    pub max: usize,
}

/// Encode a payload into a single framed buffer.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// The framed shutdown marker: a zero length prefix with no payload.
pub fn shutdown_frame() -> [u8; HEADER_LEN] {
    [0; HEADER_LEN]
}

/// Stateful accumulator turning arbitrary byte chunks into frames.
///
/// Bytes are buffered with [`extend`](Self::extend);
/// [`next_frame`](Self::next_frame) yields every complete frame already
/// buffered, so a transport read that delivered several batched frames is
/// fully drained before the caller goes back to waiting for input. A
/// partial frame is never surfaced.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes to the accumulator.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame, if one is fully buffered.
    ///
    /// Returns `Ok(None)` when more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, OversizeFrame> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut prefix = [0u8; HEADER_LEN];
        prefix.copy_from_slice(&self.buf[..HEADER_LEN]);
        let len = u32::from_le_bytes(prefix) as usize;
        if len == 0 {
            self.buf.drain(..HEADER_LEN);
            return Ok(Some(Frame::Shutdown));
        }
        if len > MAX_FRAME_LEN {
            return Err(OversizeFrame {
                declared: len,
                max: MAX_FRAME_LEN,
            });
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let payload = self.buf[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buf.drain(..HEADER_LEN + len);
        Ok(Some(Frame::Message(payload)))
    }

    /// Number of buffered, not-yet-consumed bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
