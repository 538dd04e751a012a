//! frpc frame encoding and incremental decoding.
//!
//! Every unit on the wire is a length-prefixed frame:
//!
//! ```text
//! [type:1][length:4, little-endian][payload:length]
//! ```
//!
//! Type `0` carries an opaque serialized message. Type `1` carries one trailer
//! entry as UTF-8 `key:value`, split on the first colon only.
//!
//! [`FrameAssembler`] accumulates arbitrarily chunked input and emits complete
//! frames in receipt order. A partial frame is never emitted.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Frame type tags.
pub mod frame_type {
    /// Serialized message payload.
    pub const MESSAGE: u8 = 0x00;
    /// `key:value` trailer payload.
    pub const TRAILER: u8 = 0x01;
}

/// Frame header size (type + length).
pub const FRAME_HEADER_SIZE: usize = 5;

/// A fully received frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A message frame.
    Message(Bytes),
    /// A trailer frame.
    Trailer { key: String, value: String },
    /// A frame with a tag this version does not understand.
    Unknown { tag: u8, payload: Bytes },
}

/// Encode a frame with an arbitrary type tag.
///
/// Fails with [`FrameError::Oversized`] if the payload length does not fit
/// the 4-byte length field.
pub fn encode_frame(tag: u8, payload: &[u8]) -> Result<Bytes, FrameError> {
    let length = payload_length(payload.len())?;
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.put_u8(tag);
    frame.put_u32_le(length);
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

fn payload_length(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len).map_err(|_| FrameError::Oversized { len })
}

/// Encode a message frame.
pub fn encode_message(payload: &[u8]) -> Result<Bytes, FrameError> {
    encode_frame(frame_type::MESSAGE, payload)
}

/// Encode one trailer entry as a trailer frame.
pub fn encode_trailer(key: &str, value: &str) -> Result<Bytes, FrameError> {
    let mut payload = String::with_capacity(key.len() + 1 + value.len());
    payload.push_str(key);
    payload.push(':');
    payload.push_str(value);
    encode_frame(frame_type::TRAILER, payload.as_bytes())
}

/// Peek the frame header at the start of `data`.
///
/// Returns `(tag, length)`, or `None` if fewer than [`FRAME_HEADER_SIZE`]
/// bytes are available.
pub fn parse_frame_header(data: &[u8]) -> Option<(u8, u32)> {
    if data.len() < FRAME_HEADER_SIZE {
        return None;
    }
    let length = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
    Some((data[0], length))
}

/// Split a trailer payload into key and value on the first colon.
///
/// A payload without a colon is a key with an empty value.
pub fn parse_trailer(payload: &[u8]) -> (String, String) {
    let text = String::from_utf8_lossy(payload);
    match text.split_once(':') {
        Some((key, value)) => (key.to_owned(), value.to_owned()),
        None => (text.into_owned(), String::new()),
    }
}

/// Consume one complete frame from the front of `buffer`.
///
/// Returns `None` and leaves `buffer` untouched if the buffer does not yet
/// hold a complete frame.
pub fn decode_frame(buffer: &mut BytesMut) -> Option<Frame> {
    let (tag, length) = parse_frame_header(buffer)?;
    let frame_size = FRAME_HEADER_SIZE + length as usize;
    if buffer.len() < frame_size {
        return None;
    }

    buffer.advance(FRAME_HEADER_SIZE);
    let payload = buffer.split_to(length as usize).freeze();

    Some(match tag {
        frame_type::MESSAGE => Frame::Message(payload),
        frame_type::TRAILER => {
            let (key, value) = parse_trailer(&payload);
            Frame::Trailer { key, value }
        }
        tag => Frame::Unknown { tag, payload },
    })
}

/// Incremental frame parser over a growable byte accumulator.
///
/// # Example
///
/// ```
/// use frpc_core::{FrameAssembler, encode_message, encode_trailer};
///
/// let mut wire = encode_message(b"hi")?.to_vec();
/// wire.extend_from_slice(&encode_trailer("status", "0")?);
///
/// let mut assembler = FrameAssembler::new();
/// let mut messages = Vec::new();
/// let mut trailers = Vec::new();
/// for byte in &wire {
///     assembler.feed(
///         std::slice::from_ref(byte),
///         |m| messages.push(m),
///         |k, v| trailers.push((k, v)),
///     );
/// }
///
/// assert_eq!(messages, vec![bytes::Bytes::from_static(b"hi")]);
/// assert_eq!(trailers, vec![("status".to_string(), "0".to_string())]);
/// assert!(assembler.finish().is_ok());
/// # Ok::<(), frpc_core::FrameError>(())
/// ```
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and emit every frame it completes.
    ///
    /// `on_message` and `on_trailer` run synchronously, in wire order, before
    /// this returns. Unknown frame types are skipped but their bytes are
    /// consumed. No frame length bound is enforced here.
    pub fn feed<M, T>(&mut self, chunk: &[u8], mut on_message: M, mut on_trailer: T)
    where
        M: FnMut(Bytes),
        T: FnMut(String, String),
    {
        self.buffer.extend_from_slice(chunk);
        while let Some(frame) = decode_frame(&mut self.buffer) {
            match frame {
                Frame::Message(payload) => on_message(payload),
                Frame::Trailer { key, value } => on_trailer(key, value),
                Frame::Unknown { .. } => {}
            }
        }
    }

    /// Number of buffered bytes belonging to an incomplete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Signal end of input.
    ///
    /// Any partial frame is discarded and reported as
    /// [`FrameError::Truncated`].
    pub fn finish(&mut self) -> Result<(), FrameError> {
        let pending = self.buffer.len();
        self.buffer.clear();
        if pending > 0 {
            return Err(FrameError::Truncated { pending });
        }
        Ok(())
    }
}
