//! Packet framing: length-prefixed groups of messages.
//!
//! A frame on the wire is an `i32` byte count followed by that many bytes
//! of concatenated message encodings. [`Packet`] accumulates one inbound
//! frame across however many short reads a non-blocking socket delivers:
//! first the four prefix bytes (themselves possibly split), then the body.
//! [`Packet::still_needed`] tells the caller exactly how many more bytes to
//! ask the socket for, so a read never strays into the next frame.
//!
//! A negative byte count is the wire's compression flag; compressed frames
//! are rejected with [`MoosError::UnsupportedCompression`] since this
//! client does not implement decompression.

use bytes::{BufMut, Bytes, BytesMut};

use super::codec;
use super::message::Message;
use crate::error::{MoosError, Result};

/// Size of the frame length prefix.
const PREFIX_SIZE: usize = 4;

/// Upper bound on a frame body; larger prefixes are treated as stream
/// corruption rather than allocated.
pub const MAX_PACKET_BYTES: usize = 64 * 1024 * 1024;

/// Accumulator for one inbound frame.
#[derive(Debug)]
pub struct Packet {
    prefix: [u8; PREFIX_SIZE],
    prefix_filled: usize,
    body: BytesMut,
    body_len: Option<usize>,
}

impl Packet {
    /// A fresh accumulator waiting for a length prefix.
    pub fn new() -> Self {
        Self {
            prefix: [0; PREFIX_SIZE],
            prefix_filled: 0,
            body: BytesMut::new(),
            body_len: None,
        }
    }

    /// How many more bytes this frame needs; 0 means complete.
    pub fn still_needed(&self) -> usize {
        match self.body_len {
            None => PREFIX_SIZE - self.prefix_filled,
            Some(len) => len - self.body.len(),
        }
    }

    /// Whether the frame is fully accumulated and ready to decode.
    pub fn is_complete(&self) -> bool {
        self.body_len.is_some() && self.still_needed() == 0
    }

    /// Feed freshly read bytes into the frame.
    ///
    /// Returns the number of bytes still needed (0 = complete). The caller
    /// must not hand over more than [`Packet::still_needed`] bytes.
    ///
    /// # Errors
    ///
    /// [`MoosError::UnsupportedCompression`] on a negative (compressed)
    /// length prefix; [`MoosError::Codec`] on an absurd prefix or overfeed.
    pub fn feed(&mut self, mut chunk: &[u8]) -> Result<usize> {
        if self.body_len.is_none() {
            let take = chunk.len().min(PREFIX_SIZE - self.prefix_filled);
            self.prefix[self.prefix_filled..self.prefix_filled + take]
                .copy_from_slice(&chunk[..take]);
            self.prefix_filled += take;
            chunk = &chunk[take..];

            if self.prefix_filled == PREFIX_SIZE {
                let declared = i32::from_le_bytes(self.prefix);
                if declared < 0 {
                    return Err(MoosError::UnsupportedCompression);
                }
                let len = declared as usize;
                if len > MAX_PACKET_BYTES {
                    return Err(MoosError::Codec(format!(
                        "frame of {len} bytes exceeds maximum {MAX_PACKET_BYTES}"
                    )));
                }
                self.body_len = Some(len);
                self.body.reserve(len);
            }
        }

        if !chunk.is_empty() {
            match self.body_len {
                Some(len) if chunk.len() <= len - self.body.len() => {
                    self.body.extend_from_slice(chunk);
                }
                _ => {
                    return Err(MoosError::Codec(format!(
                        "fed {} bytes past the end of the frame",
                        chunk.len()
                    )));
                }
            }
        }

        Ok(self.still_needed())
    }

    /// Decode a completed frame into its ordered message sequence.
    ///
    /// Any decode failure drops the whole frame.
    pub fn into_messages(self) -> Result<Vec<Message>> {
        debug_assert!(self.is_complete());
        let body = self.body.freeze();
        let mut messages = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let (msg, consumed) = codec::decode(&body[offset..])?;
            offset += consumed;
            messages.push(msg);
        }
        Ok(messages)
    }

    /// Encode a batch of messages as one frame.
    pub fn encode_all(messages: &[Message]) -> Bytes {
        let include_aux = codec::aux_source_enabled();
        let body_len: usize = messages
            .iter()
            .map(|m| codec::encoded_len(m, include_aux))
            .sum();
        let mut buf = BytesMut::with_capacity(PREFIX_SIZE + body_len);
        buf.put_i32_le(body_len as i32);
        for msg in messages {
            codec::encode_into(msg, include_aux, &mut buf);
        }
        buf.freeze()
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}
