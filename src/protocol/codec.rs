//! Binary codec for a single [`Message`].
//!
//! Fixed little-endian layout:
//!
//! ```text
//! ┌───────────┬─────────┬──────┬────────────┬─────────────────────────────┐
//! │ total_len │ seq id  │ kind │ value kind │ source, source_aux,         │
//! │ i32       │ i32     │ u8   │ u8         │ community, name: i32+bytes  │
//! ├───────────┴─────────┴──────┴────────────┴─────────────────────────────┤
//! │ timestamp f64 │ double_value f64 │ aux_double f64 │ payload: i32+bytes│
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `total_len` counts everything after the initial length field. A
//! zero-length string is a bare zero prefix and decodes back to `""`. The
//! `source_aux` slot is omitted entirely when aux-source data is disabled
//! process-wide; both ends of the connection must agree on that setting.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use super::message::{Message, MessageKind, Sequence, ValueKind};
use crate::error::{MoosError, Result};

/// Size of the `i32` length prefix fields.
const LEN_FIELD: usize = 4;

/// Fixed bytes of a message body: seq id, two tag bytes, three doubles,
/// and the length prefixes of source, community, name and payload.
const FIXED_BODY_LEN: usize = 4 + 1 + 1 + 3 * 8 + 4 * LEN_FIELD;

static AUX_SOURCE_DISABLED: AtomicBool = AtomicBool::new(false);

/// Whether the aux-source slot is encoded. Enabled by default.
pub fn aux_source_enabled() -> bool {
    !AUX_SOURCE_DISABLED.load(Ordering::Acquire)
}

/// Drop the aux-source slot from all encodes and decodes, process-wide.
///
/// Only useful against brokers built without aux-source support; both ends
/// must agree on the layout.
pub fn disable_aux_source() {
    AUX_SOURCE_DISABLED.store(true, Ordering::Release);
}

/// Re-enable the aux-source slot.
pub fn enable_aux_source() {
    AUX_SOURCE_DISABLED.store(false, Ordering::Release);
}

/// Byte length of `msg`'s wire encoding, including the length prefix.
pub fn encoded_len(msg: &Message, include_aux: bool) -> usize {
    let mut len = LEN_FIELD + FIXED_BODY_LEN;
    len += msg.source.len() + msg.community.len() + msg.name.len() + msg.payload.len();
    if include_aux {
        len += LEN_FIELD + msg.source_aux.len();
    }
    len
}

/// Encode one message to bytes.
pub fn encode(msg: &Message) -> Bytes {
    encode_with(msg, aux_source_enabled())
}

/// Encode with an explicit aux-source setting.
pub fn encode_with(msg: &Message, include_aux: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(msg, include_aux));
    encode_into(msg, include_aux, &mut buf);
    buf.freeze()
}

/// Encode one message, appending to an existing buffer.
pub fn encode_into(msg: &Message, include_aux: bool, buf: &mut BytesMut) {
    let body_len = encoded_len(msg, include_aux) - LEN_FIELD;
    buf.put_i32_le(body_len as i32);
    buf.put_i32_le(msg.seq.to_wire());
    buf.put_u8(msg.kind.as_byte());
    buf.put_u8(msg.value_kind.as_byte());
    put_str(buf, &msg.source);
    if include_aux {
        put_str(buf, &msg.source_aux);
    }
    put_str(buf, &msg.community);
    put_str(buf, &msg.name);
    buf.put_f64_le(msg.timestamp);
    buf.put_f64_le(msg.double_value);
    buf.put_f64_le(msg.aux_double);
    put_bytes(buf, &msg.payload);
}

/// Decode one message from the front of `buf`.
///
/// Returns the message and the number of bytes consumed, so a frame of
/// concatenated messages can be decoded left to right.
pub fn decode(buf: &[u8]) -> Result<(Message, usize)> {
    decode_with(buf, aux_source_enabled())
}

/// Decode with an explicit aux-source setting.
pub fn decode_with(buf: &[u8], include_aux: bool) -> Result<(Message, usize)> {
    let mut reader = Reader::new(buf);
    let body_len = reader.i32()?;
    if body_len < 0 {
        return Err(MoosError::Codec(format!(
            "negative message length {body_len}"
        )));
    }
    let body_len = body_len as usize;
    if reader.remaining() < body_len {
        return Err(MoosError::Codec(format!(
            "message length {} exceeds remaining {} bytes",
            body_len,
            reader.remaining()
        )));
    }
    // Never read past this message into the next one in the frame.
    let mut reader = Reader::new(&buf[LEN_FIELD..LEN_FIELD + body_len]);

    let seq = Sequence::from_wire(reader.i32()?);
    let kind = MessageKind::from_byte(reader.u8()?)?;
    let value_kind = ValueKind::from_byte(reader.u8()?)?;
    let source = reader.string()?;
    let source_aux = if include_aux {
        reader.string()?
    } else {
        String::new()
    };
    let community = reader.string()?;
    let name = reader.string()?;
    let timestamp = reader.f64()?;
    let double_value = reader.f64()?;
    let aux_double = reader.f64()?;
    let payload = reader.bytes()?;

    let msg = Message {
        kind,
        value_kind,
        name,
        seq,
        timestamp,
        double_value,
        aux_double,
        payload,
        source,
        source_aux,
        community,
    };
    Ok((msg, LEN_FIELD + body_len))
}

fn put_str(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_i32_le(bytes.len() as i32);
    buf.put_slice(bytes);
}

/// Cursor over a message body that fails with `CodecError` on underrun.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(MoosError::Codec(format!(
                "field of {} bytes exceeds remaining {} bytes",
                n,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn len_prefix(&mut self) -> Result<usize> {
        let len = self.i32()?;
        if len < 0 {
            return Err(MoosError::Codec(format!("negative field length {len}")));
        }
        Ok(len as usize)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.len_prefix()?;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    fn bytes(&mut self) -> Result<Bytes> {
        let len = self.len_prefix()?;
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: MessageKind) -> Message {
        let mut msg = Message::with_string(kind, "NAV_X", "12.5", 1_700_000_000.25);
        msg.seq = Sequence::Normal(42);
        msg.source = "helm".to_string();
        msg.source_aux = "behavior=waypoint".to_string();
        msg.community = "alpha".to_string();
        msg
    }

    #[test]
    fn test_roundtrip_string_message() {
        let msg = sample(MessageKind::Notify);
        let bytes = encode(&msg);
        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_roundtrip_double_message() {
        let mut msg = Message::with_double(MessageKind::Notify, "NAV_DEPTH", 48.75, 12345.5);
        msg.seq = Sequence::Normal(7);
        msg.source = "sensor".to_string();
        let bytes = encode(&msg);
        let (decoded, _) = decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.double_value, 48.75);
    }

    #[test]
    fn test_roundtrip_binary_message() {
        let payload = Bytes::from_static(&[0x00, 0xFF, 0x7F, 0x80, 0x01]);
        let msg = Message::with_binary(MessageKind::Notify, "SONAR_RAW", payload.clone(), 2.0);
        let bytes = encode(&msg);
        let (decoded, _) = decode(&bytes).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_roundtrip_empty_strings_and_payload() {
        let msg = Message::with_string(MessageKind::Data, "", "", -1.0);
        let bytes = encode(&msg);
        let (decoded, _) = decode(&bytes).unwrap();
        assert_eq!(decoded.name, "");
        assert_eq!(decoded.as_str(), Some(""));
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_roundtrip_empty_binary() {
        let msg = Message::with_binary(MessageKind::Notify, "EMPTY", Bytes::new(), 0.0);
        let (decoded, _) = decode(&encode(&msg)).unwrap();
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_roundtrip_null_keepalive() {
        let msg = Message::null();
        let (decoded, _) = decode(&encode(&msg)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_roundtrip_server_request_sentinel() {
        let mut msg = sample(MessageKind::ServerRequest);
        msg.seq = Sequence::ServerRequest;
        let bytes = encode(&msg);
        let (decoded, _) = decode(&bytes).unwrap();
        assert_eq!(decoded.seq, Sequence::ServerRequest);
    }

    #[test]
    fn test_declared_length_matches_following_bytes() {
        let msg = sample(MessageKind::Notify);
        let bytes = encode(&msg);
        let declared = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(declared as usize, bytes.len() - 4);
        assert_eq!(msg.encoded_len(), bytes.len());
    }

    #[test]
    fn test_layout_is_little_endian() {
        let mut msg = Message::null();
        msg.seq = Sequence::Normal(0x0102_0304);
        let bytes = encode(&msg);
        // Sequence id sits right after the length prefix.
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(bytes[8], b'.');
        assert_eq!(bytes[9], b'D');
    }

    #[test]
    fn test_decode_truncated_buffer() {
        let bytes = encode(&sample(MessageKind::Notify));
        let result = decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(MoosError::Codec(_))));
    }

    #[test]
    fn test_decode_field_length_exceeds_body() {
        let mut bytes = BytesMut::from(&encode(&sample(MessageKind::Notify))[..]);
        // Corrupt the source length prefix (offset 10) to something huge.
        bytes[10..14].copy_from_slice(&i32::to_le_bytes(1_000_000));
        let result = decode(&bytes);
        assert!(matches!(result, Err(MoosError::Codec(_))));
    }

    #[test]
    fn test_decode_negative_field_length() {
        let mut bytes = BytesMut::from(&encode(&sample(MessageKind::Notify))[..]);
        bytes[10..14].copy_from_slice(&i32::to_le_bytes(-5));
        let result = decode(&bytes);
        assert!(matches!(result, Err(MoosError::Codec(_))));
    }

    #[test]
    fn test_decode_unknown_kind_byte() {
        let mut bytes = BytesMut::from(&encode(&sample(MessageKind::Notify))[..]);
        bytes[8] = b'z';
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_consumes_one_message_only() {
        let first = sample(MessageKind::Notify);
        let second = Message::with_double(MessageKind::Notify, "OTHER", 1.0, 2.0);
        let mut buf = BytesMut::new();
        encode_into(&first, true, &mut buf);
        encode_into(&second, true, &mut buf);

        let (a, used_a) = decode(&buf).unwrap();
        let (b, used_b) = decode(&buf[used_a..]).unwrap();
        assert_eq!(a, first);
        assert_eq!(b.name, "OTHER");
        assert_eq!(used_a + used_b, buf.len());
    }

    #[test]
    fn test_aux_source_slot_omitted_when_disabled() {
        let msg = sample(MessageKind::Notify);
        let with_aux = encode_with(&msg, true);
        let without_aux = encode_with(&msg, false);
        assert_eq!(
            with_aux.len(),
            without_aux.len() + 4 + msg.source_aux.len()
        );

        let (decoded, _) = decode_with(&without_aux, false).unwrap();
        assert_eq!(decoded.source_aux, "");
        assert_eq!(decoded.source, msg.source);
        assert_eq!(decoded.name, msg.name);
    }
}
