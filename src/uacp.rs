//! Micro Agent Communication Protocol (uACP) codec.
//!
//! Transport-agnostic binary codec with compact framing for
//! edge-constrained inter-agent messages. Four verbs: PING, TELL, ASK,
//! OBSERVE.
//!
//! Wire format (big-endian):
//!
//! ```text
//! [1B verb][4B message_id][8B timestamp_ms]
//! [2B sender_len][sender_utf8][4B payload_len][payload]
//! ```
//!
//! Minimum header: 19 bytes. Batches are concatenated frames with no
//! separator; the decoder re-splits via the length prefixes.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::now_millis;

/// Minimum frame size: 1 (verb) + 4 (id) + 8 (ts) + 2 (sender_len) + 4 (payload_len).
const MIN_HEADER_SIZE: usize = 19;

/// Global monotonic message-id source for the helper constructors.
static MSG_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

// ── Errors ──────────────────────────────────────────────────────

/// uACP decode failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UacpError {
    /// Verb byte is not one of the four known verbs.
    #[error("invalid uACP verb byte: 0x{0:02x}")]
    InvalidVerb(u8),
    /// Buffer is shorter than the fixed header or a declared field.
    #[error("uACP frame truncated: {0}")]
    Truncated(String),
    /// Sender bytes are not valid UTF-8.
    #[error("uACP sender_id is not valid UTF-8")]
    InvalidSender,
    /// A length prefix points past the end of the buffer.
    #[error("uACP {field} ({declared}) exceeds remaining data ({remaining})")]
    LengthOverflow {
        /// Which length field overflowed.
        field: &'static str,
        /// Declared length from the wire.
        declared: usize,
        /// Bytes actually remaining in the buffer.
        remaining: usize,
    },
}

// ── Verb ────────────────────────────────────────────────────────

/// The four uACP verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UacpVerb {
    /// Liveness probe (empty payload by convention).
    Ping,
    /// One-way statement.
    Tell,
    /// Request expecting a reply.
    Ask,
    /// Observation report.
    Observe,
}

impl UacpVerb {
    fn wire_byte(self) -> u8 {
        match self {
            Self::Ping => 0x01,
            Self::Tell => 0x02,
            Self::Ask => 0x03,
            Self::Observe => 0x04,
        }
    }

    fn from_wire_byte(b: u8) -> Result<Self, UacpError> {
        match b {
            0x01 => Ok(Self::Ping),
            0x02 => Ok(Self::Tell),
            0x03 => Ok(Self::Ask),
            0x04 => Ok(Self::Observe),
            other => Err(UacpError::InvalidVerb(other)),
        }
    }
}

// ── Message ─────────────────────────────────────────────────────

/// A single uACP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UacpMessage {
    /// Message verb.
    pub verb: UacpVerb,
    /// Sender-local message id.
    pub message_id: u32,
    /// Sender identifier (UTF-8).
    pub sender_id: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Wall-clock timestamp in epoch milliseconds.
    pub timestamp: u64,
}

impl UacpMessage {
    /// Create a PING message (no payload).
    pub fn ping(sender: &str) -> Self {
        Self::with_verb(UacpVerb::Ping, sender, Vec::new())
    }

    /// Create a TELL message.
    pub fn tell(sender: &str, payload: Vec<u8>) -> Self {
        Self::with_verb(UacpVerb::Tell, sender, payload)
    }

    /// Create an ASK message.
    pub fn ask(sender: &str, payload: Vec<u8>) -> Self {
        Self::with_verb(UacpVerb::Ask, sender, payload)
    }

    /// Create an OBSERVE message.
    pub fn observe(sender: &str, payload: Vec<u8>) -> Self {
        Self::with_verb(UacpVerb::Observe, sender, payload)
    }

    fn with_verb(verb: UacpVerb, sender: &str, payload: Vec<u8>) -> Self {
        Self {
            verb,
            message_id: MSG_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            sender_id: sender.to_owned(),
            payload,
            timestamp: now_millis(),
        }
    }
}

// ── Codec ───────────────────────────────────────────────────────

/// Encodes and decodes [`UacpMessage`] values to/from the wire format.
pub struct UacpCodec;

impl UacpCodec {
    /// Serialize a single message.
    pub fn encode(msg: &UacpMessage) -> Vec<u8> {
        let sender_bytes = msg.sender_id.as_bytes();
        let sender_len = u16::try_from(sender_bytes.len()).unwrap_or(u16::MAX);
        let payload_len = u32::try_from(msg.payload.len()).unwrap_or(u32::MAX);

        let mut out = Vec::with_capacity(
            MIN_HEADER_SIZE
                .saturating_add(sender_bytes.len())
                .saturating_add(msg.payload.len()),
        );
        out.push(msg.verb.wire_byte());
        out.extend_from_slice(&msg.message_id.to_be_bytes());
        out.extend_from_slice(&msg.timestamp.to_be_bytes());
        out.extend_from_slice(&sender_len.to_be_bytes());
        out.extend_from_slice(&sender_bytes[..usize::from(sender_len)]);
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(&msg.payload);
        out
    }

    /// Deserialize a single message. The buffer must contain exactly one frame
    /// worth of declared bytes; trailing garbage past the payload is ignored.
    pub fn decode(data: &[u8]) -> Result<UacpMessage, UacpError> {
        let (msg, _consumed) = Self::decode_frame(data)?;
        Ok(msg)
    }

    /// Encode multiple messages into one buffer of concatenated frames.
    pub fn encode_batch(msgs: &[UacpMessage]) -> Vec<u8> {
        let mut out = Vec::new();
        for msg in msgs {
            out.extend_from_slice(&Self::encode(msg));
        }
        out
    }

    /// Decode all messages from a concatenated buffer.
    pub fn decode_batch(data: &[u8]) -> Result<Vec<UacpMessage>, UacpError> {
        let mut msgs = Vec::new();
        let mut pos = 0usize;
        while pos < data.len() {
            let (msg, consumed) = Self::decode_frame(&data[pos..])?;
            msgs.push(msg);
            pos = pos.saturating_add(consumed);
        }
        Ok(msgs)
    }

    /// Decode one frame from the front of `data`, returning the message and
    /// the number of bytes consumed.
    fn decode_frame(data: &[u8]) -> Result<(UacpMessage, usize), UacpError> {
        if data.len() < MIN_HEADER_SIZE {
            return Err(UacpError::Truncated(format!(
                "{} bytes (minimum {MIN_HEADER_SIZE})",
                data.len()
            )));
        }

        let verb = UacpVerb::from_wire_byte(data[0])?;
        let message_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        let timestamp = u64::from_be_bytes([
            data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
        ]);
        let sender_len = usize::from(u16::from_be_bytes([data[13], data[14]]));

        let sender_start = 15usize;
        let sender_end = sender_start.saturating_add(sender_len);
        if sender_end > data.len() {
            return Err(UacpError::LengthOverflow {
                field: "sender_len",
                declared: sender_len,
                remaining: data.len().saturating_sub(sender_start),
            });
        }
        let sender_id = std::str::from_utf8(&data[sender_start..sender_end])
            .map_err(|_| UacpError::InvalidSender)?
            .to_owned();

        let pl_len_end = sender_end.saturating_add(4);
        if pl_len_end > data.len() {
            return Err(UacpError::Truncated("missing payload_len".to_owned()));
        }
        let payload_len = usize::try_from(u32::from_be_bytes([
            data[sender_end],
            data[sender_end.saturating_add(1)],
            data[sender_end.saturating_add(2)],
            data[sender_end.saturating_add(3)],
        ]))
        .unwrap_or(usize::MAX);

        let payload_end = pl_len_end.saturating_add(payload_len);
        if payload_len > data.len().saturating_sub(pl_len_end) {
            return Err(UacpError::LengthOverflow {
                field: "payload_len",
                declared: payload_len,
                remaining: data.len().saturating_sub(pl_len_end),
            });
        }
        let payload = data[pl_len_end..payload_end].to_vec();

        Ok((
            UacpMessage {
                verb,
                message_id,
                sender_id,
                payload,
                timestamp,
            },
            payload_end,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(verb: UacpVerb, id: u32, sender: &str, payload: &[u8]) -> UacpMessage {
        UacpMessage {
            verb,
            message_id: id,
            sender_id: sender.to_owned(),
            payload: payload.to_vec(),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_ping_wire_layout() {
        let msg = sample(UacpVerb::Ping, 42, "node-1", b"");
        let encoded = UacpCodec::encode(&msg);

        // verb + message_id
        assert_eq!(hex::encode(&encoded[..5]), "010000002a");
        // 8 bytes big-endian timestamp
        assert_eq!(
            encoded[5..13],
            1_700_000_000_000u64.to_be_bytes(),
        );
        // sender_len + sender + empty payload_len
        assert_eq!(hex::encode(&encoded[13..15]), "0006");
        assert_eq!(hex::encode(&encoded[15..21]), "6e6f64652d31");
        assert_eq!(hex::encode(&encoded[21..]), "00000000");
        assert_eq!(encoded.len(), 25);
    }

    #[test]
    fn test_roundtrip_all_verbs() {
        for verb in [
            UacpVerb::Ping,
            UacpVerb::Tell,
            UacpVerb::Ask,
            UacpVerb::Observe,
        ] {
            let msg = sample(verb, 7, "agent-x", b"hello world");
            let decoded = UacpCodec::decode(&UacpCodec::encode(&msg)).expect("decode");
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_roundtrip_empty_sender_and_payload() {
        let msg = sample(UacpVerb::Tell, 0, "", b"");
        let decoded = UacpCodec::decode(&UacpCodec::encode(&msg)).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_roundtrip_unicode_sender() {
        let msg = sample(UacpVerb::Observe, 9, "nœud-β", b"\x00\x01\x02");
        let decoded = UacpCodec::decode(&UacpCodec::encode(&msg)).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_batch_roundtrip() {
        let msgs = vec![
            sample(UacpVerb::Ping, 1, "a", b""),
            sample(UacpVerb::Tell, 2, "b", b"payload"),
            sample(UacpVerb::Ask, 3, "c", b"question?"),
        ];
        let decoded = UacpCodec::decode_batch(&UacpCodec::encode_batch(&msgs)).expect("decode");
        assert_eq!(decoded, msgs);
    }

    #[test]
    fn test_decode_batch_empty() {
        assert_eq!(UacpCodec::decode_batch(b"").expect("empty ok"), vec![]);
    }

    #[test]
    fn test_invalid_verb_byte() {
        let mut encoded = UacpCodec::encode(&sample(UacpVerb::Ping, 1, "s", b""));
        encoded[0] = 0x7f;
        assert_eq!(
            UacpCodec::decode(&encoded),
            Err(UacpError::InvalidVerb(0x7f))
        );
    }

    #[test]
    fn test_truncated_header() {
        let err = UacpCodec::decode(&[0x01, 0x00, 0x00]).expect_err("too short");
        assert!(matches!(err, UacpError::Truncated(_)));
    }

    #[test]
    fn test_sender_len_overflow() {
        let mut encoded = UacpCodec::encode(&sample(UacpVerb::Tell, 1, "ab", b""));
        // Declare a sender far longer than the buffer.
        encoded[13] = 0xff;
        encoded[14] = 0xff;
        let err = UacpCodec::decode(&encoded).expect_err("overflow");
        assert!(matches!(
            err,
            UacpError::LengthOverflow {
                field: "sender_len",
                ..
            }
        ));
    }

    #[test]
    fn test_payload_len_overflow() {
        let mut encoded = UacpCodec::encode(&sample(UacpVerb::Tell, 1, "ab", b"xyz"));
        let len = encoded.len();
        // payload_len sits in the 4 bytes before the 3-byte payload.
        encoded[len - 7] = 0x00;
        encoded[len - 6] = 0x00;
        encoded[len - 5] = 0xff;
        encoded[len - 4] = 0xff;
        let err = UacpCodec::decode(&encoded).expect_err("overflow");
        assert!(matches!(
            err,
            UacpError::LengthOverflow {
                field: "payload_len",
                ..
            }
        ));
    }

    #[test]
    fn test_non_utf8_sender_rejected() {
        let mut encoded = UacpCodec::encode(&sample(UacpVerb::Ask, 1, "ab", b""));
        // Corrupt the 2-byte sender with an invalid UTF-8 sequence.
        encoded[15] = 0xff;
        encoded[16] = 0xfe;
        assert_eq!(UacpCodec::decode(&encoded), Err(UacpError::InvalidSender));
    }

    #[test]
    fn test_batch_rejects_truncated_tail() {
        let msgs = vec![sample(UacpVerb::Ping, 1, "a", b"")];
        let mut encoded = UacpCodec::encode_batch(&msgs);
        encoded.extend_from_slice(&[0x01, 0x00]); // stray partial frame
        assert!(UacpCodec::decode_batch(&encoded).is_err());
    }

    #[test]
    fn test_constructor_ids_increase() {
        let a = UacpMessage::ping("n");
        let b = UacpMessage::tell("n", vec![1]);
        assert!(b.message_id > a.message_id);
    }
}
