//! The message envelope and its wire framing.
//!
//! Every frame on a peer connection is a length-prefixed envelope:
//!
//! ```text
//! u32_be length ‖ u8 msg_type ‖ i64_be timestamp ‖ payload[length-9]
//! ```
//!
//! `length` counts everything after the prefix, so a whole frame occupies
//! `4 + length` bytes and is bounded by [`MAX_MESSAGE_SIZE`]. Larger
//! logical messages go through the [`chopper`](crate::chopper).

use {
    crate::error::{PeeringError, Result},
    synod_types::now_nanos,
    tokio::io::{AsyncRead, AsyncReadExt},
};

/// Upper bound for one wire frame, length prefix included.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Size of the length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Envelope header after the prefix: msg_type (1) + timestamp (8).
pub const ENVELOPE_HEADER_LEN: usize = 9;

/// Largest admissible value of the length field.
pub const MAX_FRAME_BODY: usize = MAX_MESSAGE_SIZE - LENGTH_PREFIX_LEN;

/// Handshake: payload is a peering id.
pub const MSG_TYPE_HANDSHAKE: u8 = 0;
/// Keep-alive; empty payload.
pub const MSG_TYPE_HEARTBEAT: u8 = 1;
/// One chunk of a chopped oversize message.
pub const MSG_TYPE_CHUNK: u8 = 2;
/// First application-defined message type. Everything ≥ 16 is forwarded
/// to the committee dispatcher untouched.
pub const FIRST_APP_MSG_TYPE: u8 = 16;

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub msg_type: u8,
    /// Sender wall clock, nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Build an envelope stamped with the current wall clock.
    pub fn new(msg_type: u8, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            timestamp: now_nanos(),
            payload,
        }
    }

    /// Build an envelope with an explicit timestamp (fan-out sends share one).
    pub fn with_timestamp(msg_type: u8, timestamp: i64, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            timestamp,
            payload,
        }
    }

    /// Encode the frame body: `msg_type ‖ timestamp ‖ payload`.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.payload.len());
        out.push(self.msg_type);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Encode a complete frame including the length prefix.
    ///
    /// Fails with [`PeeringError::MessageTooLarge`] if the body exceeds
    /// [`MAX_FRAME_BODY`]; callers route such messages through the chopper.
    pub fn encode_frame(&self) -> Result<Vec<u8>> {
        let body_len = ENVELOPE_HEADER_LEN + self.payload.len();
        if body_len > MAX_FRAME_BODY {
            return Err(PeeringError::MessageTooLarge {
                size: body_len,
                max: MAX_FRAME_BODY,
            });
        }
        let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + body_len);
        out.extend_from_slice(&(body_len as u32).to_be_bytes());
        out.extend_from_slice(&self.encode_body()[..]);
        Ok(out)
    }

    /// Decode a frame body (the bytes after the length prefix).
    pub fn decode_body(body: &[u8]) -> Result<Self> {
        if body.len() < ENVELOPE_HEADER_LEN {
            return Err(PeeringError::ProtocolViolation(format!(
                "frame body too short: {} bytes",
                body.len()
            )));
        }
        let msg_type = body[0];
        let timestamp = i64::from_be_bytes(body[1..9].try_into().expect("9-byte header"));
        Ok(Self {
            msg_type,
            timestamp,
            payload: body[ENVELOPE_HEADER_LEN..].to_vec(),
        })
    }
}

/// Read one frame body from the stream.
///
/// Validates the length field before allocating. I/O errors (including a
/// clean EOF) surface as [`PeeringError::TransportTransient`]; a bogus
/// length field is a [`PeeringError::ProtocolViolation`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if !(ENVELOPE_HEADER_LEN..=MAX_FRAME_BODY).contains(&len) {
        return Err(PeeringError::ProtocolViolation(format!(
            "bad frame length {len}"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let env = Envelope::with_timestamp(FIRST_APP_MSG_TYPE, 12345, b"hello".to_vec());
        let frame = env.encode_frame().unwrap();

        // length prefix counts the body only
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);

        let decoded = Envelope::decode_body(&frame[4..]).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_empty_payload_frame() {
        let env = Envelope::with_timestamp(MSG_TYPE_HEARTBEAT, 7, Vec::new());
        let frame = env.encode_frame().unwrap();
        assert_eq!(frame.len(), LENGTH_PREFIX_LEN + ENVELOPE_HEADER_LEN);
        assert_eq!(Envelope::decode_body(&frame[4..]).unwrap(), env);
    }

    #[test]
    fn test_oversize_body_rejected() {
        let env = Envelope::new(FIRST_APP_MSG_TYPE, vec![0u8; MAX_FRAME_BODY]);
        assert!(matches!(
            env.encode_frame(),
            Err(PeeringError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_short_body_rejected() {
        assert!(matches!(
            Envelope::decode_body(&[0u8; 8]),
            Err(PeeringError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame() {
        let env = Envelope::with_timestamp(17, 99, b"payload".to_vec());
        let frame = env.encode_frame().unwrap();

        let mut cursor = std::io::Cursor::new(frame);
        let body = read_frame(&mut cursor).await.unwrap();
        assert_eq!(Envelope::decode_body(&body).unwrap(), env);
    }

    #[tokio::test]
    async fn test_read_frame_rejects_bad_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(MAX_FRAME_BODY as u32 + 1).to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);

        let mut cursor = std::io::Cursor::new(bytes);
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(PeeringError::ProtocolViolation(_))
        ));
    }
}
