//! Splitting and reassembly of oversize messages.
//!
//! A logical message whose frame body would exceed the frame limit is
//! split into `MSG_CHUNK` messages. Each chunk payload is:
//!
//! ```text
//! u16_be chunk_idx ‖ u16_be chunk_total ‖ u32_be logical_id ‖ bytes
//! ```
//!
//! Chunk streams are keyed by `(connection, logical_id)` — every
//! connection owns its own [`Reassembler`], and dropping the connection
//! discards its partial buffers. TCP preserves chunk order within a
//! connection, so an out-of-order or duplicate chunk can only mean a
//! broken peer and is treated as a protocol violation.

use {
    crate::{
        error::{PeeringError, Result},
        message::{ENVELOPE_HEADER_LEN, MAX_FRAME_BODY},
    },
    std::collections::HashMap,
};

/// Chunk payload header: idx (2) + total (2) + logical id (4).
pub const CHUNK_HEADER_LEN: usize = 8;

/// Largest slice of the original message body carried per chunk: the
/// chunk message's own envelope and header must still fit one frame.
pub const MAX_CHUNK_DATA: usize = MAX_FRAME_BODY - ENVELOPE_HEADER_LEN - CHUNK_HEADER_LEN;

/// True iff a frame body of `len` bytes must be chopped.
pub fn needs_chop(len: usize) -> bool {
    len > MAX_FRAME_BODY
}

/// Split a message body into chunk payloads under `logical_id`.
///
/// The caller wraps each returned payload in a `MSG_CHUNK` envelope.
pub fn chop(msg: &[u8], logical_id: u32) -> Result<Vec<Vec<u8>>> {
    let total = msg.len().div_ceil(MAX_CHUNK_DATA);
    if total > u16::MAX as usize {
        return Err(PeeringError::MessageTooLarge {
            size: msg.len(),
            max: MAX_CHUNK_DATA * u16::MAX as usize,
        });
    }
    let mut chunks = Vec::with_capacity(total);
    for (idx, piece) in msg.chunks(MAX_CHUNK_DATA).enumerate() {
        let mut payload = Vec::with_capacity(CHUNK_HEADER_LEN + piece.len());
        payload.extend_from_slice(&(idx as u16).to_be_bytes());
        payload.extend_from_slice(&(total as u16).to_be_bytes());
        payload.extend_from_slice(&logical_id.to_be_bytes());
        payload.extend_from_slice(piece);
        chunks.push(payload);
    }
    Ok(chunks)
}

struct PartialMessage {
    total: u16,
    next_idx: u16,
    data: Vec<u8>,
}

/// Per-connection reassembly state.
#[derive(Default)]
pub struct Reassembler {
    partial: HashMap<u32, PartialMessage>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logical messages currently mid-reassembly.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Feed one chunk payload. Returns the reassembled message body once
    /// the final chunk arrives, `None` while more chunks are expected.
    pub fn incoming(&mut self, chunk_payload: &[u8]) -> Result<Option<Vec<u8>>> {
        if chunk_payload.len() < CHUNK_HEADER_LEN {
            return Err(PeeringError::ProtocolViolation(format!(
                "chunk payload too short: {} bytes",
                chunk_payload.len()
            )));
        }
        let idx = u16::from_be_bytes([chunk_payload[0], chunk_payload[1]]);
        let total = u16::from_be_bytes([chunk_payload[2], chunk_payload[3]]);
        let logical_id = u32::from_be_bytes(
            chunk_payload[4..8].try_into().expect("8-byte chunk header"),
        );
        let data = &chunk_payload[CHUNK_HEADER_LEN..];

        if total == 0 || idx >= total {
            return Err(PeeringError::ProtocolViolation(format!(
                "chunk index {idx} out of range (total {total})"
            )));
        }

        let partial = self.partial.entry(logical_id).or_insert(PartialMessage {
            total,
            next_idx: 0,
            data: Vec::new(),
        });
        if partial.total != total || partial.next_idx != idx {
            self.partial.remove(&logical_id);
            return Err(PeeringError::ProtocolViolation(format!(
                "chunk stream {logical_id} broken at index {idx}"
            )));
        }
        partial.data.extend_from_slice(data);
        partial.next_idx += 1;

        if partial.next_idx == total {
            let done = self.partial.remove(&logical_id).expect("entry present");
            Ok(Some(done.data))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chop_reassemble_roundtrip() {
        let msg: Vec<u8> = (0..40 * 1024).map(|i| (i % 251) as u8).collect();
        let chunks = chop(&msg, 7).unwrap();
        assert_eq!(chunks.len(), 3);

        let mut reassembler = Reassembler::new();
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(reassembler.incoming(chunk).unwrap().is_none());
        }
        let out = reassembler
            .incoming(chunks.last().unwrap())
            .unwrap()
            .expect("final chunk completes the message");
        assert_eq!(out, msg);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_chunk_sizes_fit_frames() {
        let msg = vec![1u8; 100_000];
        for chunk in chop(&msg, 1).unwrap() {
            assert!(ENVELOPE_HEADER_LEN + chunk.len() <= MAX_FRAME_BODY);
        }
    }

    #[test]
    fn test_interleaved_logical_ids() {
        let msg_a = vec![0xaa; MAX_CHUNK_DATA + 1];
        let msg_b = vec![0xbb; MAX_CHUNK_DATA + 1];
        let chunks_a = chop(&msg_a, 1).unwrap();
        let chunks_b = chop(&msg_b, 2).unwrap();

        let mut reassembler = Reassembler::new();
        assert!(reassembler.incoming(&chunks_a[0]).unwrap().is_none());
        assert!(reassembler.incoming(&chunks_b[0]).unwrap().is_none());
        assert_eq!(reassembler.pending(), 2);
        assert_eq!(reassembler.incoming(&chunks_a[1]).unwrap().unwrap(), msg_a);
        assert_eq!(reassembler.incoming(&chunks_b[1]).unwrap().unwrap(), msg_b);
    }

    #[test]
    fn test_duplicate_chunk_rejected() {
        let msg = vec![3u8; 2 * MAX_CHUNK_DATA];
        let chunks = chop(&msg, 9).unwrap();

        let mut reassembler = Reassembler::new();
        assert!(reassembler.incoming(&chunks[0]).unwrap().is_none());
        assert!(matches!(
            reassembler.incoming(&chunks[0]),
            Err(PeeringError::ProtocolViolation(_))
        ));
        // the broken stream was discarded
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_zero_total_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes());

        let mut reassembler = Reassembler::new();
        assert!(reassembler.incoming(&payload).is_err());
    }
}
