//! Property-based tests for transport framing invariants.
//!
//! Properties tested:
//! 1. Chunk reassembly is a round-trip for any oversize payload.
//! 2. Every chunk produced fits a wire frame.
//! 3. The envelope codec is a round-trip for any in-range payload.
//! 4. Peer classification is antisymmetric: exactly one side dials.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        synod_peering::{
            chopper::{chop, needs_chop, Reassembler, CHUNK_HEADER_LEN, MAX_CHUNK_DATA},
            message::{Envelope, ENVELOPE_HEADER_LEN, MAX_FRAME_BODY},
            peer::is_inbound,
        },
    };

    proptest! {
        #[test]
        fn chunk_roundtrip(msg in proptest::collection::vec(any::<u8>(), 1..200_000)) {
            let chunks = chop(&msg, 42).unwrap();
            prop_assert_eq!(chunks.len(), msg.len().div_ceil(MAX_CHUNK_DATA));

            let mut reassembler = Reassembler::new();
            let mut result = None;
            for chunk in &chunks {
                prop_assert!(result.is_none(), "must complete only on the final chunk");
                result = reassembler.incoming(chunk).unwrap();
            }
            prop_assert_eq!(result.unwrap(), msg);
            prop_assert_eq!(reassembler.pending(), 0);
        }

        #[test]
        fn chunks_fit_frames(msg in proptest::collection::vec(any::<u8>(), 1..200_000)) {
            for chunk in chop(&msg, 7).unwrap() {
                prop_assert!(chunk.len() >= CHUNK_HEADER_LEN);
                prop_assert!(ENVELOPE_HEADER_LEN + chunk.len() <= MAX_FRAME_BODY);
            }
        }

        #[test]
        fn envelope_roundtrip(
            msg_type in 0u8..=255,
            timestamp in any::<i64>(),
            payload in proptest::collection::vec(any::<u8>(), 0..(MAX_FRAME_BODY - ENVELOPE_HEADER_LEN)),
        ) {
            let envelope = Envelope::with_timestamp(msg_type, timestamp, payload);
            let frame = envelope.encode_frame().unwrap();
            let decoded = Envelope::decode_body(&frame[4..]).unwrap();
            prop_assert_eq!(decoded, envelope);
        }

        #[test]
        fn oversize_detection_matches_chopper_need(extra in 0usize..100_000) {
            let body_len = MAX_FRAME_BODY + extra;
            prop_assert!(needs_chop(body_len));
            prop_assert!(!needs_chop(MAX_FRAME_BODY));
        }

        #[test]
        fn classification_is_antisymmetric(port_a in 1u16..u16::MAX, port_b in 1u16..u16::MAX) {
            let a = format!("127.0.0.1:{port_a}");
            let b = format!("127.0.0.1:{port_b}");
            if a != b {
                prop_assert_ne!(is_inbound(&a, &b), is_inbound(&b, &a));
            }
        }
    }
}
