//! Threshold-signature contract.
//!
//! The committee finalizes an anchor transaction by aggregating signature
//! shares from at least `threshold` members. The production scheme is a
//! BLS-style threshold scheme provided externally; the operator only relies
//! on the [`ThresholdScheme`] contract below.
//!
//! [`DevScheme`] is a deterministic stand-in used by tests and local
//! clusters. It is NOT cryptographically secure: every committee member
//! holds the same secret, a share is a keyed digest of the essence hash,
//! and the aggregate is independent of which shares contributed — the same
//! property a real threshold scheme gives, which is what the operator
//! logic depends on.

use {
    crate::hash::{hash_chunks, HashValue},
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// One committee member's signature share over an essence hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigShare {
    /// Index of the signing member in the committee.
    pub peer_index: u16,
    /// Opaque share bytes, scheme defined.
    pub bytes: Vec<u8>,
}

/// A finalized aggregate signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSignature {
    pub bytes: Vec<u8>,
}

/// Errors surfaced by a threshold scheme.
#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("not enough valid shares: got {got}, need {need}")]
    NotEnoughShares { got: usize, need: usize },

    #[error("invalid share from peer {0}")]
    InvalidShare(u16),
}

/// The signature scheme the consensus operator aggregates against.
pub trait ThresholdScheme: Send + Sync {
    /// Number of shares required to produce an aggregate signature.
    fn threshold(&self) -> u16;

    /// Index of the local member within the committee.
    fn own_index(&self) -> u16;

    /// Produce the local member's share over `essence`.
    fn sign_share(&self, essence: &HashValue) -> SigShare;

    /// Verify a share received from a peer.
    fn verify_share(&self, essence: &HashValue, share: &SigShare) -> bool;

    /// Aggregate at least `threshold` valid shares into a full signature.
    fn aggregate(
        &self,
        essence: &HashValue,
        shares: &[SigShare],
    ) -> Result<AggregateSignature, SchemeError>;

    /// Verify a full signature over `essence`.
    fn verify(&self, essence: &HashValue, signature: &AggregateSignature) -> bool;
}

/// Deterministic development scheme. See the module doc for caveats.
#[derive(Clone)]
pub struct DevScheme {
    own_index: u16,
    threshold: u16,
    secret: [u8; 32],
}

impl DevScheme {
    pub fn new(own_index: u16, threshold: u16, secret: [u8; 32]) -> Self {
        Self {
            own_index,
            threshold,
            secret,
        }
    }

    fn share_bytes(&self, essence: &HashValue, peer_index: u16) -> Vec<u8> {
        hash_chunks(&[&self.secret, essence.as_ref(), &peer_index.to_be_bytes()])
            .as_ref()
            .to_vec()
    }
}

impl ThresholdScheme for DevScheme {
    fn threshold(&self) -> u16 {
        self.threshold
    }

    fn own_index(&self) -> u16 {
        self.own_index
    }

    fn sign_share(&self, essence: &HashValue) -> SigShare {
        SigShare {
            peer_index: self.own_index,
            bytes: self.share_bytes(essence, self.own_index),
        }
    }

    fn verify_share(&self, essence: &HashValue, share: &SigShare) -> bool {
        share.bytes == self.share_bytes(essence, share.peer_index)
    }

    fn aggregate(
        &self,
        essence: &HashValue,
        shares: &[SigShare],
    ) -> Result<AggregateSignature, SchemeError> {
        let mut seen = std::collections::HashSet::new();
        let mut valid = 0usize;
        for share in shares {
            if !self.verify_share(essence, share) {
                return Err(SchemeError::InvalidShare(share.peer_index));
            }
            if seen.insert(share.peer_index) {
                valid += 1;
            }
        }
        if valid < self.threshold as usize {
            return Err(SchemeError::NotEnoughShares {
                got: valid,
                need: self.threshold as usize,
            });
        }
        Ok(AggregateSignature {
            bytes: hash_chunks(&[&self.secret, essence.as_ref(), b"aggregate"])
                .as_ref()
                .to_vec(),
        })
    }

    fn verify(&self, essence: &HashValue, signature: &AggregateSignature) -> bool {
        signature.bytes
            == hash_chunks(&[&self.secret, essence.as_ref(), b"aggregate"])
                .as_ref()
                .to_vec()
    }
}
