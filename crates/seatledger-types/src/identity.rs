//! Identity proofs supplied by the identity collaborator.
//!
//! The engine never inspects how a proof was produced. It only checks that
//! one exists for the buyer and that the identity provider's ed25519
//! signature over it verifies.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{SeatLedgerError, UserId};

/// An opaque, signed assertion that a buyer passed identity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProof {
    pub buyer_id: UserId,
    /// Opaque digest produced by the verification model. Registered on the
    /// ledger verbatim.
    pub proof_hash: [u8; 32],
    pub issued_at: DateTime<Utc>,
    /// ed25519 signature by the identity provider over
    /// [`signing_payload`](Self::signing_payload).
    pub signature: Vec<u8>,
}

impl IdentityProof {
    /// Canonical signing payload.
    ///
    /// Format: `"seatledger:identity:v1:" || buyer_id || proof_hash || issued_at_ms`
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(96);
        payload.extend_from_slice(b"seatledger:identity:v1:");
        payload.extend_from_slice(self.buyer_id.0.as_bytes());
        payload.extend_from_slice(&self.proof_hash);
        payload.extend_from_slice(&self.issued_at.timestamp_millis().to_le_bytes());
        payload
    }

    /// Verify the provider signature.
    ///
    /// # Errors
    /// [`SeatLedgerError::InvalidIdentityProof`] if the signature is
    /// malformed or does not verify under `provider`.
    pub fn verify(&self, provider: &VerifyingKey) -> crate::Result<()> {
        let signature = Signature::from_slice(&self.signature).map_err(|e| {
            SeatLedgerError::InvalidIdentityProof {
                reason: format!("malformed signature: {e}"),
            }
        })?;
        provider
            .verify(&self.signing_payload(), &signature)
            .map_err(|_| SeatLedgerError::InvalidIdentityProof {
                reason: format!("signature does not verify for buyer {}", self.buyer_id),
            })
    }

    #[must_use]
    pub fn proof_hash_hex(&self) -> String {
        hex::encode(self.proof_hash)
    }

    /// Build and sign a proof with the given provider key.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn sign(
        buyer_id: UserId,
        proof_hash: [u8; 32],
        issued_at: DateTime<Utc>,
        provider: &ed25519_dalek::SigningKey,
    ) -> Self {
        use ed25519_dalek::Signer;

        let mut proof = Self {
            buyer_id,
            proof_hash,
            issued_at,
            signature: Vec::new(),
        };
        proof.signature = provider.sign(&proof.signing_payload()).to_bytes().to_vec();
        proof
    }
}
