//! Proof verification capability handed to downstream task runners.
//!
//! Proof arithmetic lives in the proving backend; the default verifier only
//! checks that a proof has the shape the backend would accept.

use std::sync::Arc;

use thiserror::Error;

/// Size of a single Groth16 proof in bytes.
pub const GROTH16_PROOF_LEN: usize = 192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealProof<'a> {
    pub partitions: usize,
    pub bytes: &'a [u8],
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("proof declares zero partitions")]
    NoPartitions,
}

pub trait ProofVerifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `Ok(false)` for a proof that cannot be valid.
    fn verify_seal(&self, proof: &SealProof<'_>) -> Result<bool, VerifyError>;
}

pub type SharedVerifier = Arc<dyn ProofVerifier>;

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProofVerifier;

impl ProofVerifier for DefaultProofVerifier {
    fn name(&self) -> &'static str {
        "default"
    }

    fn verify_seal(&self, proof: &SealProof<'_>) -> Result<bool, VerifyError> {
        if proof.partitions == 0 {
            return Err(VerifyError::NoPartitions);
        }
        Ok(proof
            .partitions
            .checked_mul(GROTH16_PROOF_LEN)
            .is_some_and(|expected| proof.bytes.len() == expected))
    }
}

pub fn default_verifier() -> SharedVerifier {
    Arc::new(DefaultProofVerifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_proof_length_per_partition() {
        let verifier = DefaultProofVerifier;
        let bytes = vec![0u8; GROTH16_PROOF_LEN * 2];
        let proof = SealProof {
            partitions: 2,
            bytes: &bytes,
        };
        assert_eq!(verifier.verify_seal(&proof), Ok(true));

        let short = SealProof {
            partitions: 3,
            bytes: &bytes,
        };
        assert_eq!(verifier.verify_seal(&short), Ok(false));

        let huge = SealProof {
            partitions: usize::MAX,
            bytes: &bytes,
        };
        assert_eq!(verifier.verify_seal(&huge), Ok(false));
    }

    #[test]
    fn zero_partitions_is_an_error() {
        let proof = SealProof {
            partitions: 0,
            bytes: &[],
        };
        assert_eq!(
            DefaultProofVerifier.verify_seal(&proof),
            Err(VerifyError::NoPartitions)
        );
    }
}
