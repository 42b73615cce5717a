//! Proof commitments over fetched oracle data.
//!
//! [`Sha256Commitment`] binds `(data_value, data_type, timestamp)` into a
//! 32-byte digest. Each field is written as a big-endian `u32` length followed
//! by its bytes, numbers in decimal ASCII, behind a versioned domain tag, so no
//! two distinct inputs share an encoding.
//!
//! Recomputing the digest from the same inputs the operator supplied only
//! catches encoding bugs; it says nothing about whether the value is honest.
//! A real attestation (threshold signatures over an independently fetched
//! value, or a Merkle inclusion proof) plugs in behind [`ProofCommitment`]
//! without touching the request lifecycle.

use sha2::{Digest as _, Sha256};

use crate::error::{OracleError, Result};
use crate::models::oracle::Digest;

const DOMAIN_TAG: &[u8] = b"xydata-oracle/commitment/v1";

pub trait ProofCommitment: Send + Sync {
    fn commit(&self, data_value: i64, data_type: &str, timestamp: i64) -> Result<Digest>;

    fn verify(
        &self,
        candidate: &Digest,
        data_value: i64,
        data_type: &str,
        timestamp: i64,
    ) -> Result<bool> {
        Ok(self.commit(data_value, data_type, timestamp)? == *candidate)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Commitment;

impl ProofCommitment for Sha256Commitment {
    fn commit(&self, data_value: i64, data_type: &str, timestamp: i64) -> Result<Digest> {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);
        write_field(&mut hasher, data_value.to_string().as_bytes())?;
        write_field(&mut hasher, data_type.as_bytes())?;
        write_field(&mut hasher, timestamp.to_string().as_bytes())?;
        Ok(Digest(hasher.finalize().into()))
    }
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| OracleError::EncodingError(format!("field of {} bytes", bytes.len())))?;
    hasher.update(len.to_be_bytes());
    hasher.update(bytes);
    Ok(())
}
