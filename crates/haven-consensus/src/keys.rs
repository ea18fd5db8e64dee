//! Minimal key math for the consensus-observable derivations: deterministic
//! governance keys, output-key derivation, and tx-pubkey selection.
//!
//! Everything else (ring signatures, range proofs, wallet scanning) stays
//! behind the external verifier interfaces.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use tiny_keccak::{Hasher, Keccak};

/// Keccak-256 (CryptoNote cn_fast_hash).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order(keccak256(data))
}

fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

/// A secret/public keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPair {
    pub secret: [u8; 32],
    pub public: [u8; 32],
}

/// Deterministic keypair for the governance payout at `height`: the low
/// eight bytes of the height seed the scalar, the public key is the
/// base-point multiple. Reproducible by any verifier.
pub fn deterministic_keypair_from_height(height: u64) -> KeyPair {
    let mut secret = [0u8; 32];
    secret[..8].copy_from_slice(&height.to_le_bytes());
    let scalar = Scalar::from_bytes_mod_order(secret);
    let public = (ED25519_BASEPOINT_TABLE * &scalar).compress().to_bytes();
    KeyPair { secret: scalar.to_bytes(), public }
}

/// ECDH key derivation: `8 * sec * pub`.
pub fn generate_key_derivation(public_key: &[u8; 32], secret_key: &[u8; 32]) -> Option<[u8; 32]> {
    let point = CompressedEdwardsY(*public_key).decompress()?;
    let scalar = Scalar::from_bytes_mod_order(*secret_key);
    let shared = (point * scalar).mul_by_cofactor();
    if shared.is_identity() {
        return None;
    }
    Some(shared.compress().to_bytes())
}

/// Derive the one-time output key for `output_index` under a derivation:
/// `Hs(derivation || idx) * G + spend_pub`.
pub fn derive_public_key(
    derivation: &[u8; 32],
    output_index: u64,
    spend_public_key: &[u8; 32],
) -> Option<[u8; 32]> {
    let base = CompressedEdwardsY(*spend_public_key).decompress()?;
    let mut data = Vec::with_capacity(32 + 10);
    data.extend_from_slice(derivation);
    data.extend_from_slice(&encode_varint(output_index));
    let scalar = hash_to_scalar(&data);
    let point = ED25519_BASEPOINT_TABLE * &scalar + base;
    Some(point.compress().to_bytes())
}

/// `s * G`.
pub fn scalar_mult_base(secret_key: &[u8; 32]) -> [u8; 32] {
    let scalar = Scalar::from_bytes_mod_order(*secret_key);
    (ED25519_BASEPOINT_TABLE * &scalar).compress().to_bytes()
}

/// `s * P`.
pub fn scalar_mult_key(secret_key: &[u8; 32], public_key: &[u8; 32]) -> Option<[u8; 32]> {
    let point = CompressedEdwardsY(*public_key).decompress()?;
    let scalar = Scalar::from_bytes_mod_order(*secret_key);
    Some((point * scalar).compress().to_bytes())
}
