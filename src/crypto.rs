//! Cryptographic primitives shared by the wallet and the ledger engine:
//! the iterated double-SHA-256 digest, address derivation, Merkle root
//! computation, and secp256k1 ECDSA signing/verification.
//!
//! The double-hash and address routines are deliberately unusual (they
//! iterate over hex *text* rather than raw bytes) because that is the
//! wire contract every peer must agree on bit-for-bit; see DESIGN.md.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ErrorKind;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// SHA-256 over the UTF-8 bytes of `text`, returned as a lowercase hex digest.
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Double-SHA-256 over `text`: hash the UTF-8 bytes of `text`, hex-encode,
/// then hash the UTF-8 bytes of *that hex string*. Hashing the hex text
/// of the intermediate digest (rather than its raw bytes) is intentional
/// and must be preserved for wire compatibility.
pub fn double_sha256(text: &str) -> String {
    let first = sha256_hex(text.as_bytes());
    sha256_hex(first.as_bytes())
}

/// Serializes `value` with lexicographically sorted object keys at every
/// nesting level and no incidental whitespace, the preimage used for every
/// hash and signature in the ledger. Backed by `serde_json::Value`, whose
/// `Map` is a `BTreeMap` as long as the `preserve_order` feature stays off,
/// which is how every producer and verifier in this crate reaches the same
/// bytes without a hand-rolled serializer.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, ErrorKind> {
    let as_value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&as_value)?)
}

/// Derives a base58 address from a public key's hex text, per the wire contract:
/// SHA-256 over the hex text with its first two characters dropped, RIPEMD-160
/// over the hex text of that digest, prefixed with the hex characters "00",
/// checksummed with the first 8 hex characters of a double-SHA-256 over the
/// prefixed string, then base58-encoded as a single big integer.
pub fn address_from_public_key_hex(public_key_hex: &str) -> String {
    let trimmed = if public_key_hex.len() >= 2 {
        &public_key_hex[2..]
    } else {
        public_key_hex
    };

    let sha_digest = sha256_hex(trimmed.as_bytes());

    let mut ripemd_hasher = ripemd::Ripemd160::new();
    ripemd_hasher.update(sha_digest.as_bytes());
    let ripemd_digest = hex::encode(ripemd_hasher.finalize());

    let prefixed = format!("00{}", ripemd_digest);
    let checksum = &double_sha256(&prefixed)[..8];
    let full_hex = format!("{}{}", prefixed, checksum);

    base58_encode_hex_int(&full_hex)
}

/// Encodes the big-integer value of a hex string in base58, matching
/// Python's `base58.b58encode_int`: no leading-zero-byte padding, just the
/// digits of the integer itself.
fn base58_encode_hex_int(hex_str: &str) -> String {
    let mut n = BigUint::parse_bytes(hex_str.as_bytes(), 16).unwrap_or_else(BigUint::zero);

    if n.is_zero() {
        return (BASE58_ALPHABET[0] as char).to_string();
    }

    let base = BigUint::from(58u32);
    let mut digits = Vec::new();

    while !n.is_zero() {
        let remainder = (&n % &base).to_u32().expect("remainder of u32 divisor fits in u32");
        digits.push(BASE58_ALPHABET[remainder as usize]);
        n /= &base;
    }

    digits.reverse();
    String::from_utf8(digits).expect("base58 alphabet is ASCII")
}

/// Computes the Merkle root over an ordered list of transaction hashes.
/// An empty list yields an empty string; a single hash is lifted with one
/// more double-SHA-256 pass; otherwise adjacent hashes are paired and
/// hashed together level by level, and an odd trailing hash at any level
/// is lifted by hashing itself rather than being duplicated.
pub fn merkle_root(tx_hashes: &[String]) -> String {
    if tx_hashes.is_empty() {
        return String::new();
    }

    if tx_hashes.len() == 1 {
        return double_sha256(&tx_hashes[0]);
    }

    let mut level: Vec<String> = tx_hashes.to_vec();

    while level.len() != 1 {
        let mut next_level = Vec::with_capacity(level.len() / 2 + 1);
        let mut i = 0;

        while i + 1 < level.len() {
            let combined = format!("{}{}", level[i], level[i + 1]);
            next_level.push(double_sha256(&combined));
            i += 2;
        }

        if level.len() % 2 == 1 {
            next_level.push(double_sha256(&level[level.len() - 1]));
        }

        level = next_level;
    }

    level.remove(0)
}

/// Hex-encodes a public key the way this crate represents it on the wire:
/// the raw 64-byte (X, Y) point, without the SEC1 format byte. Address
/// derivation then drops the point's leading hex byte itself (§3), so the
/// two decisions compose to reproduce the exact address contract.
pub fn encode_public_key(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    hex::encode(&encoded.as_bytes()[1..])
}

/// Inverse of [encode_public_key]: re-adds the uncompressed SEC1 format
/// byte and parses the resulting point.
pub fn decode_public_key(public_key_hex: &str) -> Option<VerifyingKey> {
    let mut bytes = vec![0x04u8];
    bytes.extend(hex::decode(public_key_hex).ok()?);
    VerifyingKey::from_sec1_bytes(&bytes).ok()
}

/// Signs the UTF-8 bytes of `msg` with a secp256k1 ECDSA key, returning a
/// hex-encoded fixed-size (r, s) signature.
pub fn sign(signing_key: &SigningKey, msg: &str) -> String {
    let signature: Signature = signing_key.sign(msg.as_bytes());
    hex::encode(signature.to_bytes())
}

/// Verifies a hex-encoded secp256k1 ECDSA signature over the UTF-8 bytes
/// of `msg` under the given public key (hex, in this crate's encoding).
/// Returns `false` for any malformed input rather than propagating an
/// error: signature failure is itself just another verdict to the caller.
pub fn verify(public_key_hex: &str, msg: &str, signature_hex: &str) -> bool {
    let verifying_key = match decode_public_key(public_key_hex) {
        Some(key) => key,
        None => return false,
    };

    let sig_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let signature = match Signature::from_slice(&sig_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    verifying_key.verify(msg.as_bytes(), &signature).is_ok()
}
