/// Target / difficulty arithmetic and Stratum hash presentation
///
/// Difficulty here is `2^256 / target`, the raw expected hash count. Miners
/// see it normalised by the genesis target work (difficulty-1 work).

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use thiserror::Error;

/// Compact bits of the difficulty-1 target (Bitcoin genesis block).
pub const GENESIS_BITS: u32 = 0x1d00ffff;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashFormatError {
    #[error("hash hex too long ({0} digits)")]
    TooLong(usize),

    #[error("hash hex is empty")]
    Empty,

    #[error("invalid hex in hash: {0}")]
    InvalidHex(String),
}

fn pow256() -> BigUint {
    BigUint::from(1u8) << 256usize
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// `floor(2^256 / target)`; zero for a zero or unparsable target.
///
/// Accepts an optional `0x` prefix and odd-length hex.
pub fn target_hex_to_diff(target_hex: &str) -> BigUint {
    let digits = strip_0x(target_hex.trim());
    if digits.is_empty() {
        return BigUint::zero();
    }
    let target = match BigUint::parse_bytes(digits.as_bytes(), 16) {
        Some(t) => t,
        None => return BigUint::zero(),
    };
    if target.is_zero() {
        return BigUint::zero();
    }
    pow256() / target
}

/// `target_hex_to_diff` clamped into an `i64`.
pub fn target_hex_to_diff_i64(target_hex: &str) -> i64 {
    target_hex_to_diff(target_hex).to_i64().unwrap_or(i64::MAX)
}

/// `"0x" + hex(floor(2^256 / diff))`, minimal big-endian bytes.
///
/// Non-positive difficulties have no target and give an empty string.
pub fn get_target_hex(diff: i64) -> String {
    if diff <= 0 {
        return String::new();
    }
    let target = pow256() / BigUint::from(diff as u64);
    format!("0x{}", hex::encode(target.to_bytes_be()))
}

/// Expand compact `nBits` into the full target.
pub fn compact_to_target(bits: u32) -> BigUint {
    let exponent = bits >> 24;
    let mantissa = BigUint::from(bits & 0x007f_ffff);
    if exponent <= 3 {
        mantissa >> (8 * (3 - exponent) as usize)
    } else {
        mantissa << (8 * (exponent - 3) as usize)
    }
}

/// Expected hashes for the difficulty-1 target (4295032833).
pub fn genesis_target_work() -> i64 {
    let target = compact_to_target(GENESIS_BITS);
    (pow256() / target).to_i64().unwrap_or(i64::MAX)
}

/// Miner-facing difficulty for `target_hex`.
pub fn stratum_difficulty(target_hex: &str, genesis_work: i64) -> Option<f64> {
    if genesis_work <= 0 {
        return None;
    }
    let diff = target_hex_to_diff(target_hex).to_f64()?;
    Some(diff / genesis_work as f64)
}

/// Parse up to 64 hex digits into a right-aligned big-endian 256-bit value.
fn parse_uint256_be(hex_str: &str) -> Result<[u8; 32], HashFormatError> {
    let digits = strip_0x(hex_str.trim());
    if digits.is_empty() {
        return Err(HashFormatError::Empty);
    }
    if digits.len() > 64 {
        return Err(HashFormatError::TooLong(digits.len()));
    }

    let padded = format!("{:0>64}", digits);
    let mut out = [0u8; 32];
    hex::decode_to_slice(&padded, &mut out)
        .map_err(|e| HashFormatError::InvalidHex(e.to_string()))?;
    Ok(out)
}

/// Previous-block hash as `mining.notify` wants it: the eight 4-byte words
/// of the big-endian hex in reverse order, bytes inside a word untouched.
pub fn target_hash256_stratum_format(hex_str: &str) -> Result<String, HashFormatError> {
    let be = parse_uint256_be(hex_str)?;
    let mut out = Vec::with_capacity(32);
    for word in be.chunks(4).rev() {
        out.extend_from_slice(word);
    }
    Ok(hex::encode(out))
}

/// Merkle branch hash as `mining.notify` wants it: fully byte reversed.
pub fn hash256_stratum_format(hex_str: &str) -> Result<String, HashFormatError> {
    let mut bytes = parse_uint256_be(hex_str)?;
    bytes.reverse();
    Ok(hex::encode(bytes))
}
