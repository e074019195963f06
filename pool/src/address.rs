/// Miner login address validation
///
/// Native segwit (`bc1…` / `tb1…`) goes through the Bech32m codec; anything
/// else must be a 25-byte Base58Check legacy address.

use sha2::{Digest, Sha256};

use crate::bech32m;

const SEGWIT_PREFIXES: [&str; 2] = ["bc1", "tb1"];
const LEGACY_LEN: usize = 25;

fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// True if `address` is an acceptable payout address.
pub fn is_valid_btc_address(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    if SEGWIT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        if bech32m::decode(address).is_ok() {
            return true;
        }
        return bech32m::segwit_addr_decode(&lower[..2], address).is_ok();
    }

    is_valid_base58check(address)
}

fn is_valid_base58check(address: &str) -> bool {
    let Ok(raw) = bs58::decode(address).into_vec() else {
        return false;
    };
    if raw.len() != LEGACY_LEN {
        return false;
    }
    let (payload, check) = raw.split_at(21);
    double_sha256(payload)[..4] == *check
}
