/// Bech32 / Bech32m codec (BIP-173, BIP-350)
///
/// Used on the authorize path to check miner payout addresses, so every
/// decode failure is a plain `Bech32Error` and nothing here panics on
/// attacker-controlled input.

mod base32;
mod error;
mod polymod;

pub use error::Bech32Error;

use base32::{decode_5bit, encode_5bit};
use polymod::polymod_hrp;

/// Alphabet for 5-bit symbols.
pub const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Final XOR constant for the Bech32m variant.
pub const BECH32M_CONST: u32 = 0x2bc8_30a3;

/// Longest string accepted by `decode`.
pub const MAX_LENGTH: usize = 90;

const CHECKSUM_LEN: usize = 6;

const CHARSET_REV: [i8; 128] = build_charset_rev();

const fn build_charset_rev() -> [i8; 128] {
    let mut rev = [-1i8; 128];
    let mut i = 0;
    while i < CHARSET.len() {
        rev[CHARSET[i] as usize] = i as i8;
        i += 1;
    }
    rev
}

/// Which checksum constant a string was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Bech32,
    Bech32m,
}

impl Variant {
    fn constant(self) -> u32 {
        match self {
            Variant::Bech32 => 1,
            Variant::Bech32m => BECH32M_CONST,
        }
    }

    /// BIP-350: witness version 0 keeps plain Bech32, everything newer uses Bech32m.
    pub fn for_witness_version(version: u8) -> Self {
        if version == 0 {
            Variant::Bech32
        } else {
            Variant::Bech32m
        }
    }
}

/// Result of decoding a checksum-protected string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedString {
    /// Lowercased human-readable part.
    pub hrp: String,
    /// 5-bit data symbols with the checksum stripped.
    pub data: Vec<u8>,
    pub variant: Variant,
}

fn verify_checksum(hrp: &str, data: &[u8]) -> Option<Variant> {
    match polymod_hrp(hrp, &[data]) {
        1 => Some(Variant::Bech32),
        BECH32M_CONST => Some(Variant::Bech32m),
        _ => None,
    }
}

fn create_checksum(hrp: &str, data: &[u8], variant: Variant) -> [u8; CHECKSUM_LEN] {
    let modulus = polymod_hrp(hrp, &[data, &[0u8; CHECKSUM_LEN]]) ^ variant.constant();
    let mut checksum = [0u8; CHECKSUM_LEN];
    for (i, c) in checksum.iter_mut().enumerate() {
        *c = ((modulus >> (5 * (5 - i))) & 31) as u8;
    }
    checksum
}

/// Build a string from an HRP and 5-bit data symbols.
///
/// Symbols must already be below 32.
pub fn encode(hrp: &str, data: &[u8], variant: Variant) -> String {
    let checksum = create_checksum(hrp, data, variant);

    let mut ret = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LEN);
    ret.push_str(hrp);
    ret.push('1');
    for &p in data.iter().chain(checksum.iter()) {
        debug_assert!(p < 32, "symbol out of range: {}", p);
        ret.push(CHARSET[(p & 0x1f) as usize] as char);
    }
    ret
}

/// Validate a Bech32/Bech32m string and split it into HRP and data.
pub fn decode(bech: &str) -> Result<DecodedString, Bech32Error> {
    if bech.len() > MAX_LENGTH {
        return Err(Bech32Error::MaxLengthExceeded);
    }

    let bytes = bech.as_bytes();
    let has_lower = bytes.iter().any(|b| b.is_ascii_lowercase());
    let has_upper = bytes.iter().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(Bech32Error::MixedCase);
    }

    let bech = bech.to_ascii_lowercase();
    let pos = bech.rfind('1').ok_or(Bech32Error::NoSeparator)?;
    if pos < 1 {
        return Err(Bech32Error::EmptyHrp);
    }
    if pos + CHECKSUM_LEN + 1 > bech.len() {
        return Err(Bech32Error::ChecksumTooShort);
    }

    let hrp = &bech[..pos];
    if hrp.bytes().any(|c| !(33..=126).contains(&c)) {
        return Err(Bech32Error::HrpCharOutOfRange);
    }

    let checksum_start = bech.len() - CHECKSUM_LEN;
    let mut data = Vec::with_capacity(bech.len() - pos - 1);
    for (offset, c) in bech.bytes().enumerate().skip(pos + 1) {
        let symbol = if c < 128 {
            CHARSET_REV[c as usize]
        } else {
            -1
        };
        if symbol < 0 {
            if offset >= checksum_start {
                return Err(Bech32Error::InvalidChecksumChar);
            }
            return Err(Bech32Error::InvalidDataChar);
        }
        data.push(symbol as u8);
    }

    let variant = verify_checksum(hrp, &data).ok_or(Bech32Error::InvalidChecksum)?;
    data.truncate(data.len() - CHECKSUM_LEN);

    Ok(DecodedString {
        hrp: hrp.to_string(),
        data,
        variant,
    })
}

/// Decode a segwit address, returning witness version and program.
pub fn segwit_addr_decode(hrp: &str, addr: &str) -> Result<(u8, Vec<u8>), Bech32Error> {
    let decoded = decode(addr)?;
    if decoded.hrp != hrp {
        return Err(Bech32Error::InvalidHrp {
            expected: hrp.to_string(),
            actual: decoded.hrp,
        });
    }

    let (&version, symbols) = decoded.data.split_first().ok_or(Bech32Error::EmptyData)?;
    if version > 16 {
        return Err(Bech32Error::InvalidWitnessVersion(version));
    }

    let program = decode_5bit(symbols)?;
    if program.len() < 2 || program.len() > 40 {
        return Err(Bech32Error::InvalidProgramLength(program.len()));
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(Bech32Error::InvalidV0ProgramLength(program.len()));
    }
    if decoded.variant != Variant::for_witness_version(version) {
        return Err(Bech32Error::VariantMismatch { version });
    }

    Ok((version, program))
}

/// Encode a segwit address without re-validating the result.
pub fn segwit_addr_encode_no_check(hrp: &str, version: u8, program: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + base32::encoded_len(program.len()));
    data.push(version);
    data.extend(encode_5bit(program));
    encode(hrp, &data, Variant::for_witness_version(version))
}

/// Encode a segwit address and prove it decodes back to the same payload.
pub fn segwit_addr_encode(hrp: &str, version: u8, program: &[u8]) -> Result<String, Bech32Error> {
    let address = segwit_addr_encode_no_check(hrp, version, program);
    let (got_version, got_program) = segwit_addr_decode(hrp, &address)?;
    if got_version != version || got_program != program {
        return Err(Bech32Error::RoundTripMismatch);
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_BECH32: &[&str] = &[
        "A12UEL5L",
        "a12uel5l",
        "abcdef1qpzry9x8gf2tvdw0s3jn54khce6mua7lmqqqxw",
        "split1checkupstagehandshakeupstreamerranterredcaperred2y9e3w",
        "?1ezyfcl",
    ];

    const VALID_BECH32M: &[&str] = &[
        "A1LQFN3A",
        "a1lqfn3a",
        "abcdef1l7aum6echk45nj3s0wdvt2fg8x9yrzpqzd3ryx",
        "split1checkupstagehandshakeupstreamerranterredcaperredlc445v",
        "?1v759aa",
    ];

    #[test]
    fn test_decode_bip173_vectors() {
        for s in VALID_BECH32 {
            let decoded = decode(s).unwrap_or_else(|e| panic!("{}: {}", s, e));
            assert_eq!(decoded.variant, Variant::Bech32, "{}", s);
        }
    }

    #[test]
    fn test_decode_bip350_vectors() {
        for s in VALID_BECH32M {
            let decoded = decode(s).unwrap_or_else(|e| panic!("{}: {}", s, e));
            assert_eq!(decoded.variant, Variant::Bech32m, "{}", s);
        }
    }

    #[test]
    fn test_encode_reproduces_vectors() {
        for s in VALID_BECH32.iter().chain(VALID_BECH32M.iter()) {
            let decoded = decode(s).unwrap();
            let again = encode(&decoded.hrp, &decoded.data, decoded.variant);
            assert_eq!(again, s.to_ascii_lowercase());
        }
    }

    #[test]
    fn test_separator_errors() {
        assert_eq!(decode("pzry9x0s0muk"), Err(Bech32Error::NoSeparator));
        assert_eq!(decode("1pzry9x0s0muk"), Err(Bech32Error::EmptyHrp));
        assert_eq!(decode("a1qqqqq"), Err(Bech32Error::ChecksumTooShort));
    }

    #[test]
    fn test_hrp_out_of_range() {
        assert_eq!(decode("\u{7f}1axkwrx"), Err(Bech32Error::HrpCharOutOfRange));
        assert_eq!(decode(" 1nwldj5"), Err(Bech32Error::HrpCharOutOfRange));
    }

    #[test]
    fn test_invalid_data_vs_checksum_char() {
        // 'b' is outside the alphabet
        assert_eq!(decode("abc1bqqqqqqqqqqq"), Err(Bech32Error::InvalidDataChar));
        assert_eq!(decode("abc1qqqqqqqqqqqb"), Err(Bech32Error::InvalidChecksumChar));
        assert_eq!(decode("abc1qqqqqqbqqqqq"), Err(Bech32Error::InvalidChecksumChar));
    }

    #[test]
    fn test_mixed_case_rejected_before_checksum() {
        assert_eq!(decode("A12uEL5L"), Err(Bech32Error::MixedCase));
    }

    #[test]
    fn test_length_checked_first() {
        let long = format!("A{}", "1".repeat(90));
        assert_eq!(long.len(), 91);
        assert_eq!(decode(&long), Err(Bech32Error::MaxLengthExceeded));
    }

    #[test]
    fn test_checksum_sensitivity() {
        for s in VALID_BECH32M.iter().chain(VALID_BECH32.iter()) {
            let lower = s.to_ascii_lowercase();
            let sep = lower.rfind('1').unwrap();
            for i in sep + 1..lower.len() {
                let original = lower.as_bytes()[i];
                let replacement = CHARSET.iter().copied().find(|&c| c != original).unwrap();
                let mut mutated = lower.clone().into_bytes();
                mutated[i] = replacement;
                let mutated = String::from_utf8(mutated).unwrap();
                assert_eq!(
                    decode(&mutated),
                    Err(Bech32Error::InvalidChecksum),
                    "{} -> {}",
                    lower,
                    mutated
                );
            }
        }
    }

    #[test]
    fn test_segwit_roundtrip_all_versions() {
        for version in 0u8..=16 {
            let lengths: Vec<usize> = if version == 0 {
                vec![20, 32]
            } else {
                (2..=40).collect()
            };
            for len in lengths {
                let program: Vec<u8> = (0..len as u8)
                    .map(|b| b.wrapping_mul(29).wrapping_add(version))
                    .collect();
                let address = segwit_addr_encode("bc", version, &program).unwrap();
                assert_eq!(segwit_addr_decode("bc", &address).unwrap(), (version, program));
            }
        }
    }

    #[test]
    fn test_segwit_variant_law() {
        let program = [0x75u8; 20];

        let mut data = vec![0u8];
        data.extend(encode_5bit(&program));
        let wrong_v0 = encode("bc", &data, Variant::Bech32m);
        assert_eq!(
            segwit_addr_decode("bc", &wrong_v0),
            Err(Bech32Error::VariantMismatch { version: 0 })
        );

        data[0] = 1;
        let wrong_v1 = encode("bc", &data, Variant::Bech32);
        assert_eq!(
            segwit_addr_decode("bc", &wrong_v1),
            Err(Bech32Error::VariantMismatch { version: 1 })
        );
    }

    #[test]
    fn test_segwit_program_length_rules() {
        let short = segwit_addr_encode_no_check("bc", 1, &[0x01]);
        assert_eq!(segwit_addr_decode("bc", &short), Err(Bech32Error::InvalidProgramLength(1)));

        let long = segwit_addr_encode_no_check("bc", 1, &[0x01; 41]);
        assert_eq!(segwit_addr_decode("bc", &long), Err(Bech32Error::InvalidProgramLength(41)));

        let v0 = segwit_addr_encode_no_check("bc", 0, &[0x01; 16]);
        assert_eq!(segwit_addr_decode("bc", &v0), Err(Bech32Error::InvalidV0ProgramLength(16)));
        assert!(segwit_addr_encode("bc", 0, &[0x01; 16]).is_err());
    }

    #[test]
    fn test_segwit_version_and_hrp_checks() {
        let data = [17u8, 0, 0, 0, 0];
        let bad_version = encode("bc", &data, Variant::Bech32m);
        assert_eq!(
            segwit_addr_decode("bc", &bad_version),
            Err(Bech32Error::InvalidWitnessVersion(17))
        );

        let empty = encode("bc", &[], Variant::Bech32m);
        assert_eq!(segwit_addr_decode("bc", &empty), Err(Bech32Error::EmptyData));

        let testnet = segwit_addr_encode("tb", 1, &[7u8; 32]).unwrap();
        assert!(matches!(
            segwit_addr_decode("bc", &testnet),
            Err(Bech32Error::InvalidHrp { .. })
        ));
    }

    #[test]
    fn test_bip350_addresses() {
        let (version, program) =
            segwit_addr_decode("bc", "BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4").unwrap();
        assert_eq!(version, 0);
        assert_eq!(hex::encode(program), "751e76e8199196d454941c45d1b3a323f1433bd6");

        let (version, program) = segwit_addr_decode(
            "bc",
            "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0",
        )
        .unwrap();
        assert_eq!(version, 1);
        assert_eq!(
            hex::encode(program),
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );

        let (version, program) = segwit_addr_decode("bc", "BC1SW50QGDZ25J").unwrap();
        assert_eq!(version, 16);
        assert_eq!(hex::encode(program), "751e");
    }
}
