/// 8-bit <-> 5-bit regrouping for witness programs.
///
/// Works on 40-bit blocks: five bytes become eight symbols. The final
/// partial block is packed MSB-first and zero padded on the low end; no
/// padding symbols are ever emitted or expected.

use super::error::Bech32Error;

/// Bytes recovered from a trailing group of `n` symbols (index = n).
const PARTIAL_GROUP_BYTES: [usize; 9] = [0, 0, 1, 1, 2, 3, 3, 4, 5];

/// Group lengths a canonical encoder can produce. Other lengths still
/// occupy their output bytes but leave them zeroed.
fn is_packed_group(len: usize) -> bool {
    matches!(len, 2 | 4 | 5 | 7 | 8)
}

pub(crate) fn encoded_len(n: usize) -> usize {
    n / 5 * 8 + (n % 5 * 8 + 4) / 5
}

pub(crate) fn decoded_len(n: usize) -> usize {
    n / 8 * 5 + n % 8 * 5 / 8
}

/// Regroup bytes into 5-bit symbols, `ceil(8n / 5)` of them.
pub(crate) fn encode_5bit(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(src.len()));

    for block in src.chunks(5) {
        let mut acc = 0u64;
        for (i, &b) in block.iter().enumerate() {
            acc |= (b as u64) << (32 - 8 * i);
        }
        let symbols = encoded_len(block.len());
        for i in 0..symbols {
            out.push(((acc >> (35 - 5 * i)) & 0x1f) as u8);
        }
    }

    out
}

/// Regroup 5-bit symbols back into bytes.
///
/// Any symbol above 31 is corrupt input. A trailing group shorter than
/// eight symbols is the last one; it yields however many whole bytes its
/// length allows (2, 4, 5, 7 symbols give 1, 2, 3, 4 bytes). Lengths 3
/// and 6 can't come out of `encode_5bit`; their 1 and 3 bytes are zero.
pub(crate) fn decode_5bit(src: &[u8]) -> Result<Vec<u8>, Bech32Error> {
    let mut out = Vec::with_capacity(decoded_len(src.len()));

    for group in src.chunks(8) {
        let mut acc = 0u64;
        for (i, &s) in group.iter().enumerate() {
            if s > 0x1f {
                return Err(Bech32Error::CorruptInput);
            }
            acc |= (s as u64) << (35 - 5 * i);
        }
        let packed = is_packed_group(group.len());
        for j in 0..PARTIAL_GROUP_BYTES[group.len()] {
            let byte = if packed {
                ((acc >> (32 - 8 * j)) & 0xff) as u8
            } else {
                0
            };
            out.push(byte);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_len_is_ceiling() {
        for n in 0..64usize {
            assert_eq!(encoded_len(n), (8 * n + 4) / 5, "n={}", n);
            assert_eq!(encode_5bit(&vec![0xa5; n]).len(), encoded_len(n));
        }
    }

    #[test]
    fn test_full_block_bit_layout() {
        // 0xff 0x00 0xff 0x00 0xff → 11111 11100 00000 01111 11110 00000 00111 11111
        let symbols = encode_5bit(&[0xff, 0x00, 0xff, 0x00, 0xff]);
        assert_eq!(symbols, vec![31, 28, 0, 15, 30, 0, 7, 31]);
        assert_eq!(decode_5bit(&symbols).unwrap(), vec![0xff, 0x00, 0xff, 0x00, 0xff]);
    }

    #[test]
    fn test_partial_block_zero_padded() {
        // one byte → two symbols, low two bits padded with zero
        assert_eq!(encode_5bit(&[0xff]), vec![31, 28]);
        assert_eq!(decode_5bit(&[31, 28]).unwrap(), vec![0xff]);
    }

    #[test]
    fn test_partial_group_lengths() {
        let expected = [(1, 0), (2, 1), (3, 1), (4, 2), (5, 3), (6, 3), (7, 4), (8, 5)];
        for (symbols, bytes) in expected {
            let decoded = decode_5bit(&vec![0u8; symbols]).unwrap();
            assert_eq!(decoded.len(), bytes, "{} symbols", symbols);
            assert_eq!(decoded.len(), decoded_len(symbols));
        }
    }

    #[test]
    fn test_odd_trailing_groups_zeroed() {
        assert_eq!(decode_5bit(&[31, 31, 31]).unwrap(), vec![0]);
        assert_eq!(decode_5bit(&[31; 6]).unwrap(), vec![0, 0, 0]);
        assert_eq!(decode_5bit(&[31; 11]).unwrap(), vec![0xff, 0xff, 0xff, 0xff, 0xff, 0]);
        assert_eq!(decode_5bit(&[31; 7]).unwrap(), vec![0xff; 4]);
    }

    #[test]
    fn test_repack_restores_bytes() {
        let program: Vec<u8> = (0u8..40).map(|i| i.wrapping_mul(37) ^ 0x5a).collect();
        for len in 0..=program.len() {
            let symbols = encode_5bit(&program[..len]);
            assert_eq!(decode_5bit(&symbols).unwrap(), &program[..len]);
        }
    }

    #[test]
    fn test_corrupt_symbol_rejected() {
        assert_eq!(decode_5bit(&[1, 2, 32]), Err(Bech32Error::CorruptInput));
        assert_eq!(decode_5bit(&[0, 0, 0, 0, 0, 0, 0, 0, 0xff]), Err(Bech32Error::CorruptInput));
    }
}
