use thiserror::Error;

/// Every way a Bech32/Bech32m string or segwit address can fail to decode.
///
/// Callers treat any of these as "not a valid address"; none of them
/// indicate a fault in the pool itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bech32Error {
    #[error("bech32m: overall max length exceeded")]
    MaxLengthExceeded,

    #[error("bech32m: mixed case found in address")]
    MixedCase,

    #[error("bech32m: invalid checksum")]
    InvalidChecksum,

    #[error("bech32m: corrupt base32 data")]
    CorruptInput,

    #[error("bech32m: no separator character")]
    NoSeparator,

    #[error("bech32m: empty HRP")]
    EmptyHrp,

    #[error("bech32m: too short checksum")]
    ChecksumTooShort,

    #[error("bech32m: HRP character out of range")]
    HrpCharOutOfRange,

    #[error("bech32m: invalid data character")]
    InvalidDataChar,

    #[error("bech32m: invalid character in checksum")]
    InvalidChecksumChar,

    #[error("bech32m: invalid HRP (expected {expected}, got {actual})")]
    InvalidHrp { expected: String, actual: String },

    #[error("bech32m: empty data section")]
    EmptyData,

    #[error("bech32m: invalid witness version {0}")]
    InvalidWitnessVersion(u8),

    #[error("bech32m: invalid program length ({0} byte)")]
    InvalidProgramLength(usize),

    #[error("bech32m: invalid program length for witness version 0 ({0} byte)")]
    InvalidV0ProgramLength(usize),

    #[error("bech32m: invalid checksum algorithm for witness version {version}")]
    VariantMismatch { version: u8 },

    #[error("bech32m: encoded address does not round trip")]
    RoundTripMismatch,
}
