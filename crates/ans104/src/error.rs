use thiserror::Error;

/// Malformed bytes, unknown signature type, or a length overrun while
/// walking the ANS-104 header state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown signature type {0}")]
    UnknownSignatureType(u16),
    #[error("unexpected end of stream while reading {field} (wanted {wanted} bytes, got {got})")]
    UnexpectedEof {
        field: &'static str,
        wanted: usize,
        got: usize,
    },
    #[error("declared length {declared} does not match observed byte count {observed}")]
    IntegrityMismatch { declared: u64, observed: u64 },
    #[error("invalid presence flag byte {0:#x}, expected 0 or 1")]
    InvalidPresenceFlag(u8),
    #[error("invalid avro tag encoding: {0}")]
    InvalidTagEncoding(String),
    #[error("upstream byte stream error: {0}")]
    Io(String),
}

/// Signature verification against the owner public key failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("signature does not verify against the owner public key")]
    InvalidSignature,
    #[error("malformed key material: {0}")]
    MalformedKey(String),
}

/// A tag-spec constraint (count, length, or non-empty-string rule) was
/// violated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecViolation {
    #[error("tag count {0} exceeds the maximum of 128")]
    TooManyTags(usize),
    #[error("tag name length {0} exceeds the maximum of 1024 bytes")]
    NameTooLong(usize),
    #[error("tag value length {0} exceeds the maximum of 3072 bytes")]
    ValueTooLong(usize),
    #[error("empty tag name or value is not permitted")]
    EmptyTagString,
}

/// The unified error type surfaced by this crate's public API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnsError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    SpecViolation(#[from] SpecViolation),
}
