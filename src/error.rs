use thiserror::Error;

#[derive(Debug, Error)]
pub enum MdfError {
    #[error("Buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}")]
    TooShortBuffer {
        actual:   usize,
        expected: usize,
        file:     &'static str,
        line:     u32,
    },

    #[error(r#"Invalid file identifier: Expected "MDF     ", found {0}"#)]
    FileIdentifierError(String),

    #[error("Invalid block identifier: Expected {expected:?}, got {actual:?}")]
    BlockIDError {
        actual: String,
        expected: String,
    },

    #[error("Unknown block tag {tag:?} at offset {offset:#x}")]
    UnknownBlock { tag: String, offset: u64 },

    #[error("Link at {link_offset:#x} points outside the file (target {target:#x})")]
    InvalidLink { link_offset: u64, target: u64 },

    #[error("Length mismatch in {context}: declared {declared}, got {actual}")]
    LengthMismatch {
        context:  &'static str,
        declared: u64,
        actual:   u64,
    },

    #[error("Bad compressed block: {0}")]
    BadCompression(String),

    #[error("Record id {record_id} has no matching channel group")]
    RecordIdNotFound { record_id: u64 },

    #[error("Short record: need {expected} bytes, got {actual}")]
    ShortRecord { expected: usize, actual: usize },

    #[error("Value not representable by the channel layout: {0}")]
    Unrepresentable(String),

    #[error("Invalid bit layout: {0}")]
    InvalidBitLayout(String),

    #[error("Invalid file handling")]
    IOError(#[from] std::io::Error),

    #[error("Invalid version string: {0}")]
    InvalidVersionString(String),

    #[error("Block linking error: {0}")]
    BlockLinkError(String),

    #[error("Block serialization error: {0}")]
    BlockSerializationError(String),

    #[error("Conversion chain too deep: maximum depth of {max_depth} exceeded")]
    ConversionChainTooDeep { max_depth: usize },

    #[error("Conversion chain cycle detected at block address {address:#x}")]
    ConversionChainCycle { address: u64 },

    #[error("Division by zero while applying conversion")]
    DivideByZero,

    #[error("Domain error while applying conversion: {0}")]
    DomainError(&'static str),

    #[error("{operation} called in state {actual}, requires {expected}")]
    WrongPhase {
        operation: &'static str,
        expected:  &'static str,
        actual:    &'static str,
    },
}
