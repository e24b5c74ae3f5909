//! Error kinds shared by the table, the codec, and (via `kv-engine`) the
//! facade and the wire protocol.

/// Every error the engine's core can produce.
///
/// `CapacityFull` is never returned by this implementation — the table
/// always grows instead — but the variant is kept so callers that match on
/// it exhaustively (and code translating errors to wire replies) have a
/// stable, complete set of kinds to handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("null pointer")]
    NullPointer,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid key format")]
    InvalidKey,

    #[error("key not found")]
    KeyNotFound,

    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Value too large")]
    StringTooLarge,

    #[error("capacity full")]
    CapacityFull,

    #[error("memory allocation failed")]
    Memory,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("invalid internal type tag")]
    InvalidType,
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
