//! Error types for the flow-mapping crate.

use thiserror::Error;

/// Top-level error type for any flow-mapping related failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Failed to parse a hex string.
    #[error("could not parse hex string: {0}")]
    HexStringParsing(String),

    /// A trace event line could not be deserialized.
    #[error("malformed trace event: {0}")]
    MalformedTraceEvent(String),

    /// The metadata file was malformed or missing the victim transaction.
    #[error("malformed transaction metadata: {0}")]
    MalformedMetadata(String),

    /// A stack push or set received a value that was not exactly 32 bytes.
    #[error("invalid stack value size: expected 32 bytes, got {0}")]
    InvalidStackPush(usize),

    /// Read of a persistent/transient storage key that has no known value
    /// and is not the root call context (no oracle fallback available).
    #[error("storage key not known: address {0} key {1}")]
    StorageKeyMissing(String, String),

    /// A CALL/CREATE-family instruction did not increase call depth
    /// or a non-call instruction was asked to enter a new call context.
    #[error("expected a call depth change that did not happen (instruction: {0})")]
    ExpectedDepthChange(String),

    /// The trace declared a depth delta that the state machine cannot
    /// interpret (not -1, 0 or +1), or attempted to exit the root context.
    #[error("unexpected call depth change from {from} to {to}")]
    UnexpectedDepthChange { from: usize, to: i64 },

    /// `verify_storages` is enabled and the simulator's post-state stack or
    /// memory disagreed with the trace's own post-state.
    #[error("oracle mismatch at step {step}: {detail}")]
    OracleMismatch { step: u64, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
