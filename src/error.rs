//! Error types for the object reader.
//!
//! Only unrecoverable conditions are modelled as [`Error`]. The recoverable
//! malformations that real-world files are full of (wrong stream lengths,
//! unbalanced brackets, truncated tokens) are recorded as [`ParseIssue`]s and
//! never cross the public boundary as errors.

use crate::object::ObjectRef;

/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading a document.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: u64,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid or unreadable cross-reference section
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// IO error from the underlying byte source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported operation for this source or object
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid document structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

impl Error {
    /// Whether this error came from the underlying byte source.
    ///
    /// I/O failures are the only errors that must abort a parse; everything
    /// else can be recovered from by the caller.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

/// A recoverable malformation observed while reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIssue {
    /// Input ended in the middle of a token or object.
    TruncatedInput {
        /// Byte offset where the truncated token or object began
        offset: u64,
    },
    /// Stack underflow or bracket imbalance; the current object was dropped.
    MalformedStructure {
        /// Byte offset of the offending token
        offset: u64,
        /// What went wrong
        reason: String,
    },
    /// The declared `/Length` did not match the `endstream` position.
    LengthMismatch {
        /// Byte offset where the stream payload starts
        offset: u64,
        /// Length declared by the stream dictionary
        declared: u64,
        /// Length recovered by scanning
        actual: u64,
    },
    /// `/Length` was an indirect reference that could not be resolved.
    UnresolvableIndirectLength {
        /// Byte offset where the stream payload starts
        offset: u64,
        /// The unresolved reference
        reference: ObjectRef,
    },
    /// A numeric-looking word could not be parsed and was kept as a keyword.
    NumberFormatFailure {
        /// Byte offset of the word
        offset: u64,
        /// The raw text of the word
        text: String,
    },
}

impl ParseIssue {
    /// Byte offset the issue was observed at.
    pub fn offset(&self) -> u64 {
        match self {
            ParseIssue::TruncatedInput { offset }
            | ParseIssue::MalformedStructure { offset, .. }
            | ParseIssue::LengthMismatch { offset, .. }
            | ParseIssue::UnresolvableIndirectLength { offset, .. }
            | ParseIssue::NumberFormatFailure { offset, .. } => *offset,
        }
    }
}
