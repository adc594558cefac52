//! Error types for the PDF engine.
//!
//! One crate-wide enum covers the full taxonomy: structural malformation
//! (header, trailer, xref), reference faults, filter failures, semantic
//! lift problems, font subsetting, compliance and cancellation.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error values produced while parsing, lifting, subsetting or writing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or ill-formed `%PDF-` header line
    #[error("Malformed PDF header: expected '%PDF-', found '{0}'")]
    MalformedHeader(String),

    /// No `%%EOF`/`startxref` within the tail window
    #[error("Malformed trailer: no startxref/%%EOF within the last {0} bytes")]
    MalformedTrailer(usize),

    /// Entry-count mismatch or unreadable offsets in a cross-reference section
    #[error("Malformed xref: {0}")]
    MalformedXref(String),

    /// A resolved reference points to no object
    #[error("Missing object: {0} {1} R")]
    MissingObject(u32, u16),

    /// Reference chain loops back onto itself
    #[error("Circular reference chain: {}", format_chain(.0))]
    CircularRef(Vec<crate::object::ObjectRef>),

    /// Stream filter name is not recognised
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// A recognised filter failed while decoding
    #[error("Filter {name} failed: {cause}")]
    FilterError {
        /// Filter name as it appeared in the stream dictionary
        name: String,
        /// Underlying decode fault
        cause: String,
    },

    /// Encryption present and no decryptor available
    #[error("Unsupported encryption")]
    UnsupportedEncryption,

    /// Semantic lift could not honour a required key
    #[error("Malformed {entity}: missing or invalid /{field}")]
    Malformed {
        /// Entity kind being lifted (e.g. "Page", "Font")
        entity: String,
        /// Dictionary key that failed
        field: String,
    },

    /// The subsetter could not parse an sfnt
    #[error("Font malformed: {0}")]
    FontMalformed(String),

    /// Compliance enforcement required but could not be satisfied
    #[error("Compliance violation: {0}")]
    ComplianceViolation(String),

    /// Honoured cooperative cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// Lexical or syntactic fault at a known byte offset
    #[error("Parse error at byte {offset}: {reason}")]
    Parse {
        /// Byte offset where the fault was detected
        offset: usize,
        /// What went wrong
        reason: String,
    },

    /// IO error from the underlying source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_chain(chain: &[crate::object::ObjectRef]) -> String {
    chain
        .iter()
        .map(|r| format!("{} {} R", r.id, r.gen))
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn test_malformed_header_message() {
        let err = Error::MalformedHeader("GIF89a".to_string());
        assert!(format!("{}", err).contains("GIF89a"));
    }

    #[test]
    fn test_missing_object_message() {
        let err = Error::MissingObject(12, 0);
        assert!(format!("{}", err).contains("12 0 R"));
    }

    #[test]
    fn test_circular_ref_chain_format() {
        let err = Error::CircularRef(vec![
            ObjectRef::new(1, 0),
            ObjectRef::new(2, 0),
            ObjectRef::new(1, 0),
        ]);
        let msg = format!("{}", err);
        assert!(msg.contains("1 0 R -> 2 0 R -> 1 0 R"));
    }

    #[test]
    fn test_filter_error_message() {
        let err = Error::FilterError {
            name: "FlateDecode".to_string(),
            cause: "corrupt deflate stream".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("FlateDecode"));
        assert!(msg.contains("corrupt"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
