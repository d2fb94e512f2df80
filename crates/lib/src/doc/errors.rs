//! Error types for the replicated document model.

use thiserror::Error;

/// Errors that can occur when mutating replicated arrays.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DocError {
    /// Positional access past the end of an array.
    #[error("Index {index} out of bounds for array '{array}' of length {len}")]
    IndexOutOfBounds {
        /// Name of the array
        array: String,
        /// The requested index
        index: usize,
        /// Number of visible elements
        len: usize,
    },

    /// Positional range reaching past the end of an array.
    #[error("Range {start}..{end} out of bounds for array '{array}' of length {len}")]
    RangeOutOfBounds {
        /// Name of the array
        array: String,
        /// First index of the range
        start: usize,
        /// One past the last index of the range
        end: usize,
        /// Number of visible elements
        len: usize,
    },

    /// A transaction or scope from another document was used with this array.
    #[error("Array '{array}' does not belong to the document of this operation")]
    ForeignDocument {
        /// Name of the array
        array: String,
    },
}

impl DocError {
    /// Check if this error is a positional bounds violation.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            DocError::IndexOutOfBounds { .. } | DocError::RangeOutOfBounds { .. }
        )
    }

    /// Check if this error comes from mixing documents.
    pub fn is_foreign_document(&self) -> bool {
        matches!(self, DocError::ForeignDocument { .. })
    }

    /// Name of the array the error refers to.
    pub fn array(&self) -> &str {
        match self {
            DocError::IndexOutOfBounds { array, .. }
            | DocError::RangeOutOfBounds { array, .. }
            | DocError::ForeignDocument { array } => array,
        }
    }
}

// Conversion from DocError to the main Error type
impl From<DocError> for crate::Error {
    fn from(err: DocError) -> Self {
        crate::Error::Doc(err)
    }
}
