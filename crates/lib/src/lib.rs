//!
//! Concord: conflict-free key-value views and undo coordination over
//! replicated documents.
//!
//! ## Core Concepts
//!
//! * **Documents (`doc::Doc`)**: A replica of a shared document made of named, replicated
//!   arrays (`doc::ArrayRef`). Replicas exchange `doc::Update`s and converge to the same order.
//! * **Transactions (`doc::Transaction`)**: Mutations are batched per transaction; observers see
//!   one event per changed array once the transaction commits.
//! * **Key-value views (`kv::KeyValue`)**: A map layered on an append-only array of
//!   `{key, val}` entries. The view keeps exactly one live entry per key by deleting superseded
//!   entries, and reports every change as an `add`, `update` or `delete`.
//! * **Undo managers (`undo::UndoManager`)**: Capture local edits of a set of arrays into undo
//!   and redo stacks.
//! * **Cross-document undo (`undo::MultiDocUndoManager`)**: Merges the undo histories of many
//!   documents into a single chronological undo/redo stack.
//!
//! All types are single-threaded: handles are `Rc`-based and callbacks run synchronously.

pub mod clock;
pub mod constants;
pub mod doc;
pub mod kv;
pub mod observable;
pub mod undo;

#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use doc::{ArrayRef, Doc, DocId, Origin, WriteSource};
pub use kv::KeyValue;
pub use observable::Subscription;
pub use undo::{MultiDocUndoManager, UndoManager, UndoOptions};

/// Result type used throughout the Concord library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Concord library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the document model
    #[error(transparent)]
    Doc(doc::DocError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Doc(_) => "doc",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error comes from the document model.
    pub fn is_doc_error(&self) -> bool {
        matches!(self, Error::Doc(_))
    }

    /// Check if this error is a positional bounds violation.
    pub fn is_out_of_bounds(&self) -> bool {
        match self {
            Error::Doc(doc_err) => doc_err.is_out_of_bounds(),
            _ => false,
        }
    }

    /// Check if this error comes from mixing handles of different documents.
    pub fn is_foreign_document(&self) -> bool {
        match self {
            Error::Doc(doc_err) => doc_err.is_foreign_document(),
            _ => false,
        }
    }

    /// Check if this error is a (de)serialization failure.
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::Serialize(_))
    }
}
