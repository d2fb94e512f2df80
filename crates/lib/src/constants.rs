//! Constants used throughout the Concord library.
//!
//! Central definitions for default configuration values and reserved
//! transaction origins.

/// Default window, in milliseconds, within which consecutive edits are merged
/// into a single undo stack item.
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 500;

/// Origin attached to the transactions a key-value view runs to delete
/// superseded entries. Undo managers do not track it unless asked to.
pub const COMPACTION_ORIGIN: &str = "_kv_compaction";

/// Prefix of the origin each undo manager attaches to its own undo and redo
/// transactions.
pub const UNDO_ORIGIN_PREFIX: &str = "_undo_manager";
