//! Configuration shared by undo managers and the cross-document coordinator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Result, constants::DEFAULT_CAPTURE_TIMEOUT_MS, doc::Origin};

/// Options for [`UndoManager`](super::UndoManager) and
/// [`MultiDocUndoManager`](super::MultiDocUndoManager).
///
/// Missing fields fall back to their defaults, so `{}` is a valid
/// configuration:
///
/// ```
/// use concord::UndoOptions;
///
/// let options = UndoOptions::from_json(r#"{ "captureTimeout": 0 }"#).unwrap();
/// assert_eq!(options.capture_timeout, 0);
/// assert!(options.tracked_origins.contains(&None));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UndoOptions {
    /// Edits closer together than this many milliseconds are merged into one
    /// stack item.
    pub capture_timeout: u64,
    /// Transaction origins whose edits are captured. `None` stands for
    /// transactions without origin.
    pub tracked_origins: BTreeSet<Option<Origin>>,
}

impl Default for UndoOptions {
    fn default() -> Self {
        Self {
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT_MS,
            tracked_origins: BTreeSet::from([None]),
        }
    }
}

impl UndoOptions {
    /// Parses options from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_capture_timeout(mut self, millis: u64) -> Self {
        self.capture_timeout = millis;
        self
    }

    /// Also captures edits made with `origin`.
    pub fn track_origin(mut self, origin: impl Into<Origin>) -> Self {
        self.tracked_origins.insert(Some(origin.into()));
        self
    }

    /// Replaces the tracked origins.
    pub fn with_tracked_origins(mut self, origins: impl IntoIterator<Item = Option<Origin>>) -> Self {
        self.tracked_origins = origins.into_iter().collect();
        self
    }
}
