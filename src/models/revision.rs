//! Global write-revision model.

use serde::{Deserialize, Serialize};

/// Revision information for change detection.
///
/// Every write bumps the revision, so clients can poll it to learn that a
/// roster changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
