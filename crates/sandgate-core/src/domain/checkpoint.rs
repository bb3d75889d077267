//! Checkpoint metadata tying a committed image to the sandbox it came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable filesystem snapshot of the sandbox, created by an image
/// commit and consumed read-only by a restore.
///
/// Labels are user-chosen and not unique: committing twice under the same
/// label re-tags the checkpoint repository and the later commit wins. This
/// matches engine tag semantics and is a known gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Engine image id the commit produced.
    pub id: String,
    /// User-chosen label, used as the image tag.
    pub label: String,
    /// When the commit was taken.
    pub created_at: DateTime<Utc>,
    /// Id of the container the commit was taken from. Not recoverable when
    /// a checkpoint is rebuilt from an engine image listing.
    pub source_container_id: Option<String>,
}

impl Checkpoint {
    /// Checkpoint freshly produced by a commit.
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        source_container_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            created_at: Utc::now(),
            source_container_id: Some(source_container_id.into()),
        }
    }

    /// The image repository checkpoints of a sandbox are tagged under.
    pub fn repository_for(sandbox_name: &str) -> String {
        format!("{sandbox_name}-checkpoint")
    }
}
