//! Attachment identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a single permission attachment.
///
/// Two attachments with identical grants are still distinct overlays; the
/// host uses this ID to find the one it is asked to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub uuid::Uuid);

impl AttachmentId {
    /// Create a new, unique attachment ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
