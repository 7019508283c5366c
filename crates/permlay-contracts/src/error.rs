//! Error types for attachment mutation and host management.
//!
//! All fallible operations in PERMLAY return `PermsResult<T>`. Variants carry
//! enough context to be logged or surfaced to the caller as-is.

use thiserror::Error;

/// The unified error type for the PERMLAY crates.
#[derive(Debug, Error)]
pub enum PermsError {
    /// A permission name was empty or otherwise unusable as a key.
    ///
    /// Raised before any state is touched, so the attachment is unchanged and
    /// no recalculation has been requested.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A mutation was attempted on an attachment that has already been
    /// detached from its permissible.
    #[error("attachment '{attachment_id}' has been detached and can no longer be mutated")]
    Detached { attachment_id: String },

    /// The permissible that owns the attachment no longer exists.
    #[error("owner of attachment '{attachment_id}' has been dropped")]
    OwnerDropped { attachment_id: String },

    /// The permissible does not hold the attachment it was asked to detach.
    #[error("attachment '{attachment_id}' is not attached to this permissible")]
    UnknownAttachment { attachment_id: String },

    /// A configuration document is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the PERMLAY crates.
pub type PermsResult<T> = Result<T, PermsError>;
