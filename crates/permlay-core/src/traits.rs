//! Collaborator contracts for permission attachments.
//!
//! - `Permissible`     — the entity an attachment belongs to; recomputes its
//!   effective permissions when told to
//! - `RemovalCallback` — one-shot hook run by whoever detaches an attachment
//!
//! Attachments call `Permissible::recalculate_permissions()` after every
//! mutation. They never call `RemovalCallback` themselves: detachment belongs
//! to the layer that manages the permissible's attachment collection.

use crate::attachment::PermissionAttachment;

/// An entity whose effective permissions are derived from attachments.
///
/// Implementations decide how to aggregate attachments. The only thing an
/// attachment requires is a synchronous, infallible recalculation hook.
pub trait Permissible: Send + Sync {
    /// Recompute the effective permission set.
    ///
    /// Called on the mutating thread, after the attachment has released its
    /// internal lock, so implementations may snapshot the attachment here.
    fn recalculate_permissions(&self);
}

/// Hook invoked once when an attachment is detached from its permissible.
///
/// Lets the component that created the attachment release whatever it tied to
/// it (a timer, a capability grant, a session entry).
pub trait RemovalCallback: Send + Sync {
    /// Called with the attachment that was just detached.
    fn attachment_removed(&self, attachment: &PermissionAttachment);
}

impl<F> RemovalCallback for F
where
    F: Fn(&PermissionAttachment) + Send + Sync,
{
    fn attachment_removed(&self, attachment: &PermissionAttachment) {
        self(attachment)
    }
}
