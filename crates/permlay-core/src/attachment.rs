//! The permission attachment: a mutable overlay of boolean grants.
//!
//! Every successful mutation follows the same path:
//!
//!   Normalize name → Check owner → Lock → Mutate → Unlock → Owner recalculates
//!
//! The lock is released before `recalculate_permissions()` runs, so an owner
//! that snapshots its attachments during recalculation cannot deadlock. A
//! failed mutation never reaches the owner.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use permlay_contracts::{
    attachment::AttachmentId,
    error::{PermsError, PermsResult},
    permission::{PermissionName, PermissionRef},
};

use crate::traits::{Permissible, RemovalCallback};

/// The single mutation an attachment applies. `None` removes the key.
type Mutation = Option<bool>;

/// Everything guarded by the attachment's lock.
#[derive(Default)]
struct AttachmentState {
    grants: BTreeMap<String, bool>,
    removal_callback: Option<Arc<dyn RemovalCallback>>,
    detached: bool,
}

/// An overlay of permission grants bound to exactly one permissible.
///
/// The attachment holds a `Weak` back-reference to its owner so that the
/// owner's attachment collection can hold the attachment strongly without
/// forming a cycle.
///
/// ```rust,ignore
/// let attachment = Arc::new(PermissionAttachment::new(&owner));
/// attachment.grant("perms.fly", true)?;
/// assert_eq!(attachment.get("Perms.Fly"), Some(true));
/// ```
pub struct PermissionAttachment {
    id: AttachmentId,
    owner: Weak<dyn Permissible>,
    state: Mutex<AttachmentState>,
}

impl PermissionAttachment {
    /// Create an empty attachment bound to `owner`, with no removal callback.
    pub fn new(owner: &Arc<dyn Permissible>) -> Self {
        Self {
            id: AttachmentId::new(),
            owner: Arc::downgrade(owner),
            state: Mutex::new(AttachmentState::default()),
        }
    }

    /// This attachment's identity.
    pub fn id(&self) -> AttachmentId {
        self.id
    }

    /// The permissible this attachment is bound to.
    ///
    /// Returns `None` only once the permissible itself has been dropped.
    pub fn owner(&self) -> Option<Arc<dyn Permissible>> {
        self.owner.upgrade()
    }

    /// Replace the removal callback. The previous callback, if any, is
    /// dropped without being invoked. Does not trigger recalculation.
    pub fn set_removal_callback(&self, callback: Option<Arc<dyn RemovalCallback>>) {
        self.lock().removal_callback = callback;
    }

    /// The currently registered removal callback.
    pub fn removal_callback(&self) -> Option<Arc<dyn RemovalCallback>> {
        self.lock().removal_callback.clone()
    }

    /// An independent copy of every grant, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.lock().grants.clone()
    }

    /// Look up a single grant. `name` is matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<bool> {
        let name = PermissionName::parse(name).ok()?;
        self.lock().grants.get(name.as_str()).copied()
    }

    /// Number of grants held.
    pub fn len(&self) -> usize {
        self.lock().grants.len()
    }

    /// True if the attachment holds no grants.
    pub fn is_empty(&self) -> bool {
        self.lock().grants.is_empty()
    }

    /// Set `name` to `value`, overwriting any existing value, then ask the
    /// owner to recalculate.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `name` is empty
    /// - `Detached` if the attachment has been detached
    /// - `OwnerDropped` if the owner no longer exists
    pub fn grant(&self, name: &str, value: bool) -> PermsResult<()> {
        self.apply(name, Some(value))
    }

    /// Set the permission `permission` resolves to. Same contract as `grant`.
    pub fn grant_permission<P>(&self, permission: &P, value: bool) -> PermsResult<()>
    where
        P: PermissionRef + ?Sized,
    {
        self.apply(permission.permission_name(), Some(value))
    }

    /// Remove `name` if present, then ask the owner to recalculate.
    ///
    /// Removing a name that is not set is not an error and still triggers
    /// recalculation. Errors are the same as for `grant`.
    pub fn revoke(&self, name: &str) -> PermsResult<()> {
        self.apply(name, None)
    }

    /// Remove the permission `permission` resolves to. Same contract as `revoke`.
    pub fn revoke_permission<P>(&self, permission: &P) -> PermsResult<()>
    where
        P: PermissionRef + ?Sized,
    {
        self.apply(permission.permission_name(), None)
    }

    /// True once the management layer has detached this attachment.
    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }

    /// Flag the attachment as detached.
    ///
    /// Management-layer only: call it while unlinking the attachment from its
    /// permissible. It does not unlink anything or run the removal callback;
    /// the management layer owns both. Returns `true` only for the call that
    /// performed the transition. After this call every mutation fails with
    /// `PermsError::Detached`.
    #[doc(hidden)]
    pub fn mark_detached(&self) -> bool {
        let mut state = self.lock();
        if state.detached {
            return false;
        }
        state.detached = true;
        true
    }

    fn apply(&self, raw_name: &str, mutation: Mutation) -> PermsResult<()> {
        let name = PermissionName::parse(raw_name).inspect_err(|_| {
            warn!(attachment_id = %self.id, "rejected mutation with empty permission name");
        })?;

        let owner = self.owner.upgrade().ok_or_else(|| PermsError::OwnerDropped {
            attachment_id: self.id.to_string(),
        })?;

        {
            let mut state = self.lock();
            if state.detached {
                warn!(
                    attachment_id = %self.id,
                    permission = %name,
                    "rejected mutation on detached attachment"
                );
                return Err(PermsError::Detached {
                    attachment_id: self.id.to_string(),
                });
            }

            match mutation {
                Some(value) => {
                    state.grants.insert(name.as_str().to_string(), value);
                    debug!(attachment_id = %self.id, permission = %name, value, "permission granted");
                }
                None => {
                    let removed = state.grants.remove(name.as_str()).is_some();
                    debug!(attachment_id = %self.id, permission = %name, removed, "permission revoked");
                }
            }
        }

        owner.recalculate_permissions();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, AttachmentState> {
        // State is never left half-written, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PermissionAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PermissionAttachment")
            .field("id", &self.id)
            .field("grants", &state.grants)
            .field("has_removal_callback", &state.removal_callback.is_some())
            .field("detached", &state.detached)
            .finish()
    }
}

impl PartialEq for PermissionAttachment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PermissionAttachment {}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use permlay_contracts::{error::PermsError, permission::Permission};

    use super::*;

    // ── Mock implementations ──────────────────────────────────────────────────

    /// A permissible that counts recalculation requests.
    #[derive(Default)]
    struct CountingPermissible {
        recalculations: AtomicU64,
    }

    impl CountingPermissible {
        fn count(&self) -> u64 {
            self.recalculations.load(Ordering::SeqCst)
        }
    }

    impl Permissible for CountingPermissible {
        fn recalculate_permissions(&self) {
            self.recalculations.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A removal callback that records every attachment it is handed.
    #[derive(Default)]
    struct RecordingCallback {
        seen: Mutex<Vec<AttachmentId>>,
    }

    impl RemovalCallback for RecordingCallback {
        fn attachment_removed(&self, attachment: &PermissionAttachment) {
            self.seen.lock().unwrap().push(attachment.id());
        }
    }

    fn setup() -> (Arc<CountingPermissible>, Arc<dyn Permissible>, PermissionAttachment) {
        let counter = Arc::new(CountingPermissible::default());
        let owner: Arc<dyn Permissible> = counter.clone();
        let attachment = PermissionAttachment::new(&owner);
        (counter, owner, attachment)
    }

    /// Detach the way a management layer would: flag, then fire the callback.
    fn detach(attachment: &PermissionAttachment) {
        if attachment.mark_detached() {
            if let Some(callback) = attachment.removal_callback() {
                callback.attachment_removed(attachment);
            }
        }
    }

    // ── Test cases ────────────────────────────────────────────────────────────

    #[test]
    fn new_attachment_is_empty_without_callback() {
        let (counter, owner, attachment) = setup();

        assert!(attachment.is_empty());
        assert!(attachment.snapshot().is_empty());
        assert!(attachment.removal_callback().is_none());
        assert!(!attachment.is_detached());
        assert_eq!(counter.count(), 0, "construction must not recalculate");

        let bound = attachment.owner().expect("owner is alive");
        assert!(Arc::ptr_eq(&bound, &owner));
    }

    #[test]
    fn grant_and_revoke_are_case_insensitive() {
        let (_counter, _owner, attachment) = setup();

        attachment.grant("Foo.Bar", true).unwrap();
        assert_eq!(attachment.get("FOO.BAR"), Some(true));

        attachment.revoke("foo.bar").unwrap();
        assert!(attachment.snapshot().is_empty());
    }

    #[test]
    fn stored_keys_are_lowercase() {
        let (_counter, _owner, attachment) = setup();

        attachment.grant("World.BUILD", true).unwrap();
        attachment.grant("chat.Color", false).unwrap();

        let keys: Vec<String> = attachment.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["chat.color".to_string(), "world.build".to_string()]);
    }

    #[test]
    fn snapshot_is_an_independent_copy() {
        let (_counter, _owner, attachment) = setup();
        attachment.grant("perms.fly", true).unwrap();

        let mut copy = attachment.snapshot();
        copy.insert("perms.admin".to_string(), true);
        copy.insert("perms.fly".to_string(), false);

        let fresh = attachment.snapshot();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh.get("perms.fly"), Some(&true));
    }

    #[test]
    fn every_mutation_recalculates_exactly_once() {
        let (counter, _owner, attachment) = setup();

        attachment.grant("a", true).unwrap();
        assert_eq!(counter.count(), 1);

        // Same value again: state unchanged, still one recalculation.
        attachment.grant("a", true).unwrap();
        assert_eq!(counter.count(), 2);

        // Absent key: no-op removal, still one recalculation.
        attachment.revoke("missing").unwrap();
        assert_eq!(counter.count(), 3);

        attachment.revoke("a").unwrap();
        assert_eq!(counter.count(), 4);
    }

    #[test]
    fn permission_object_overloads_recalculate_once() {
        let (counter, _owner, attachment) = setup();
        let fly = Permission::new("Perms.Fly").unwrap();

        attachment.grant_permission(&fly, true).unwrap();
        assert_eq!(counter.count(), 1, "object-form grant must not double-notify");
        assert_eq!(attachment.get("perms.fly"), Some(true));

        attachment.revoke_permission(&fly).unwrap();
        assert_eq!(counter.count(), 2, "object-form revoke must not double-notify");
        assert!(attachment.is_empty());

        attachment.grant_permission("Chat.Color", false).unwrap();
        assert_eq!(counter.count(), 3);
        assert_eq!(attachment.get("chat.color"), Some(false));
    }

    #[test]
    fn empty_name_is_rejected_without_side_effects() {
        let (counter, _owner, attachment) = setup();
        attachment.grant("perms.fly", true).unwrap();

        let err = attachment.grant("", true).unwrap_err();
        assert!(matches!(err, PermsError::InvalidArgument { .. }));

        let err = attachment.revoke("  ").unwrap_err();
        assert!(matches!(err, PermsError::InvalidArgument { .. }));

        assert_eq!(attachment.snapshot().len(), 1);
        assert_eq!(counter.count(), 1, "failed mutations must not recalculate");
    }

    #[test]
    fn walkthrough_scenario() {
        let (counter, _owner, attachment) = setup();
        let callback = Arc::new(RecordingCallback::default());
        attachment.set_removal_callback(Some(callback.clone()));

        attachment.grant("perms.fly", true).unwrap();
        assert_eq!(attachment.snapshot().get("perms.fly"), Some(&true));
        assert_eq!(counter.count(), 1);

        attachment.grant("Perms.Fly", false).unwrap();
        let snapshot = attachment.snapshot();
        assert_eq!(snapshot.len(), 1, "overwrite, not duplicate");
        assert_eq!(snapshot.get("perms.fly"), Some(&false));
        assert_eq!(counter.count(), 2);

        attachment.revoke("nonexistent.key").unwrap();
        assert_eq!(attachment.snapshot(), snapshot);
        assert_eq!(counter.count(), 3);

        detach(&attachment);
        assert_eq!(*callback.seen.lock().unwrap(), vec![attachment.id()]);

        let err = attachment.grant("perms.fly", true).unwrap_err();
        assert!(matches!(err, PermsError::Detached { .. }));
        assert_eq!(counter.count(), 3, "rejected mutation must not recalculate");
    }

    #[test]
    fn replacing_callback_never_invokes_either() {
        let (_counter, _owner, attachment) = setup();
        let first = Arc::new(RecordingCallback::default());
        let second = Arc::new(RecordingCallback::default());

        attachment.set_removal_callback(Some(first.clone()));
        attachment.grant("perms.fly", true).unwrap();
        attachment.set_removal_callback(Some(second.clone()));
        attachment.revoke("perms.fly").unwrap();

        assert!(first.seen.lock().unwrap().is_empty());
        assert!(second.seen.lock().unwrap().is_empty());

        detach(&attachment);
        detach(&attachment);

        assert!(first.seen.lock().unwrap().is_empty(), "replaced callback must stay silent");
        assert_eq!(second.seen.lock().unwrap().len(), 1, "current callback fires once");
    }

    #[test]
    fn callback_can_be_cleared() {
        let (_counter, _owner, attachment) = setup();
        let callback = Arc::new(RecordingCallback::default());

        attachment.set_removal_callback(Some(callback.clone()));
        assert!(attachment.removal_callback().is_some());

        attachment.set_removal_callback(None);
        assert!(attachment.removal_callback().is_none());

        detach(&attachment);
        assert!(callback.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn closures_are_removal_callbacks() {
        let (_counter, _owner, attachment) = setup();
        let fired = Arc::new(AtomicU64::new(0));
        let handle = fired.clone();

        attachment.set_removal_callback(Some(Arc::new(move |_: &PermissionAttachment| {
            handle.fetch_add(1, Ordering::SeqCst);
        })));

        detach(&attachment);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn attachments_on_same_owner_keep_independent_state() {
        let (counter, owner, first) = setup();
        let second = PermissionAttachment::new(&owner);

        first.grant("perms.fly", true).unwrap();
        second.grant("PERMS.FLY", false).unwrap();

        assert_eq!(first.get("perms.fly"), Some(true));
        assert_eq!(second.get("perms.fly"), Some(false));
        assert_ne!(first, second);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn mutation_after_owner_dropped_is_rejected() {
        let (counter, owner, attachment) = setup();
        drop(owner);
        drop(counter);

        assert!(attachment.owner().is_none());
        let err = attachment.grant("perms.fly", true).unwrap_err();
        assert!(matches!(err, PermsError::OwnerDropped { .. }));
        assert!(attachment.is_empty());
    }

    #[test]
    fn mark_detached_transitions_once() {
        let (_counter, _owner, attachment) = setup();
        assert!(attachment.mark_detached());
        assert!(!attachment.mark_detached());
        assert!(attachment.is_detached());
    }
}
