//! `PermissibleHost`: a permissible that owns an ordered attachment collection.
//!
//! The host is the management layer the attachment contract leaves open. It
//! links new attachments, detaches them (running their removal callback
//! exactly once), and aggregates an effective permission map:
//!
//!   defaults → attachment 1 → attachment 2 → … (later entries override)
//!
//! Attachment order is insertion order, so conflicting grants always resolve
//! the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use permlay_contracts::{
    error::{PermsError, PermsResult},
    permission::{Permission, PermissionName},
};
use permlay_core::{Permissible, PermissionAttachment};

use crate::config::{HostConfig, OverlayPreset};

/// A reference `Permissible` backed by an in-memory attachment list.
///
/// Always handled through `Arc<PermissibleHost>`: attachments keep a weak
/// back-reference to it.
///
/// # Lock order
///
/// `effective` → `attachments` → an attachment's own lock. Attachments
/// release their lock before calling `recalculate_permissions()`, so the
/// order is never inverted.
pub struct PermissibleHost {
    label: String,
    defaults: BTreeMap<String, bool>,
    attachments: Mutex<Vec<Arc<PermissionAttachment>>>,
    effective: Mutex<BTreeMap<String, bool>>,
    recalculations: AtomicU64,
}

impl PermissibleHost {
    /// Create a host with no static defaults.
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(label.into(), BTreeMap::new()))
    }

    /// Create a host whose effective map starts from `defaults`.
    ///
    /// Returns `InvalidArgument` if any default has an empty name.
    pub fn with_defaults(
        label: impl Into<String>,
        defaults: BTreeMap<String, bool>,
    ) -> PermsResult<Arc<Self>> {
        let defaults = defaults
            .into_iter()
            .map(|(name, value)| PermissionName::parse(&name).map(|n| (n.into_string(), value)))
            .collect::<PermsResult<BTreeMap<_, _>>>()?;
        Ok(Arc::new(Self::build(label.into(), defaults)))
    }

    /// Create a host using the defaults from a `HostConfig`.
    pub fn from_config(label: impl Into<String>, config: &HostConfig) -> PermsResult<Arc<Self>> {
        Self::with_defaults(label, config.defaults.clone())
    }

    fn build(label: String, defaults: BTreeMap<String, bool>) -> Self {
        let effective = defaults.clone();
        Self {
            label,
            defaults,
            attachments: Mutex::new(Vec::new()),
            effective: Mutex::new(effective),
            recalculations: AtomicU64::new(0),
        }
    }

    /// The label this host was created with.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Link a new, empty attachment and recalculate.
    pub fn add_attachment(self: &Arc<Self>) -> Arc<PermissionAttachment> {
        let owner: Arc<dyn Permissible> = self.clone();
        let attachment = Arc::new(PermissionAttachment::new(&owner));

        self.lock_attachments().push(Arc::clone(&attachment));
        info!(host = %self.label, attachment_id = %attachment.id(), "attachment added");

        self.recalculate_permissions();
        attachment
    }

    /// Link a new attachment that grants `name = value`.
    ///
    /// The name is validated before anything is linked, so an invalid name
    /// leaves the host untouched.
    pub fn add_attachment_with(
        self: &Arc<Self>,
        name: &str,
        value: bool,
    ) -> PermsResult<Arc<PermissionAttachment>> {
        PermissionName::parse(name)?;
        let attachment = self.add_attachment();
        attachment.grant(name, value)?;
        Ok(attachment)
    }

    /// Link a new attachment holding every grant of `preset`.
    pub fn attach_preset(
        self: &Arc<Self>,
        preset: &OverlayPreset,
    ) -> PermsResult<Arc<PermissionAttachment>> {
        for name in preset.grants.keys() {
            PermissionName::parse(name)?;
        }

        let attachment = self.add_attachment();
        for (name, value) in &preset.grants {
            attachment.grant(name, *value)?;
        }

        info!(
            host = %self.label,
            attachment_id = %attachment.id(),
            preset = %preset.id,
            grants = preset.grants.len(),
            "preset attached"
        );
        Ok(attachment)
    }

    /// Detach `attachment`.
    ///
    /// The attachment is flagged detached and unlinked in one step, then the
    /// effective map is recalculated before its removal callback runs. The
    /// callback runs exactly once, whether or not something flagged the
    /// attachment earlier.
    ///
    /// Returns `UnknownAttachment` if this host does not hold the attachment,
    /// including when it was already detached.
    pub fn remove_attachment(&self, attachment: &PermissionAttachment) -> PermsResult<()> {
        // Flag under the list lock so no grant can succeed once unlinked.
        let removed = {
            let mut attachments = self.lock_attachments();
            attachments
                .iter()
                .position(|a| a.id() == attachment.id())
                .map(|index| attachments.remove(index))
                .inspect(|removed| {
                    removed.mark_detached();
                })
        };

        let Some(removed) = removed else {
            warn!(
                host = %self.label,
                attachment_id = %attachment.id(),
                "asked to remove an attachment this host does not hold"
            );
            return Err(PermsError::UnknownAttachment {
                attachment_id: attachment.id().to_string(),
            });
        };

        self.recalculate_permissions();
        info!(host = %self.label, attachment_id = %removed.id(), "attachment removed");

        // Unlinking happens once per attachment, so the callback does too.
        notify_removed(&removed);
        Ok(())
    }

    /// Detach every attachment, in attachment order.
    pub fn clear_attachments(&self) {
        let detached: Vec<Arc<PermissionAttachment>> = {
            let mut attachments = self.lock_attachments();
            for attachment in attachments.iter() {
                attachment.mark_detached();
            }
            attachments.drain(..).collect()
        };

        self.recalculate_permissions();
        info!(host = %self.label, count = detached.len(), "attachments cleared");

        for attachment in &detached {
            notify_removed(attachment);
        }
    }

    /// A copy of the attachment collection, in attachment order.
    pub fn attachments(&self) -> Vec<Arc<PermissionAttachment>> {
        self.lock_attachments().clone()
    }

    /// A copy of the effective permission map.
    pub fn effective_permissions(&self) -> BTreeMap<String, bool> {
        self.lock_effective().clone()
    }

    /// True if defaults or any attachment set `name`, to either value.
    pub fn is_permission_set(&self, name: &str) -> bool {
        match PermissionName::parse(name) {
            Ok(name) => self.lock_effective().contains_key(name.as_str()),
            Err(_) => false,
        }
    }

    /// The effective value of `name`; unset permissions are `false`.
    pub fn has_permission(&self, name: &str) -> bool {
        match PermissionName::parse(name) {
            Ok(name) => self.lock_effective().get(name.as_str()).copied().unwrap_or(false),
            Err(_) => false,
        }
    }

    /// The effective value of `permission`, falling back to its declared
    /// default when nothing sets it.
    pub fn has_permission_or_default(&self, permission: &Permission) -> bool {
        self.lock_effective()
            .get(permission.name.as_str())
            .copied()
            .unwrap_or(permission.default_value)
    }

    /// How many times the effective map has been recomputed.
    pub fn recalculation_count(&self) -> u64 {
        self.recalculations.load(Ordering::SeqCst)
    }

    fn lock_attachments(&self) -> MutexGuard<'_, Vec<Arc<PermissionAttachment>>> {
        self.attachments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_effective(&self) -> MutexGuard<'_, BTreeMap<String, bool>> {
        self.effective.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Permissible for PermissibleHost {
    /// Rebuild the effective map from defaults and the attachment list.
    ///
    /// The `effective` lock is held for the whole rebuild so concurrent
    /// recalculations cannot publish a stale map over a newer one.
    fn recalculate_permissions(&self) {
        let mut effective = self.lock_effective();

        let attachments = self.lock_attachments().clone();
        let mut rebuilt = self.defaults.clone();
        for attachment in &attachments {
            rebuilt.extend(attachment.snapshot());
        }

        *effective = rebuilt;
        let count = self.recalculations.fetch_add(1, Ordering::SeqCst) + 1;

        debug!(
            host = %self.label,
            attachments = attachments.len(),
            permissions = effective.len(),
            recalculation = count,
            "effective permissions recalculated"
        );
    }
}

impl fmt::Debug for PermissibleHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissibleHost")
            .field("label", &self.label)
            .field("defaults", &self.defaults)
            .field("attachments", &self.lock_attachments().len())
            .field("recalculations", &self.recalculation_count())
            .finish()
    }
}

fn notify_removed(attachment: &PermissionAttachment) {
    if let Some(callback) = attachment.removal_callback() {
        debug!(attachment_id = %attachment.id(), "running removal callback");
        callback.attachment_removed(attachment);
    }
}
