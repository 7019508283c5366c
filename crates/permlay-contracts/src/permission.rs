//! Permission names and permission references.
//!
//! Permission keys are case-insensitive. The canonical form is lowercase and
//! is produced once, by `PermissionName::parse`, at the boundary where a name
//! enters the system. Everything downstream compares canonical names only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PermsError, PermsResult};

/// A lowercase-normalized permission name such as `"perms.fly"`.
///
/// The only way to build one is `parse`, so holding a `PermissionName` means
/// the value is non-empty and already folded to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionName(String);

impl PermissionName {
    /// Validate and normalize `raw`.
    ///
    /// Returns `PermsError::InvalidArgument` when `raw` is empty or contains
    /// only whitespace.
    pub fn parse(raw: &str) -> PermsResult<Self> {
        if raw.trim().is_empty() {
            return Err(PermsError::InvalidArgument {
                reason: "permission name must not be empty".to_string(),
            });
        }
        Ok(Self(raw.to_lowercase()))
    }

    /// The canonical (lowercase) name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the name, returning the canonical string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PermissionName {
    type Error = PermsError;

    fn try_from(value: String) -> PermsResult<Self> {
        Self::parse(&value)
    }
}

impl From<PermissionName> for String {
    fn from(name: PermissionName) -> Self {
        name.0
    }
}

/// A declared permission.
///
/// Only the fields the attachment layer consumes are modelled: the name the
/// object resolves to and the value a permissible falls back to when nothing
/// sets the permission explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Canonical name of the permission.
    pub name: PermissionName,
    /// Human-readable description for operator tooling.
    #[serde(default)]
    pub description: String,
    /// Value used when neither defaults nor attachments set the permission.
    #[serde(default)]
    pub default_value: bool,
}

impl Permission {
    /// Declare a permission with an empty description and a `false` default.
    pub fn new(name: &str) -> PermsResult<Self> {
        Ok(Self {
            name: PermissionName::parse(name)?,
            description: String::new(),
            default_value: false,
        })
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the fallback value.
    pub fn with_default(mut self, default_value: bool) -> Self {
        self.default_value = default_value;
        self
    }
}

/// Anything that resolves to a permission name.
///
/// The returned name need not be normalized; attachments normalize it when
/// they apply a mutation.
pub trait PermissionRef {
    /// The name this object stands for.
    fn permission_name(&self) -> &str;
}

impl PermissionRef for Permission {
    fn permission_name(&self) -> &str {
        self.name.as_str()
    }
}

impl PermissionRef for PermissionName {
    fn permission_name(&self) -> &str {
        self.as_str()
    }
}

impl PermissionRef for str {
    fn permission_name(&self) -> &str {
        self
    }
}

impl PermissionRef for String {
    fn permission_name(&self) -> &str {
        self.as_str()
    }
}
