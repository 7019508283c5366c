//! # permlay-core
//!
//! Runtime permission attachments for PERMLAY.
//!
//! This crate provides:
//! - The two collaborator traits (`Permissible`, `RemovalCallback`)
//! - `PermissionAttachment`, the overlay of boolean grants that notifies its
//!   owner after every mutation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use permlay_core::{PermissionAttachment, traits::Permissible};
//!
//! let attachment = PermissionAttachment::new(&owner);
//! attachment.grant("perms.fly", true)?;
//! ```

pub mod attachment;
pub mod traits;

pub use attachment::PermissionAttachment;
pub use traits::{Permissible, RemovalCallback};
