//! # permlay-host
//!
//! A reference management layer for PERMLAY attachments.
//!
//! ## Overview
//!
//! [`PermissibleHost`] implements the
//! [`Permissible`](permlay_core::traits::Permissible) trait. It owns an
//! ordered list of attachments, detaches them on request (running each
//! removal callback exactly once), and keeps an effective permission map in
//! which later attachments override earlier ones and all attachments override
//! the static defaults.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use permlay_host::{HostConfig, PermissibleHost};
//!
//! let config = HostConfig::from_file(Path::new("permlay.toml"))?;
//! let host = PermissibleHost::from_config("player-1", &config)?;
//! let flight = host.attach_preset(config.preset("flight").unwrap())?;
//! assert!(host.has_permission("perms.fly"));
//! host.remove_attachment(&flight)?;
//! ```

pub mod config;
pub mod host;

pub use config::{HostConfig, OverlayPreset};
pub use host::PermissibleHost;

// ── Tests ─────────────────────────────────────────────────────────────────────
