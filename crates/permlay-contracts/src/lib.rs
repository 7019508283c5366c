//! # permlay-contracts
//!
//! Shared types, permission names, and error contracts for PERMLAY.
//!
//! All crates in the workspace import from here. No attachment logic lives in
//! this crate, only data definitions and error types.

pub mod attachment;
pub mod error;
pub mod permission;
