//! safe-restore library
//!
//! Replaces a live directory with its backup. The backup is staged and
//! verified beside the live path first, so the live data is only moved once
//! its replacement is complete on disk.

pub mod config;
pub mod restore;
