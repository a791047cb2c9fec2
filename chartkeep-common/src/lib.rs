//! # chartkeep common library
//!
//! Shared code for the chartkeep archiver and its report consumers:
//! - Chart data model (entries, snapshots, song identity)
//! - Configuration loading and root folder resolution
//! - Weekly cadence date arithmetic
//! - Atomic file writes
//! - Common error type

pub mod config;
pub mod error;
pub mod fsutil;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{ChartEntry, ChartSnapshot, Song};
pub use time::Cadence;
