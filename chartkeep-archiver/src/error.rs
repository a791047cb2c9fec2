//! Error types for chartkeep-archiver
//!
//! Per-date fetch failures never reach this type; they are collected in the
//! [`FetchReport`](crate::fetch::FetchReport). Everything here aborts a cycle.

use crate::fetch::TransportError;
use crate::ranking::AggregationError;
use crate::store::StoreError;
use thiserror::Error;

/// Fatal archiver error
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// Archive could not be opened or enumerated
    #[error("Archive error: {0}")]
    Store(#[from] StoreError),

    /// Archived data violates the chart model
    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    /// HTTP client could not be constructed
    #[error("Chart source unavailable: {0}")]
    Source(#[from] TransportError),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// chartkeep-common error
    #[error("Common error: {0}")]
    Common(#[from] chartkeep_common::Error),
}

pub type Result<T> = std::result::Result<T, ArchiverError>;
