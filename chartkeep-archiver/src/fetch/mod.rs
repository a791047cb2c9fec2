//! Upstream chart fetching
//!
//! - [`client`]: transport seam ([`ChartSource`]) and its HTTP implementation
//! - [`coordinator`]: bounded-concurrency fetch, parse and persist pipeline

pub mod client;
pub mod coordinator;

pub use client::{ChartSource, HttpChartSource, TransportError};
pub use coordinator::{FetchCoordinator, FetchError, FetchOutcome, FetchReport};
