//! Shared substrate for the GSA orchestration services.
//!
//! Every service role (API, analysis worker, dataset loader, report
//! generator) builds on the same small set of capabilities defined here:
//!
//! - **Blackboard**: the key/value store holding job status records, result
//!   blobs, loaded datasets and report artifacts. The only shared mutable
//!   state in the system.
//! - **Broker**: acknowledged work queues with bounded length and a
//!   per-message delivery limit.
//! - **Job registry**: a typed facade over the blackboard that enforces the
//!   monotonic job lifecycle (`running -> complete | failed`) through
//!   compare-and-set updates.
//! - **Models**: the wire and storage records shared between services.
//! - **Matrix codec**: the tab-delimited expression matrix format used for
//!   all submitted and loaded data.

pub mod blackboard;
pub mod broker;
pub mod config;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod models;
pub mod notify;
pub mod registry;
pub mod secrets;

pub use error::{GsaError, Result};
