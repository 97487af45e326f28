//! Core domain types and traits for the Brigade build controller.
//!
//! This crate contains:
//! - Build and project records with typed accessors over their data maps
//! - The workload specification derived for each build
//! - The substrate trait and its watch event type
//! - Error types

pub mod error;
pub mod record;
pub mod substrate;
pub mod workload;

pub use error::{Error, Result};
pub use record::{BuildRecord, ProjectRecord, RecordKey, RecordMeta};
pub use substrate::{Substrate, WatchEvent};
pub use workload::WorkloadSpec;
