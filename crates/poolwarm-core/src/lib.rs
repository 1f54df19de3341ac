//! poolwarm core
//!
//! Domain types, port traits and error handling shared by every poolwarm
//! crate. This crate has minimal dependencies and defines the vocabulary
//! of the buffer pool persistence engine: pages, snapshot metadata, batch
//! results, server status counters and phase timings.

pub mod batch;
pub mod config;
pub mod error;
pub mod page;
pub mod ports;
pub mod status;
pub mod timing;

pub use batch::{BatchResult, FetchFailure, FetchOutcome, PageFetchError, Progress};
pub use config::{ConnectionOptions, EngineConfig};
pub use error::{Error, Result};
pub use page::{PageDescriptor, PageKey, SnapshotMetadata};
pub use status::ServerStatus;
pub use timing::{Phase, PhaseTimer, TimingLedger};
