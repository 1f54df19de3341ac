//! Save and restore orchestration for poolwarm.
//!
//! [`CacheManager`] runs one operation against a server reached through a
//! [`poolwarm_core::ports::Connector`]. [`PageEnumerator`] captures the
//! resident page list and [`BatchRestorer`] replays it in batches.

pub mod cancel;
mod deadline;
pub mod enumerator;
pub mod manager;
pub mod restorer;
pub mod status;

#[cfg(test)]
mod testing;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use enumerator::PageEnumerator;
pub use manager::{CacheManager, ManagerState, RestoreReport, SaveReport};
pub use restorer::{BatchRestorer, RestoreTotals};
pub use status::StatusReader;
