//! Task dispatcher.
//!
//! - [`Dispatcher`]: matches the oldest waiting task with the first ready worker
//! - [`ReclaimSweep`]: returns tasks with expired leases to the waiting state
//! - [`retention`]: deletes old finished tasks and their blobs

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod reclaim;
pub mod retention;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, TickOutcome};
pub use error::{DispatchError, DispatchResult};
pub use logging::TaskLogger;
pub use reclaim::ReclaimSweep;
