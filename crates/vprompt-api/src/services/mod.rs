//! Gateway services.

pub mod notifier;

pub use notifier::{Notifier, NotifyOutcome};
