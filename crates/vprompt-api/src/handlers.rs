//! Request handlers.

pub mod form;
pub mod health;
pub mod register;
pub mod results;
pub mod tasks;

pub use health::*;
pub use register::*;
pub use results::*;
pub use tasks::*;
