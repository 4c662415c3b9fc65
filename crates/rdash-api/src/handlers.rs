//! Request handlers.

pub mod analyze;
pub mod cleanup;
pub mod health;

pub use analyze::*;
pub use cleanup::*;
pub use health::*;
