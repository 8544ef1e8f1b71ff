//! Request handlers.

pub mod health;
pub mod inference;
pub mod upload;

pub use health::*;
pub use inference::*;
pub use upload::*;
