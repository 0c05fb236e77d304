//! Shared types and error handling for the kais control plane and agent runtime.

pub mod error;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use retry::BackoffPolicy;
pub use types::*;
