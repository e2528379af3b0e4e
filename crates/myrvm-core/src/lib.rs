//! # MyRVM Core
//!
//! Core types and errors shared by the MyRVM platform crates.
//!
//! - [`errors`]: Application error type with HTTP response conversion
//! - [`ids`]: Strongly-typed identifiers for machines and users
//!
//! # Example
//!
//! ```ignore
//! use myrvm_core::{AppError, RvmId, UserId};
//!
//! let rvm = RvmId::new(7);
//! let error = AppError::new(StatusCode::NOT_FOUND, anyhow::anyhow!("Session not found"));
//! ```

pub mod errors;
pub mod ids;

// Re-export commonly used types at crate root
pub use errors::AppError;
pub use ids::{RvmId, UserId};
