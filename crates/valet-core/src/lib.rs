pub mod config;
pub mod error;
pub mod event_bus;
pub mod json_extract;
pub mod memory;
pub mod operation;
pub mod profile;
pub mod session;

// Re-export common error type
pub use error::{Result, ValetError};
