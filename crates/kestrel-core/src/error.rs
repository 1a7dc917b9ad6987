//! Error types for the engine core.

use thiserror::Error;

/// Engine-wide error type for renderer-agnostic code.
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded collection was asked to hold more than it can.
    #[error("{what} is full (capacity {capacity})")]
    CapacityExceeded {
        /// Human readable name of the collection
        what: &'static str,
        /// Fixed capacity of the collection
        capacity: usize,
    },

    /// A setting is outside its valid range
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, CoreError>;
