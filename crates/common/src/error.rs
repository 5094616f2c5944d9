//! Common error types for meridian.
//!
//! The [`enum@Error`] enum provides broad categories of failures shared by the
//! meridian crates, with the convenience alias [`Result`]. More specific error
//! types (such as the exchange engine's operation outcomes) live next to the
//! code that produces them and convert into these categories at crate
//! boundaries where needed.

use thiserror::Error;

use crate::math::MathError;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for meridian operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Data failed validation (wrong format, out of range, etc.).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A requested resource (ledger entry, pool, offer) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Arithmetic error from the integer math layer.
    #[error("math error: {0}")]
    Math(#[from] MathError),

    /// A catch-all for operations that fail for reasons not covered above.
    #[error("operation failed: {0}")]
    OperationFailed(String),
}
