//! Error types for the exchange engine.
//!
//! [`ExchangeError`] is the single discriminated outcome an operation can
//! fail with. Every variant is terminal for the whole operation: the
//! executor rolls the ledger state back to its entry savepoint before
//! returning, so callers never observe a half-applied path.

use thiserror::Error;

/// The standard result type of the exchange engine.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Failure outcomes of a path payment operation.
///
/// Returned up to the ledger-apply boundary; nothing in the engine retries
/// internally and no failure leaves any ledger effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Structurally invalid request: non-positive amounts, over-long path,
    /// or adjacent duplicate assets in the conversion chain.
    #[error("malformed path payment request")]
    MalformedPath,

    /// The work budget was exhausted before the path resolved.
    #[error("exceeded work limit while crossing offers")]
    WorkLimitExceeded,

    /// Order book and pool liquidity ran out before the requested amount
    /// was met.
    #[error("too few offers to fill the requested amount")]
    TooFewOffers,

    /// Strict-send: the realized destination amount fell below the
    /// caller's minimum.
    #[error("destination amount below the requested minimum")]
    UnderDestMin,

    /// Strict-receive: the required source amount exceeded the caller's
    /// maximum.
    #[error("source amount above the requested maximum")]
    OverSendMax,

    /// The source balance cannot cover the consumed send amount.
    #[error("source balance cannot cover the send amount")]
    Underfunded,

    /// The destination balance cannot absorb the realized receive amount.
    #[error("destination balance limit cannot absorb the received amount")]
    LineFull,

    /// Arithmetic or state-consistency fault. Indicates a bug or corrupt
    /// ledger state; the operation still rolls back cleanly.
    #[error("internal exchange engine error: {0}")]
    Internal(String),
}
