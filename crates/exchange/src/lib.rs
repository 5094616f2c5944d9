//! Multi-hop exchange engine for the meridian ledger.
//!
//! This crate implements the logic that fills a path payment by routing
//! value through a sequence of asset conversions. At each hop the engine
//! chooses between resting limit orders (the order book) and a
//! constant-product liquidity pool, under integer-only, overflow-checked
//! arithmetic. Every validating node must compute the same result from the
//! same state: divergence here is a consensus failure, so the engine is
//! fully deterministic, single-threaded, and bounded by a work counter
//! rather than any clock.
//!
//! # Key types
//!
//! - [`LedgerState`]: in-memory ledger slice (balances, offers, pools) with
//!   undo-journal savepoints. The engine takes exclusive mutable access for
//!   the duration of one operation and rolls back on any failure.
//!
//! - [`StrictSendRequest`] / [`StrictReceiveRequest`]: the two path payment
//!   modes, fixing the amount leaving the source or the amount credited to
//!   the destination respectively.
//!
//! - [`PathPaymentReceipt`]: the ordered [`ClaimAtom`] trail of a successful
//!   payment plus the realized endpoint amounts.
//!
//! - [`ExchangeError`]: the single discriminated outcome returned to the
//!   apply boundary; no failure leaves a partial path applied.
//!
//! # Example
//!
//! ```
//! use meridian_common::{AccountId, Asset, AssetCode};
//! use meridian_exchange::{
//!     execute_strict_send, LedgerContext, LedgerState, StrictSendRequest,
//! };
//!
//! let alice = AccountId([1; 32]);
//! let bob = AccountId([2; 32]);
//! let issuer = AccountId([9; 32]);
//! let usd = Asset::Issued {
//!     code: AssetCode::from_str_lossy("USD"),
//!     issuer,
//! };
//!
//! let mut state = LedgerState::new();
//! state.set_balance(&alice, &Asset::Native, 1_000);
//! state.add_pool(Asset::Native, usd, 30, 1_000, 1_000).unwrap();
//!
//! let receipt = execute_strict_send(
//!     &StrictSendRequest {
//!         source: alice,
//!         send_asset: Asset::Native,
//!         send_amount: 10,
//!         destination: bob,
//!         dest_asset: usd,
//!         dest_min: 9,
//!         path: vec![],
//!     },
//!     &mut state,
//!     &LedgerContext::default(),
//! )
//! .unwrap();
//! assert_eq!(receipt.amount_received, 9);
//! ```

pub mod book;
pub mod budget;
pub mod crossing;
pub mod error;
pub mod path;
pub mod pool;
pub mod state;
pub mod step;

pub use budget::WorkBudget;
pub use error::{ExchangeError, Result};
pub use path::{
    execute_strict_receive, execute_strict_send, PathPaymentReceipt, StrictReceiveRequest,
    StrictSendRequest,
};
pub use pool::PriceBounds;
pub use state::{LedgerState, Savepoint};

/// Re-exported for callers assembling requests and reading receipts.
pub use meridian_common::ClaimAtom;

/// Default cap on liquidity-source inspections per operation.
///
/// This is the network's ledger-wide protocol value; tests lower it through
/// [`LedgerContext`].
pub const MAX_OFFERS_TO_CROSS: i64 = 1000;

/// Ledger-wide parameters the engine needs for one operation.
///
/// Passed explicitly per call; the engine holds no process-wide state.
#[derive(Debug, Clone, Copy)]
pub struct LedgerContext {
    /// Initial work budget: maximum offers inspected (crossed or skipped)
    /// plus pool touches per operation.
    pub max_offers_to_cross: i64,
}

impl Default for LedgerContext {
    fn default() -> Self {
        Self {
            max_offers_to_cross: MAX_OFFERS_TO_CROSS,
        }
    }
}
