//! Shared ledger data model and arithmetic for meridian.
//!
//! This crate holds the types that every part of the node agrees on: account
//! identifiers, assets with their canonical total order, rational prices,
//! ledger entries (balances, offers, liquidity pools), and the executed-trade
//! records exchanged between the engine and the apply boundary. It also
//! provides the 128-bit-intermediate integer arithmetic that keeps the
//! exchange engine overflow-safe without ever touching floating point.
//!
//! Everything here is deterministic by construction: comparisons are integer
//! comparisons, hashes are SHA-256 outputs, and there is no hidden global
//! state.

pub mod asset;
pub mod entries;
pub mod error;
pub mod hash;
pub mod math;
pub mod price;

pub use asset::{AccountId, Asset, AssetCode};
pub use entries::{
    BalanceEntry, ClaimAtom, ClaimOfferAtom, ClaimPoolAtom, LiquidityPoolEntry, OfferEntry, PoolId,
};
pub use error::{Error, Result};
pub use hash::Hash256;
pub use price::Price;
