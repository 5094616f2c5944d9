//! Ledger entry types consumed and mutated by the exchange engine.

use crate::asset::{AccountId, Asset};
use crate::hash::Hash256;
use crate::price::Price;

/// A balance held by an account in one asset.
///
/// This is the engine's balance-mutation hook; trust and authorization
/// bookkeeping live outside the engine. `limit` caps how much of the asset
/// the holder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceEntry {
    /// Units currently held. Never negative.
    pub balance: i64,
    /// Maximum the holder accepts. Defaults to `i64::MAX`.
    pub limit: i64,
}

impl Default for BalanceEntry {
    fn default() -> Self {
        Self {
            balance: 0,
            limit: i64::MAX,
        }
    }
}

/// A resting limit order.
///
/// The seller offers `amount` units of `selling` at `price` units of
/// `buying` per unit of `selling`. Mutated by partial fills; deleted when
/// `amount` reaches zero or the seller can no longer honor it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferEntry {
    /// Unique, ascending identifier. Ties in price break by this id.
    pub offer_id: i64,
    /// The account that placed the offer.
    pub seller: AccountId,
    /// Asset the seller gives.
    pub selling: Asset,
    /// Asset the seller takes.
    pub buying: Asset,
    /// Units of `buying` demanded per unit of `selling`.
    pub price: Price,
    /// Remaining amount of `selling` on the offer.
    pub amount: i64,
    /// Reserved flag bits.
    pub flags: u32,
}

/// Identifier of a liquidity pool: a SHA-256 digest over the pool
/// discriminator, the canonically ordered asset pair, and the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(pub Hash256);

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A constant-product liquidity pool.
///
/// `asset_a < asset_b` in the canonical asset order; `reserve_a` and
/// `reserve_b` are the reserves of the respective assets. Trades preserve
/// `reserve_a * reserve_b` modulo fees (the product never decreases) and
/// keep both reserves in `[1, i64::MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityPoolEntry {
    /// Deterministic pool identifier.
    pub pool_id: PoolId,
    /// Canonically smaller asset of the pair.
    pub asset_a: Asset,
    /// Canonically larger asset of the pair.
    pub asset_b: Asset,
    /// Trading fee in basis points.
    pub fee_bps: i32,
    /// Reserve of `asset_a`.
    pub reserve_a: i64,
    /// Reserve of `asset_b`.
    pub reserve_b: i64,
    /// Pool shares outstanding. Bookkeeping for deposit/withdraw, which live
    /// outside the exchange engine.
    pub total_shares: i64,
    /// Number of accounts holding shares.
    pub share_accounts: i64,
}

impl LiquidityPoolEntry {
    /// The constant-product invariant value `reserve_a * reserve_b`.
    pub fn constant_product(&self) -> u128 {
        debug_assert!(self.reserve_a >= 0 && self.reserve_b >= 0);
        (self.reserve_a as u128) * (self.reserve_b as u128)
    }
}

/// One executed trade against a resting offer.
///
/// Amounts are from the payer's perspective: `amount_in` of `asset_in` went
/// to the offer's seller, `amount_out` of `asset_out` came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimOfferAtom {
    /// The crossed offer.
    pub offer_id: i64,
    /// The offer's seller (counterparty).
    pub seller: AccountId,
    /// Asset surrendered by the payer.
    pub asset_in: Asset,
    /// Amount surrendered by the payer.
    pub amount_in: i64,
    /// Asset obtained by the payer.
    pub asset_out: Asset,
    /// Amount obtained by the payer.
    pub amount_out: i64,
}

/// One executed trade against a liquidity pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimPoolAtom {
    /// The pool traded against (counterparty).
    pub pool_id: PoolId,
    /// Asset deposited into the pool.
    pub asset_in: Asset,
    /// Amount deposited into the pool.
    pub amount_in: i64,
    /// Asset paid out by the pool.
    pub asset_out: Asset,
    /// Amount paid out by the pool.
    pub amount_out: i64,
}

/// Record of one executed hop trade: against an offer or against a pool.
///
/// A tagged variant rather than a trait object so the list stays `Copy`,
/// comparable, and trivially serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAtom {
    /// Crossed a resting offer.
    Offer(ClaimOfferAtom),
    /// Traded against a liquidity pool.
    Pool(ClaimPoolAtom),
}

impl ClaimAtom {
    /// Asset the payer surrendered on this trade.
    pub fn asset_in(&self) -> &Asset {
        match self {
            ClaimAtom::Offer(a) => &a.asset_in,
            ClaimAtom::Pool(a) => &a.asset_in,
        }
    }

    /// Amount the payer surrendered on this trade.
    pub fn amount_in(&self) -> i64 {
        match self {
            ClaimAtom::Offer(a) => a.amount_in,
            ClaimAtom::Pool(a) => a.amount_in,
        }
    }

    /// Asset the payer obtained on this trade.
    pub fn asset_out(&self) -> &Asset {
        match self {
            ClaimAtom::Offer(a) => &a.asset_out,
            ClaimAtom::Pool(a) => &a.asset_out,
        }
    }

    /// Amount the payer obtained on this trade.
    pub fn amount_out(&self) -> i64 {
        match self {
            ClaimAtom::Offer(a) => a.amount_out,
            ClaimAtom::Pool(a) => a.amount_out,
        }
    }
}
