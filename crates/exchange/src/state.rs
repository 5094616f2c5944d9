//! In-memory ledger state for one operation.
//!
//! [`LedgerState`] owns the slice of persisted state the engine touches:
//! balances, resting offers (with their order-book index), and liquidity
//! pools. Every mutation is journaled; [`LedgerState::savepoint`] captures a
//! journal position and [`LedgerState::rollback_to`] replays the journal
//! backwards, which is how the executor guarantees all-or-nothing commit
//! without cloning the state.
//!
//! Access is synchronous and exclusive for the duration of one operation;
//! serialization of concurrent operations within a ledger close happens
//! outside the engine.

use std::collections::HashMap;

use meridian_common::asset::{add_balance, canonical_pair};
use meridian_common::math::big_square_root;
use meridian_common::{
    AccountId, Asset, BalanceEntry, Error, LiquidityPoolEntry, OfferEntry, PoolId,
};

use crate::book::{OfferKey, OrderBookIndex};
use crate::error::ExchangeError;
use crate::pool;

/// Key of a balance entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BalanceKey {
    account: AccountId,
    asset: Asset,
}

/// One reversible mutation in the undo journal.
#[derive(Debug, Clone)]
enum UndoRecord {
    Balance {
        key: BalanceKey,
        prev: Option<BalanceEntry>,
    },
    Offer {
        key: OfferKey,
        prev: Option<OfferEntry>,
    },
    PoolReserves {
        pool_id: PoolId,
        prev_a: i64,
        prev_b: i64,
    },
}

/// A position in the undo journal.
///
/// Rolling back to a savepoint undoes every mutation made after it was
/// taken. Savepoints must be unwound in LIFO order.
#[derive(Debug)]
pub struct Savepoint(usize);

/// Failure of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceError {
    /// Debit below zero.
    Underfunded,
    /// Credit above the holder's limit.
    LineFull,
}

/// The ledger state slice an operation executes against.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    balances: HashMap<BalanceKey, BalanceEntry>,
    offers: HashMap<OfferKey, OfferEntry>,
    book: OrderBookIndex,
    pools: HashMap<PoolId, LiquidityPoolEntry>,
    pool_pairs: HashMap<(Asset, Asset), PoolId>,
    journal: Vec<UndoRecord>,
}

impl LedgerState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    /// Current balance of `account` in `asset` (zero if no entry exists).
    pub fn balance(&self, account: &AccountId, asset: &Asset) -> i64 {
        self.balances
            .get(&BalanceKey {
                account: *account,
                asset: *asset,
            })
            .map_or(0, |entry| entry.balance)
    }

    /// Set a balance outright, creating the entry if needed.
    pub fn set_balance(&mut self, account: &AccountId, asset: &Asset, balance: i64) {
        let key = BalanceKey {
            account: *account,
            asset: *asset,
        };
        let prev = self.balances.get(&key).copied();
        self.journal.push(UndoRecord::Balance { key, prev });
        let entry = self.balances.entry(key).or_default();
        entry.balance = balance;
    }

    /// Set the acceptance limit of a balance entry.
    pub fn set_balance_limit(&mut self, account: &AccountId, asset: &Asset, limit: i64) {
        let key = BalanceKey {
            account: *account,
            asset: *asset,
        };
        let prev = self.balances.get(&key).copied();
        self.journal.push(UndoRecord::Balance { key, prev });
        let entry = self.balances.entry(key).or_default();
        entry.limit = limit;
    }

    /// Mutate a balance by a signed delta.
    ///
    /// The issuer of an asset effectively mints and burns it: deltas on the
    /// issuer's own asset are accepted without touching any entry.
    pub fn add_balance(
        &mut self,
        account: &AccountId,
        asset: &Asset,
        delta: i64,
    ) -> Result<(), BalanceError> {
        if asset.is_issued_by(account) {
            return Ok(());
        }

        let key = BalanceKey {
            account: *account,
            asset: *asset,
        };
        let prev = self.balances.get(&key).copied();
        let entry = prev.unwrap_or_default();
        let new_balance = add_balance(entry.balance, delta, entry.limit).ok_or(if delta < 0 {
            BalanceError::Underfunded
        } else {
            BalanceError::LineFull
        })?;

        self.journal.push(UndoRecord::Balance { key, prev });
        self.balances.insert(
            key,
            BalanceEntry {
                balance: new_balance,
                ..entry
            },
        );
        Ok(())
    }

    /// How much of `asset` the account can part with.
    pub fn available_to_sell(&self, account: &AccountId, asset: &Asset) -> i64 {
        if asset.is_issued_by(account) {
            return i64::MAX;
        }
        self.balance(account, asset)
    }

    /// How much of `asset` the account can still accept.
    pub fn available_to_receive(&self, account: &AccountId, asset: &Asset) -> i64 {
        if asset.is_issued_by(account) {
            return i64::MAX;
        }
        let entry = self
            .balances
            .get(&BalanceKey {
                account: *account,
                asset: *asset,
            })
            .copied()
            .unwrap_or_default();
        (entry.limit - entry.balance).max(0)
    }

    // ------------------------------------------------------------------
    // Offers
    // ------------------------------------------------------------------

    /// Insert a new resting offer.
    pub fn insert_offer(&mut self, offer: OfferEntry) {
        let key = OfferKey::from_offer(&offer);
        let prev = self.offers.get(&key).copied();
        self.journal.push(UndoRecord::Offer { key, prev });
        self.offers.insert(key, offer);
        self.book.update_offer(&offer);
    }

    /// Update an existing offer in place.
    pub fn update_offer(&mut self, offer: OfferEntry) {
        self.insert_offer(offer);
    }

    /// Delete an offer.
    pub fn delete_offer(&mut self, seller: &AccountId, offer_id: i64) {
        let key = OfferKey {
            seller: *seller,
            offer_id,
        };
        if let Some(prev) = self.offers.remove(&key) {
            self.journal.push(UndoRecord::Offer {
                key,
                prev: Some(prev),
            });
            self.book.remove_offer(seller, offer_id);
        }
    }

    /// Look up an offer by key.
    pub fn offer(&self, key: &OfferKey) -> Option<&OfferEntry> {
        self.offers.get(key)
    }

    /// Iterate the resting offers for a pair, best price first.
    ///
    /// Ties in price resolve by ascending offer id, so the order — and with
    /// it every downstream numeric result — is deterministic.
    pub fn offers_in_order<'a>(
        &'a self,
        selling: &Asset,
        buying: &Asset,
    ) -> impl Iterator<Item = &'a OfferEntry> {
        self.book
            .offers_for_pair(selling, buying)
            .filter_map(|key| self.offers.get(key))
    }

    /// The lowest-priced offer selling `selling` for `buying`.
    pub fn best_offer(&self, selling: &Asset, buying: &Asset) -> Option<&OfferEntry> {
        self.book
            .best_offer_key(selling, buying)
            .and_then(|key| self.offers.get(&key))
    }

    // ------------------------------------------------------------------
    // Liquidity pools
    // ------------------------------------------------------------------

    /// Create the constant-product pool for an asset pair.
    ///
    /// Issues initial shares at the geometric mean of the reserves. One pool
    /// per pair; the pair is canonicalized internally.
    pub fn add_pool(
        &mut self,
        a: Asset,
        b: Asset,
        fee_bps: i32,
        reserve_a: i64,
        reserve_b: i64,
    ) -> Result<PoolId, Error> {
        if a == b {
            return Err(Error::InvalidData("pool assets must differ".into()));
        }
        if !(0..pool::BPS_SCALE).contains(&(fee_bps as i64)) {
            return Err(Error::InvalidData("pool fee out of range".into()));
        }
        if reserve_a < 0 || reserve_b < 0 {
            return Err(Error::InvalidData("negative pool reserve".into()));
        }

        let (asset_a, asset_b) = canonical_pair(a, b);
        // Reserves arrive in pair order, not argument order.
        let (reserve_a, reserve_b) = if (a, b) == (asset_a, asset_b) {
            (reserve_a, reserve_b)
        } else {
            (reserve_b, reserve_a)
        };

        if self.pool_pairs.contains_key(&(asset_a, asset_b)) {
            return Err(Error::InvalidData("pool already exists for pair".into()));
        }
        let pool_id = pool::pool_id(&asset_a, &asset_b, fee_bps);

        let total_shares = big_square_root(reserve_a as u64, reserve_b as u64) as i64;
        self.pools.insert(
            pool_id,
            LiquidityPoolEntry {
                pool_id,
                asset_a,
                asset_b,
                fee_bps,
                reserve_a,
                reserve_b,
                total_shares,
                share_accounts: if total_shares > 0 { 1 } else { 0 },
            },
        );
        self.pool_pairs.insert((asset_a, asset_b), pool_id);
        Ok(pool_id)
    }

    /// Look up a pool by id.
    pub fn pool(&self, pool_id: &PoolId) -> Option<&LiquidityPoolEntry> {
        self.pools.get(pool_id)
    }

    /// Look up the pool for an asset pair, in either order.
    pub fn pool_by_pair(&self, a: &Asset, b: &Asset) -> Option<&LiquidityPoolEntry> {
        let pair = canonical_pair(*a, *b);
        self.pool_pairs
            .get(&pair)
            .and_then(|pool_id| self.pools.get(pool_id))
    }

    /// Replace a pool's reserves with post-trade values.
    pub fn update_pool_reserves(
        &mut self,
        pool_id: &PoolId,
        reserve_a: i64,
        reserve_b: i64,
    ) -> Result<(), ExchangeError> {
        let pool = self
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| ExchangeError::Internal(format!("missing pool {pool_id}")))?;
        self.journal.push(UndoRecord::PoolReserves {
            pool_id: *pool_id,
            prev_a: pool.reserve_a,
            prev_b: pool.reserve_b,
        });
        pool.reserve_a = reserve_a;
        pool.reserve_b = reserve_b;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Savepoints
    // ------------------------------------------------------------------

    /// Capture the current journal position.
    pub fn savepoint(&self) -> Savepoint {
        Savepoint(self.journal.len())
    }

    /// Undo every mutation made since `sp` was taken.
    pub fn rollback_to(&mut self, sp: Savepoint) {
        while self.journal.len() > sp.0 {
            let Some(record) = self.journal.pop() else {
                break;
            };
            match record {
                UndoRecord::Balance { key, prev } => match prev {
                    Some(entry) => {
                        self.balances.insert(key, entry);
                    }
                    None => {
                        self.balances.remove(&key);
                    }
                },
                UndoRecord::Offer { key, prev } => match prev {
                    Some(offer) => {
                        self.offers.insert(key, offer);
                        self.book.update_offer(&offer);
                    }
                    None => {
                        self.offers.remove(&key);
                        self.book.remove_offer(&key.seller, key.offer_id);
                    }
                },
                UndoRecord::PoolReserves {
                    pool_id,
                    prev_a,
                    prev_b,
                } => {
                    if let Some(pool) = self.pools.get_mut(&pool_id) {
                        pool.reserve_a = prev_a;
                        pool.reserve_b = prev_b;
                    }
                }
            }
        }
    }

    /// Drop accumulated undo information.
    ///
    /// Called by the apply boundary once a ledger close is final; the engine
    /// itself never commits.
    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }
}
