//! Per-hop conversion: the pool-vs-book decision.
//!
//! One hop converts the payer's send asset into the receive asset. Each
//! iteration the engine looks at the best crossable resting offer and, if
//! the pair's pool has not been touched yet, a pool quote for the entire
//! remaining request; the pool is taken when its effective rate is
//! equal-or-better than the best offer's price (or the book is empty),
//! otherwise the best offer is crossed and the loop continues. A hop can
//! therefore combine any number of book crossings with at most one pool
//! touch — never two.
//!
//! Work accounting: every inspection (an offer crossed, a self-trade offer
//! first passed over, a pool touch) consumes one [`WorkBudget`] unit, and
//! an inspection with no units left aborts the whole operation.

use std::collections::BTreeSet;

use meridian_common::math::big_multiply;
use meridian_common::{
    AccountId, Asset, ClaimAtom, ClaimOfferAtom, ClaimPoolAtom, OfferEntry, PoolId, Price,
};

use crate::budget::WorkBudget;
use crate::crossing::{self, CrossError, RoundMode};
use crate::error::{ExchangeError, Result};
use crate::pool::{self, PoolQuote, PoolQuoteError, PriceBounds};
use crate::state::LedgerState;

/// Fixed parameters of one hop conversion.
pub struct HopParams<'a> {
    /// The paying account; its own offers are never crossed.
    pub source: &'a AccountId,
    /// Asset the payer surrenders on this hop.
    pub send_asset: Asset,
    /// Asset the payer obtains on this hop.
    pub recv_asset: Asset,
    /// Which side of the conversion is pinned.
    pub mode: RoundMode,
    /// Acceptable range for the realized pool rate.
    pub bounds: PriceBounds,
}

/// What one hop achieved.
#[derive(Debug, Clone, Copy)]
pub struct HopResult {
    /// Total amount of the send asset consumed.
    pub amount_send: i64,
    /// Total amount of the receive asset obtained.
    pub amount_recv: i64,
    /// Whether the pinned side of the request was fully consumed.
    pub filled: bool,
    /// Whether a pool fill was rejected solely by the price bounds. Turns
    /// an unfilled hop from "too few offers" into a bound violation.
    pub pool_bound_rejected: bool,
}

/// Convert one hop of a path payment.
///
/// For [`RoundMode::StrictSend`], `max_send` is the pinned amount and
/// `max_recv` must be `i64::MAX`; for [`RoundMode::StrictReceive`] the
/// converse. Emits one [`ClaimAtom`] per liquidity source onto `trail`.
pub fn convert_hop(
    params: &HopParams,
    max_send: i64,
    max_recv: i64,
    budget: &mut WorkBudget,
    trail: &mut Vec<ClaimAtom>,
    state: &mut LedgerState,
) -> Result<HopResult> {
    match params.mode {
        RoundMode::StrictSend if max_recv != i64::MAX => {
            return Err(ExchangeError::Internal(
                "strict send hop with bounded receive".into(),
            ));
        }
        RoundMode::StrictReceive if max_send != i64::MAX => {
            return Err(ExchangeError::Internal(
                "strict receive hop with bounded send".into(),
            ));
        }
        RoundMode::Normal => {
            return Err(ExchangeError::Internal(
                "hop conversion requires a path rounding mode".into(),
            ));
        }
        _ => {}
    }
    if !params.bounds.is_valid() {
        return Err(ExchangeError::Internal("invalid pool price bounds".into()));
    }

    let mut amount_send = 0i64;
    let mut amount_recv = 0i64;
    let mut rem_send = max_send;
    let mut rem_recv = max_recv;
    let mut pool_used = false;
    let mut pool_bound_rejected = false;
    let mut skipped_self: BTreeSet<i64> = BTreeSet::new();
    let mut offers_crossed = 0u32;

    let mut need_more = rem_send > 0 && rem_recv > 0;
    while need_more {
        let best = next_crossable_offer(params, &mut skipped_self, budget, state)?;

        let pool_quote = if pool_used {
            None
        } else {
            quote_pool(params, rem_send, rem_recv, &mut pool_bound_rejected, state)?
        };

        let use_pool = match (&pool_quote, &best) {
            (Some((_, quote)), Some(offer)) => pool_beats_offer(quote, &offer.price),
            (Some(_), None) => true,
            (None, _) => false,
        };

        if use_pool {
            let Some((pool_id, quote)) = pool_quote else {
                return Err(ExchangeError::Internal("pool selection without quote".into()));
            };
            budget.charge()?;
            apply_pool_trade(params, &pool_id, &quote, trail, state)?;
            amount_send += quote.deposit;
            amount_recv += quote.payout;
            rem_send -= quote.deposit;
            rem_recv -= quote.payout;
            pool_used = true;
            // A pool quote covers the entire remaining request.
            need_more = false;
        } else if let Some(offer) = best {
            budget.charge()?;
            let (recv, send, offer_stays) =
                cross_offer(&offer, rem_recv, rem_send, params.mode, trail, state)?;
            offers_crossed += 1;
            amount_send += send;
            amount_recv += recv;
            rem_send -= send;
            rem_recv -= recv;
            need_more = !offer_stays && rem_send > 0 && rem_recv > 0;
        } else {
            // Book exhausted and no usable pool.
            break;
        }
    }

    let filled = rem_send <= 0 || rem_recv <= 0;
    tracing::trace!(
        send_asset = %params.send_asset,
        recv_asset = %params.recv_asset,
        offers_crossed,
        pool_used,
        filled,
        budget_remaining = budget.remaining(),
        "hop conversion complete"
    );

    Ok(HopResult {
        amount_send,
        amount_recv,
        filled,
        pool_bound_rejected,
    })
}

/// Find the best offer the payer may cross.
///
/// Offers owned by the payer are skipped as if absent from the book; each
/// consumes one budget unit the first time it is passed over in this hop.
fn next_crossable_offer(
    params: &HopParams,
    skipped_self: &mut BTreeSet<i64>,
    budget: &mut WorkBudget,
    state: &LedgerState,
) -> Result<Option<OfferEntry>> {
    for offer in state.offers_in_order(&params.recv_asset, &params.send_asset) {
        if offer.seller == *params.source {
            if skipped_self.insert(offer.offer_id) {
                budget.charge()?;
            }
            continue;
        }
        return Ok(Some(*offer));
    }
    Ok(None)
}

/// Quote the pair's pool for the entire remaining request, if possible.
fn quote_pool(
    params: &HopParams,
    rem_send: i64,
    rem_recv: i64,
    pool_bound_rejected: &mut bool,
    state: &LedgerState,
) -> Result<Option<(PoolId, PoolQuote)>> {
    let Some(pool) = state.pool_by_pair(&params.send_asset, &params.recv_asset) else {
        return Ok(None);
    };
    // An empty pool has nothing to trade.
    if pool.reserve_a <= 0 || pool.reserve_b <= 0 {
        return Ok(None);
    }

    let (reserve_in, reserve_out) = if params.send_asset == pool.asset_a {
        (pool.reserve_a, pool.reserve_b)
    } else {
        (pool.reserve_b, pool.reserve_a)
    };

    let quoted = match params.mode {
        RoundMode::StrictSend => {
            pool::quote_exact_in(reserve_in, reserve_out, pool.fee_bps, rem_send, &params.bounds)
        }
        RoundMode::StrictReceive => {
            pool::quote_exact_out(reserve_in, reserve_out, pool.fee_bps, rem_recv, &params.bounds)
        }
        RoundMode::Normal => return Ok(None),
    };

    match quoted {
        Ok(quote) => {
            // After earlier crossings in the same hop, the combined totals
            // must stay representable.
            if quote.deposit > rem_send || quote.payout > rem_recv {
                return Ok(None);
            }
            Ok(Some((pool.pool_id, quote)))
        }
        Err(PoolQuoteError::NoLiquidity) => Ok(None),
        Err(PoolQuoteError::PriceBound) => {
            *pool_bound_rejected = true;
            Ok(None)
        }
        Err(PoolQuoteError::InvalidPool) => Err(ExchangeError::Internal(
            "liquidity pool outside valid domain".into(),
        )),
    }
}

/// Whether the pool quote's effective rate is equal-or-better than the
/// offer's price (both expressed as send units per receive unit).
fn pool_beats_offer(quote: &PoolQuote, price: &Price) -> bool {
    big_multiply(quote.deposit, price.d as i64) <= big_multiply(quote.payout, price.n as i64)
}

/// Mutate the pool's reserves for a quoted fill and record the atom.
fn apply_pool_trade(
    params: &HopParams,
    pool_id: &PoolId,
    quote: &PoolQuote,
    trail: &mut Vec<ClaimAtom>,
    state: &mut LedgerState,
) -> Result<()> {
    let pool = *state
        .pool(pool_id)
        .ok_or_else(|| ExchangeError::Internal(format!("missing pool {pool_id}")))?;
    let (new_a, new_b) = pool::reserves_after_trade(&pool, &params.send_asset, quote)
        .ok_or_else(|| ExchangeError::Internal("pool trade violates reserve invariants".into()))?;
    state.update_pool_reserves(pool_id, new_a, new_b)?;

    trail.push(ClaimAtom::Pool(ClaimPoolAtom {
        pool_id: *pool_id,
        asset_in: params.send_asset,
        amount_in: quote.deposit,
        asset_out: params.recv_asset,
        amount_out: quote.payout,
    }));
    Ok(())
}

fn internal_cross_error(err: CrossError) -> ExchangeError {
    ExchangeError::Internal(format!("offer crossing failed: {err:?}"))
}

/// Cross the payer against one resting offer.
///
/// Applies the counterparty's balance changes, updates or deletes the
/// offer, and records the atom. Returns `(taker_gets, taker_pays,
/// offer_stays)`.
fn cross_offer(
    offer: &OfferEntry,
    max_recv: i64,
    max_send: i64,
    mode: RoundMode,
    trail: &mut Vec<ClaimAtom>,
    state: &mut LedgerState,
) -> Result<(i64, i64, bool)> {
    let seller = offer.seller;

    // Effective size: what the seller can actually deliver and accept, not
    // what the offer advertises.
    let max_offer_sell = offer
        .amount
        .min(state.available_to_sell(&seller, &offer.selling));
    let max_offer_receive = state.available_to_receive(&seller, &offer.buying);

    let adjusted = crossing::adjust_offer_amount(offer.price, max_offer_sell, max_offer_receive)
        .map_err(internal_cross_error)?;

    let cross = crossing::exchange_at_price(
        offer.price,
        adjusted,
        max_recv,
        max_send,
        max_offer_receive,
        mode,
    )
    .map_err(internal_cross_error)?;

    // Counterparty balance changes. Capacity was computed above, so a
    // failure here is a state-consistency bug.
    if cross.taker_pays != 0 {
        state
            .add_balance(&seller, &offer.buying, cross.taker_pays)
            .map_err(|e| ExchangeError::Internal(format!("seller credit failed: {e:?}")))?;
    }
    if cross.taker_gets != 0 {
        state
            .add_balance(&seller, &offer.selling, -cross.taker_gets)
            .map_err(|e| ExchangeError::Internal(format!("seller debit failed: {e:?}")))?;
    }

    let new_amount = if cross.offer_stays {
        let tentative = adjusted.saturating_sub(cross.taker_gets);
        if tentative > 0 {
            // Re-adjust against the seller's post-trade capacity.
            let post_sell = tentative.min(state.available_to_sell(&seller, &offer.selling));
            let post_receive = state.available_to_receive(&seller, &offer.buying);
            crossing::adjust_offer_amount(offer.price, post_sell, post_receive)
                .map_err(internal_cross_error)?
        } else {
            0
        }
    } else {
        0
    };

    if new_amount == 0 {
        state.delete_offer(&seller, offer.offer_id);
    } else {
        state.update_offer(OfferEntry {
            amount: new_amount,
            ..*offer
        });
    }

    // An atom is recorded even for a zero-for-zero crossing.
    trail.push(ClaimAtom::Offer(ClaimOfferAtom {
        offer_id: offer.offer_id,
        seller,
        asset_in: offer.buying,
        amount_in: cross.taker_pays,
        asset_out: offer.selling,
        amount_out: cross.taker_gets,
    }));

    Ok((cross.taker_gets, cross.taker_pays, cross.offer_stays))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_common::AssetCode;

    fn make_account_id(n: u8) -> AccountId {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        AccountId(bytes)
    }

    fn make_asset(code: &str, issuer: u8) -> Asset {
        Asset::Issued {
            code: AssetCode::from_str_lossy(code),
            issuer: make_account_id(issuer),
        }
    }

    fn make_offer(
        seller: &AccountId,
        offer_id: i64,
        selling: Asset,
        buying: Asset,
        price: Price,
        amount: i64,
    ) -> OfferEntry {
        OfferEntry {
            offer_id,
            seller: *seller,
            selling,
            buying,
            price,
            amount,
            flags: 0,
        }
    }

    fn strict_send_params<'a>(
        source: &'a AccountId,
        send_asset: Asset,
        recv_asset: Asset,
    ) -> HopParams<'a> {
        HopParams {
            source,
            send_asset,
            recv_asset,
            mode: RoundMode::StrictSend,
            bounds: PriceBounds::default(),
        }
    }

    /// Pool strictly better than the book: one pool atom, book untouched.
    #[test]
    fn test_pool_beats_expensive_book() {
        let payer = make_account_id(1);
        let mm = make_account_id(2);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.set_balance(&mm, &usd, 10_000);
        state.insert_offer(make_offer(
            &mm,
            10,
            usd,
            Asset::Native,
            Price::new(2, 1),
            100,
        ));
        state.add_pool(Asset::Native, usd, 30, 1000, 1000).unwrap();

        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(hop.filled);
        assert_eq!(hop.amount_send, 10);
        assert_eq!(hop.amount_recv, 9);
        assert_eq!(trail.len(), 1);
        assert!(matches!(trail[0], ClaimAtom::Pool(_)));

        let pool = state.pool_by_pair(&Asset::Native, &usd).unwrap();
        assert_eq!((pool.reserve_a, pool.reserve_b), (1010, 991));
        // Book untouched.
        assert_eq!(state.best_offer(&usd, &Asset::Native).unwrap().amount, 100);
    }

    /// A rate tie between pool and best offer goes to the pool.
    #[test]
    fn test_rate_tie_goes_to_pool() {
        let payer = make_account_id(1);
        let mm = make_account_id(2);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.set_balance(&mm, &usd, 10_000);
        // Pool fill for 10 native is (10 in, 9 out): rate 10/9. Offer at the
        // same 10/9 price must lose the tie.
        state.insert_offer(make_offer(
            &mm,
            10,
            usd,
            Asset::Native,
            Price::new(10, 9),
            100,
        ));
        state.add_pool(Asset::Native, usd, 30, 1000, 1000).unwrap();

        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(hop.filled);
        assert_eq!(trail.len(), 1);
        assert!(matches!(trail[0], ClaimAtom::Pool(_)));
    }

    /// A strictly better book fills from offers; the pool stays untouched.
    #[test]
    fn test_book_beats_expensive_pool() {
        let payer = make_account_id(1);
        let mm = make_account_id(2);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.set_balance(&mm, &usd, 10_000);
        state.insert_offer(make_offer(
            &mm,
            10,
            usd,
            Asset::Native,
            Price::new(1, 1),
            100,
        ));
        state.add_pool(Asset::Native, usd, 30, 1000, 1000).unwrap();

        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(hop.filled);
        assert_eq!(hop.amount_recv, 10);
        assert_eq!(trail.len(), 1);
        assert!(matches!(trail[0], ClaimAtom::Offer(_)));

        let pool = state.pool_by_pair(&Asset::Native, &usd).unwrap();
        assert_eq!((pool.reserve_a, pool.reserve_b), (1000, 1000));
        // Seller received 10 native and parted with 10 USD.
        assert_eq!(state.balance(&mm, &Asset::Native), 10);
        assert_eq!(state.balance(&mm, &usd), 9_990);
    }

    /// The payer's own offer is skipped (charging budget) as if absent.
    #[test]
    fn test_self_trade_skipped_and_charged() {
        let payer = make_account_id(1);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.set_balance(&payer, &usd, 10_000);
        // Best price in the book, but owned by the payer.
        state.insert_offer(make_offer(
            &payer,
            10,
            usd,
            Asset::Native,
            Price::new(1, 1),
            100,
        ));
        state.add_pool(Asset::Native, usd, 30, 1000, 1000).unwrap();

        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        // Filled from the pool; the self-offer survives untouched.
        assert!(hop.filled);
        assert_eq!(trail.len(), 1);
        assert!(matches!(trail[0], ClaimAtom::Pool(_)));
        assert_eq!(state.best_offer(&usd, &Asset::Native).unwrap().amount, 100);
        // One unit for the skip, one for the pool touch.
        assert_eq!(budget.remaining(), 8);
    }

    /// A pool yielding zero falls back to the order book.
    #[test]
    fn test_zero_yield_pool_falls_back_to_book() {
        let payer = make_account_id(1);
        let mm = make_account_id(2);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.set_balance(&mm, &usd, 10_000);
        state.insert_offer(make_offer(
            &mm,
            10,
            usd,
            Asset::Native,
            Price::new(1, 1),
            100,
        ));
        state.add_pool(Asset::Native, usd, 30, 1000, 1000).unwrap();

        // Selling 1 into a (1000, 1000) pool yields 0.
        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 1, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(hop.filled);
        assert_eq!(hop.amount_recv, 1);
        assert_eq!(trail.len(), 1);
        assert!(matches!(trail[0], ClaimAtom::Offer(_)));
        let pool = state.pool_by_pair(&Asset::Native, &usd).unwrap();
        assert_eq!((pool.reserve_a, pool.reserve_b), (1000, 1000));
    }

    /// Budget exhaustion mid-hop aborts with the work-limit error.
    #[test]
    fn test_work_limit_mid_hop() {
        let payer = make_account_id(1);
        let mm = make_account_id(2);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.set_balance(&mm, &usd, 10_000);
        for id in 0..3 {
            state.insert_offer(make_offer(
                &mm,
                10 + id,
                usd,
                Asset::Native,
                Price::new(1, 1),
                5,
            ));
        }

        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(2);
        let mut trail = Vec::new();
        let res = convert_hop(&params, 15, i64::MAX, &mut budget, &mut trail, &mut state);
        assert_eq!(res.unwrap_err(), ExchangeError::WorkLimitExceeded);
    }

    /// With no pool and an empty book the hop reports an unfilled result.
    #[test]
    fn test_empty_book_not_filled() {
        let payer = make_account_id(1);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(!hop.filled);
        assert!(!hop.pool_bound_rejected);
        assert!(trail.is_empty());
    }

    /// A price-bound-only rejection is flagged for the bound-violation
    /// classification.
    #[test]
    fn test_pool_bound_rejection_flagged() {
        let payer = make_account_id(1);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.add_pool(Asset::Native, usd, 30, 1000, 1000).unwrap();

        let mut params = strict_send_params(&payer, Asset::Native, usd);
        // Realized rate would be 10/9; demand better than 1:1.
        params.bounds = PriceBounds {
            min: Price::new(1, i32::MAX),
            max: Price::new(1, 1),
        };
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(!hop.filled);
        assert!(hop.pool_bound_rejected);
        assert!(trail.is_empty());
    }

    /// An offer its seller cannot honor trades only up to the seller's
    /// capacity and is then deleted.
    #[test]
    fn test_offer_capped_by_seller_capacity() {
        let payer = make_account_id(1);
        let mm = make_account_id(2);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        // Advertises 100, can deliver 3.
        state.set_balance(&mm, &usd, 3);
        state.insert_offer(make_offer(
            &mm,
            10,
            usd,
            Asset::Native,
            Price::new(1, 1),
            100,
        ));

        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(!hop.filled);
        assert_eq!(hop.amount_recv, 3);
        assert_eq!(hop.amount_send, 3);
        // The unhonorable remainder is gone from the book.
        assert!(state.best_offer(&usd, &Asset::Native).is_none());
        assert_eq!(state.balance(&mm, &usd), 0);
        assert_eq!(state.balance(&mm, &Asset::Native), 3);
    }

    /// Crossing several offers in price order, cheapest first.
    #[test]
    fn test_crosses_offers_in_price_order() {
        let payer = make_account_id(1);
        let mm1 = make_account_id(2);
        let mm2 = make_account_id(3);
        let usd = make_asset("USD", 9);

        let mut state = LedgerState::new();
        state.set_balance(&mm1, &usd, 10_000);
        state.set_balance(&mm2, &usd, 10_000);
        state.insert_offer(make_offer(
            &mm2,
            11,
            usd,
            Asset::Native,
            Price::new(2, 1),
            10,
        ));
        state.insert_offer(make_offer(
            &mm1,
            10,
            usd,
            Asset::Native,
            Price::new(1, 1),
            4,
        ));

        let params = strict_send_params(&payer, Asset::Native, usd);
        let mut budget = WorkBudget::new(10);
        let mut trail = Vec::new();
        let hop = convert_hop(&params, 10, i64::MAX, &mut budget, &mut trail, &mut state).unwrap();

        assert!(hop.filled);
        assert_eq!(hop.amount_send, 10);
        // 4 native at 1:1 buys 4, then 6 native at 2:1 buys 3.
        assert_eq!(hop.amount_recv, 7);
        assert_eq!(trail.len(), 2);
        match (&trail[0], &trail[1]) {
            (ClaimAtom::Offer(first), ClaimAtom::Offer(second)) => {
                assert_eq!(first.offer_id, 10);
                assert_eq!(second.offer_id, 11);
            }
            other => panic!("unexpected trail {other:?}"),
        }
        // The cheap offer is consumed, the dear one partially filled.
        assert!(state
            .offer(&crate::book::OfferKey {
                seller: mm1,
                offer_id: 10
            })
            .is_none());
        assert_eq!(state.best_offer(&usd, &Asset::Native).unwrap().amount, 7);
    }
}
