//! Constant-product liquidity pool math.
//!
//! Quotes are pure functions of (reserves, fee, request) so every node
//! computes the same fill. The two directions differ in rounding: exact-in
//! floors the payout (the pool never over-pays), exact-out ceils the deposit
//! (the pool never under-collects). Both keep the product of the reserves
//! from decreasing; fees only increase it.
//!
//! The triple products involved (fee scale x reserve x amount) can exceed
//! 128 bits, so divisions use a quotient/remainder decomposition instead of
//! forming the full numerator.

use sha2::{Digest, Sha256};

use meridian_common::asset::{canonical_pair, price_ge};
use meridian_common::math::big_multiply_unsigned;
use meridian_common::{Asset, Hash256, LiquidityPoolEntry, PoolId, Price};

/// Basis-point scale: fees are parts per this.
pub const BPS_SCALE: i64 = 10_000;

/// Domain discriminator hashed into constant-product pool identifiers.
const CONSTANT_PRODUCT_DISCRIMINATOR: u8 = 0;

/// A quoted pool fill: `deposit` units into the pool, `payout` units out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolQuote {
    /// Amount the payer deposits into the pool (fee included).
    pub deposit: i64,
    /// Amount the pool pays out.
    pub payout: i64,
}

/// Why a pool could not quote a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolQuoteError {
    /// The pool cannot serve this request: zero yield, payout at or above
    /// the buy-side reserve, or a reserve leaving `[1, i64::MAX]`. The
    /// caller falls back to the order book.
    NoLiquidity,
    /// The realized rate falls outside the caller's price bounds. Distinct
    /// from `NoLiquidity`: liquidity existed, the rate was unacceptable.
    PriceBound,
    /// Fee or reserves are outside their valid domain; corrupt ledger state.
    InvalidPool,
}

/// Caller-supplied bound on the realized rate of a pool fill, expressed as
/// deposit units per payout unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    /// Minimum acceptable rate.
    pub min: Price,
    /// Maximum acceptable rate.
    pub max: Price,
}

impl Default for PriceBounds {
    /// The full representable range: effectively unbounded.
    fn default() -> Self {
        Self {
            min: Price::new(1, i32::MAX),
            max: Price::new(i32::MAX, 1),
        }
    }
}

impl PriceBounds {
    /// Whether the bound is well-formed: positive components, min at most max.
    pub fn is_valid(&self) -> bool {
        self.min.is_valid() && self.max.is_valid() && price_ge(&self.max, &self.min)
    }

    /// Whether the realized rate `deposit / payout` lies within the bound.
    pub fn contains(&self, deposit: i64, payout: i64) -> bool {
        debug_assert!(deposit >= 0 && payout > 0);
        let rate_ge_min = big_multiply_unsigned(deposit as u64, self.min.d as u64)
            >= big_multiply_unsigned(payout as u64, self.min.n as u64);
        let rate_le_max = big_multiply_unsigned(deposit as u64, self.max.d as u64)
            <= big_multiply_unsigned(payout as u64, self.max.n as u64);
        rate_ge_min && rate_le_max
    }
}

/// Deterministic identifier of the constant-product pool for an asset pair
/// and fee: SHA-256 over the discriminator, the canonically ordered pair,
/// and the fee.
pub fn pool_id(a: &Asset, b: &Asset, fee_bps: i32) -> PoolId {
    let (first, second) = canonical_pair(*a, *b);
    let mut hasher = Sha256::new();
    hasher.update([CONSTANT_PRODUCT_DISCRIMINATOR]);
    hash_asset(&mut hasher, &first);
    hash_asset(&mut hasher, &second);
    hasher.update(fee_bps.to_be_bytes());
    PoolId(Hash256(hasher.finalize().into()))
}

fn hash_asset(hasher: &mut Sha256, asset: &Asset) {
    match asset {
        Asset::Native => hasher.update([0u8]),
        Asset::Issued { code, issuer } => {
            hasher.update([1u8]);
            hasher.update(code.0);
            hasher.update(issuer.0);
        }
    }
}

fn check_pool_domain(reserve_in: i64, reserve_out: i64, fee_bps: i32) -> Result<(), PoolQuoteError> {
    if !(0..BPS_SCALE).contains(&(fee_bps as i64)) {
        return Err(PoolQuoteError::InvalidPool);
    }
    if reserve_in <= 0 || reserve_out <= 0 {
        return Err(PoolQuoteError::InvalidPool);
    }
    Ok(())
}

/// Quote an exact-in fill: `amount_in` is deposited, the payout floors.
///
/// `payout = floor(F * reserve_out * in / (10000 * reserve_in + F * in))`
/// with `F = 10000 - fee_bps`.
pub fn quote_exact_in(
    reserve_in: i64,
    reserve_out: i64,
    fee_bps: i32,
    amount_in: i64,
    bounds: &PriceBounds,
) -> Result<PoolQuote, PoolQuoteError> {
    check_pool_domain(reserve_in, reserve_out, fee_bps)?;
    if amount_in <= 0 {
        return Err(PoolQuoteError::NoLiquidity);
    }
    // Deposit must not push the sell-side reserve past the maximum.
    if amount_in > i64::MAX - reserve_in {
        return Err(PoolQuoteError::NoLiquidity);
    }

    let f = (BPS_SCALE - fee_bps as i64) as u128;
    let b = big_multiply_unsigned(reserve_out as u64, amount_in as u64);
    let c = (BPS_SCALE as u128) * (reserve_in as u128) + f * (amount_in as u128);

    // floor(f * b / c) without forming f * b, which can exceed 128 bits:
    // f * (q*c + r) / c = f*q + f*r/c with b = q*c + r.
    let q = b / c;
    let r = b % c;
    let value = f
        .checked_mul(q)
        .and_then(|fq| fq.checked_add(f * r / c))
        .ok_or(PoolQuoteError::NoLiquidity)?;

    if value > i64::MAX as u128 {
        return Err(PoolQuoteError::NoLiquidity);
    }
    let payout = value as i64;

    // Zero yield: report no liquidity so the caller uses the book instead
    // of a no-op trade.
    if payout == 0 {
        return Err(PoolQuoteError::NoLiquidity);
    }
    // The buy-side reserve must stay at or above 1.
    if payout >= reserve_out {
        return Err(PoolQuoteError::NoLiquidity);
    }

    if !bounds.contains(amount_in, payout) {
        return Err(PoolQuoteError::PriceBound);
    }

    Ok(PoolQuote {
        deposit: amount_in,
        payout,
    })
}

/// Quote an exact-out fill: `amount_out` is paid out, the deposit ceils.
///
/// `deposit = ceil(10000 * reserve_in * out / ((reserve_out - out) * F))`
/// with `F = 10000 - fee_bps`; fails immediately when `amount_out` is at or
/// above the buy-side reserve.
pub fn quote_exact_out(
    reserve_in: i64,
    reserve_out: i64,
    fee_bps: i32,
    amount_out: i64,
    bounds: &PriceBounds,
) -> Result<PoolQuote, PoolQuoteError> {
    check_pool_domain(reserve_in, reserve_out, fee_bps)?;
    if amount_out <= 0 {
        return Err(PoolQuoteError::NoLiquidity);
    }
    if amount_out >= reserve_out {
        return Err(PoolQuoteError::NoLiquidity);
    }

    let a = BPS_SCALE as u128;
    let f = (BPS_SCALE - fee_bps as i64) as u128;
    let b = big_multiply_unsigned(reserve_in as u64, amount_out as u64);
    let c = ((reserve_out - amount_out) as u128) * f;

    // ceil(a * b / c) via the same decomposition as exact-in.
    let q = b / c;
    let r = b % c;
    let value = a
        .checked_mul(q)
        .and_then(|aq| aq.checked_add((a * r).div_ceil(c)))
        .ok_or(PoolQuoteError::NoLiquidity)?;

    if value > i64::MAX as u128 {
        return Err(PoolQuoteError::NoLiquidity);
    }
    let deposit = value as i64;

    // Deposit must not push the sell-side reserve past the maximum.
    if deposit > i64::MAX - reserve_in {
        return Err(PoolQuoteError::NoLiquidity);
    }

    if !bounds.contains(deposit, amount_out) {
        return Err(PoolQuoteError::PriceBound);
    }

    Ok(PoolQuote {
        deposit,
        payout: amount_out,
    })
}

/// Reserves after applying a quoted fill that deposits `asset_in`.
///
/// Returns `None` when the fill does not belong to this pool or would
/// violate the reserve bounds or the constant-product invariant; a quote
/// produced for the same pre-state never does.
pub fn reserves_after_trade(
    pool: &LiquidityPoolEntry,
    asset_in: &Asset,
    quote: &PoolQuote,
) -> Option<(i64, i64)> {
    let (new_a, new_b) = if *asset_in == pool.asset_a {
        (
            pool.reserve_a.checked_add(quote.deposit)?,
            pool.reserve_b.checked_sub(quote.payout)?,
        )
    } else if *asset_in == pool.asset_b {
        (
            pool.reserve_a.checked_sub(quote.payout)?,
            pool.reserve_b.checked_add(quote.deposit)?,
        )
    } else {
        return None;
    };

    if new_a < 1 || new_b < 1 {
        return None;
    }
    // reserve_a * reserve_b never decreases across a trade.
    if (new_a as u128) * (new_b as u128) < pool.constant_product() {
        return None;
    }

    Some((new_a, new_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_common::{AccountId, AssetCode};

    fn make_asset(code: &str, issuer: u8) -> Asset {
        let mut bytes = [0u8; 32];
        bytes[0] = issuer;
        Asset::Issued {
            code: AssetCode::from_str_lossy(code),
            issuer: AccountId(bytes),
        }
    }

    fn unbounded() -> PriceBounds {
        PriceBounds::default()
    }

    /// Selling 10 into a (1000, 1000) pool at 30 bps yields 9.
    #[test]
    fn test_exact_in_thousand_pool() {
        let quote = quote_exact_in(1000, 1000, 30, 10, &unbounded()).unwrap();
        assert_eq!(quote.deposit, 10);
        assert_eq!(quote.payout, 9);
    }

    /// The 30 bps fee on a (1000, 2000)-swap: receiving the whole mirror
    /// reserve's worth costs 1004, not 1003 (the fee rounds up from just
    /// above 3).
    #[test]
    fn test_exact_out_fee_rounds_up() {
        let quote = quote_exact_out(1000, 2000, 30, 1000, &unbounded()).unwrap();
        assert_eq!(quote.payout, 1000);
        assert_eq!(quote.deposit, 1004);

        // And exact-in confirms the boundary: 1003 in is not enough.
        let quote = quote_exact_in(1000, 2000, 30, 1003, &unbounded()).unwrap();
        assert!(quote.payout < 1000);
        let quote = quote_exact_in(1000, 2000, 30, 1004, &unbounded()).unwrap();
        assert_eq!(quote.payout, 1000);
    }

    /// A tiny trade that would round to zero is no liquidity, not a no-op.
    #[test]
    fn test_exact_in_zero_yield() {
        assert_eq!(
            quote_exact_in(1000, 1000, 30, 1, &unbounded()),
            Err(PoolQuoteError::NoLiquidity)
        );
    }

    /// Exact-out at or above the buy reserve is rejected outright.
    #[test]
    fn test_exact_out_reserve_bound() {
        assert_eq!(
            quote_exact_out(1000, 1000, 30, 1000, &unbounded()),
            Err(PoolQuoteError::NoLiquidity)
        );
        assert_eq!(
            quote_exact_out(1000, 1000, 30, 1001, &unbounded()),
            Err(PoolQuoteError::NoLiquidity)
        );
        // Just below the reserve drains it to 1.
        let quote = quote_exact_out(1000, 1000, 30, 999, &unbounded()).unwrap();
        assert_eq!(quote.deposit, 1_002_007);
    }

    /// Deposits that would push the sell reserve past i64::MAX fail.
    #[test]
    fn test_exact_in_reserve_overflow() {
        assert_eq!(
            quote_exact_in(i64::MAX - 10, i64::MAX - 10, 30, 11, &unbounded()),
            Err(PoolQuoteError::NoLiquidity)
        );
        // 10 still fits.
        assert!(quote_exact_in(i64::MAX - 10, i64::MAX - 10, 30, 10, &unbounded()).is_ok());
    }

    /// A rate outside the caller's bounds is a price-bound failure, not
    /// missing liquidity.
    #[test]
    fn test_price_bounds() {
        // 10 in, 9 out: rate 10/9 ~ 1.11, inside a 1.2 cap.
        let tight = PriceBounds {
            min: Price::new(1, i32::MAX),
            max: Price::new(12, 10),
        };
        assert!(quote_exact_in(1000, 1000, 30, 10, &tight).is_ok());

        let too_tight = PriceBounds {
            min: Price::new(1, i32::MAX),
            max: Price::new(1, 1),
        };
        assert_eq!(
            quote_exact_in(1000, 1000, 30, 10, &too_tight),
            Err(PoolQuoteError::PriceBound)
        );

        let min_too_high = PriceBounds {
            min: Price::new(2, 1),
            max: Price::new(i32::MAX, 1),
        };
        assert_eq!(
            quote_exact_in(1000, 1000, 30, 10, &min_too_high),
            Err(PoolQuoteError::PriceBound)
        );
    }

    #[test]
    fn test_price_bounds_validity() {
        assert!(PriceBounds::default().is_valid());
        assert!(!PriceBounds {
            min: Price::new(2, 1),
            max: Price::new(1, 1),
        }
        .is_valid());
        assert!(!PriceBounds {
            min: Price::new(0, 1),
            max: Price::new(1, 1),
        }
        .is_valid());
    }

    #[test]
    fn test_invalid_pool_domain() {
        assert_eq!(
            quote_exact_in(0, 1000, 30, 10, &unbounded()),
            Err(PoolQuoteError::InvalidPool)
        );
        assert_eq!(
            quote_exact_in(1000, 1000, 10_000, 10, &unbounded()),
            Err(PoolQuoteError::InvalidPool)
        );
        assert_eq!(
            quote_exact_in(1000, 1000, -1, 10, &unbounded()),
            Err(PoolQuoteError::InvalidPool)
        );
    }

    /// The constant product never decreases across a fill.
    #[test]
    fn test_product_conservation() {
        let usd = make_asset("USD", 1);
        let pool = LiquidityPoolEntry {
            pool_id: pool_id(&Asset::Native, &usd, 30),
            asset_a: Asset::Native,
            asset_b: usd,
            fee_bps: 30,
            reserve_a: 1000,
            reserve_b: 1000,
            total_shares: 1000,
            share_accounts: 1,
        };

        let quote = quote_exact_in(1000, 1000, 30, 10, &unbounded()).unwrap();
        let (new_a, new_b) = reserves_after_trade(&pool, &Asset::Native, &quote).unwrap();
        assert_eq!((new_a, new_b), (1010, 991));
        assert!((new_a as u128) * (new_b as u128) >= pool.constant_product());
    }

    /// Depositing the canonically larger asset mutates the mirror reserve.
    #[test]
    fn test_trade_in_reverse_direction() {
        let usd = make_asset("USD", 1);
        let pool = LiquidityPoolEntry {
            pool_id: pool_id(&Asset::Native, &usd, 30),
            asset_a: Asset::Native,
            asset_b: usd,
            fee_bps: 30,
            reserve_a: 1000,
            reserve_b: 1000,
            total_shares: 1000,
            share_accounts: 1,
        };

        let quote = quote_exact_in(1000, 1000, 30, 10, &unbounded()).unwrap();
        let (new_a, new_b) = reserves_after_trade(&pool, &usd, &quote).unwrap();
        assert_eq!((new_a, new_b), (991, 1010));
    }

    /// Pool ids are order-insensitive in the pair and sensitive to the fee.
    #[test]
    fn test_pool_id_canonicalization() {
        let usd = make_asset("USD", 1);
        assert_eq!(
            pool_id(&Asset::Native, &usd, 30),
            pool_id(&usd, &Asset::Native, 30)
        );
        assert_ne!(
            pool_id(&Asset::Native, &usd, 30),
            pool_id(&Asset::Native, &usd, 100)
        );
        let eur = make_asset("EUR", 1);
        assert_ne!(
            pool_id(&Asset::Native, &usd, 30),
            pool_id(&Asset::Native, &eur, 30)
        );
    }
}
