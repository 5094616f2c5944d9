//! Offer-crossing arithmetic.
//!
//! Fills between a taker and a resting offer are computed on a common value
//! scale: each side's sending and receiving limits are converted into value
//! units via the offer price, the smaller side bounds the trade, and the
//! division back into amounts picks its rounding direction by mode so the
//! taker is always rounded against. The final fill is re-checked against a
//! relative price-error bound; a fill that would misprice the offer by more
//! than the tolerance is rejected rather than applied.

use meridian_common::math::{big_divide_128, big_multiply, MathError, Rounding};
use meridian_common::Price;

/// Rounding discipline for a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMode {
    /// Offer-against-offer crossing; mispriced fills round to nothing.
    Normal,
    /// Path payment with a fixed source amount: the taker's spend is
    /// consumed fully and the received amount rounds down.
    StrictSend,
    /// Path payment with a fixed destination amount: the received amount is
    /// pinned and the taker's spend rounds up.
    StrictReceive,
}

/// Result of crossing a taker against one offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossResult {
    /// Amount of the offer's selling asset the taker receives.
    pub taker_gets: i64,
    /// Amount of the offer's buying asset the taker pays.
    pub taker_pays: i64,
    /// True when the offer outvalues the taker and survives the fill.
    pub offer_stays: bool,
}

/// Arithmetic failures during crossing.
///
/// These indicate corrupt inputs or a pricing inconsistency, not a normal
/// "no fill" outcome; callers surface them as internal errors.
#[derive(Debug, PartialEq, Eq)]
pub enum CrossError {
    Overflow,
    InvalidPrice,
    InvalidAmount,
    PriceError,
}

fn divide(value: u128, by: i64, rounding: Rounding) -> Result<i64, CrossError> {
    if by <= 0 {
        return Err(CrossError::InvalidPrice);
    }
    big_divide_128(value, by, rounding).map_err(|e| match e {
        MathError::Overflow => CrossError::Overflow,
        _ => CrossError::InvalidPrice,
    })
}

/// Value of one side of the trade: `min(max_send * price_n, max_receive *
/// price_d)`, the binding constraint expressed in value units.
fn side_value(price_n: i32, price_d: i32, max_send: i64, max_receive: i64) -> u128 {
    let send_value = big_multiply(max_send, price_n as i64);
    let receive_value = big_multiply(max_receive, price_d as i64);
    send_value.min(receive_value)
}

/// Reject fills whose realized rate strays more than the tolerance from the
/// offer price. With `can_favor_offer`, overpaying the offer is always
/// acceptable (the taker eats rounding in path payments).
fn check_price_error_bound(
    price: Price,
    taker_gets: i64,
    taker_pays: i64,
    can_favor_offer: bool,
) -> Result<(), CrossError> {
    let err_n = 100i64
        .checked_mul(price.n as i64)
        .ok_or(CrossError::Overflow)?;
    let err_d = 100i64
        .checked_mul(price.d as i64)
        .ok_or(CrossError::Overflow)?;

    let lhs = big_multiply(taker_gets, err_n);
    let rhs = big_multiply(taker_pays, err_d);

    if can_favor_offer && rhs > lhs {
        return Ok(());
    }

    let abs_diff = if lhs > rhs { lhs - rhs } else { rhs - lhs };
    let cap = big_multiply(taker_gets, price.n as i64);
    if abs_diff <= cap {
        Ok(())
    } else {
        Err(CrossError::PriceError)
    }
}

/// Core fill computation, without the price-error thresholds.
///
/// `max_offer_sell` / `max_offer_receive` bound the offer side (how much of
/// its selling asset it can part with, how much of its buying asset it can
/// accept); `max_taker_receive` / `max_taker_send` bound the taker.
fn exchange_at_price_unchecked(
    price: Price,
    max_offer_sell: i64,
    max_taker_receive: i64,
    max_taker_send: i64,
    max_offer_receive: i64,
    mode: RoundMode,
) -> Result<CrossResult, CrossError> {
    if price.n <= 0 || price.d <= 0 {
        return Err(CrossError::InvalidPrice);
    }
    let offer_value = side_value(price.n, price.d, max_offer_sell, max_offer_receive);
    let taker_value = side_value(price.d, price.n, max_taker_send, max_taker_receive);
    let offer_stays = offer_value > taker_value;

    let (taker_gets, taker_pays) = if offer_stays {
        if mode == RoundMode::StrictSend {
            let taker_gets = divide(
                offer_value.min(taker_value),
                price.n as i64,
                Rounding::Down,
            )?;
            (taker_gets, max_taker_send.min(max_offer_receive))
        } else if price.n > price.d || mode == RoundMode::StrictReceive {
            let taker_gets = divide(taker_value, price.n as i64, Rounding::Down)?;
            let taker_pays = divide(
                big_multiply(taker_gets, price.n as i64),
                price.d as i64,
                Rounding::Up,
            )?;
            (taker_gets, taker_pays)
        } else {
            let taker_pays = divide(taker_value, price.d as i64, Rounding::Down)?;
            let taker_gets = divide(
                big_multiply(taker_pays, price.d as i64),
                price.n as i64,
                Rounding::Down,
            )?;
            (taker_gets, taker_pays)
        }
    } else if price.n > price.d {
        let taker_gets = divide(offer_value, price.n as i64, Rounding::Down)?;
        let taker_pays = divide(
            big_multiply(taker_gets, price.n as i64),
            price.d as i64,
            Rounding::Down,
        )?;
        (taker_gets, taker_pays)
    } else {
        let taker_pays = divide(offer_value, price.d as i64, Rounding::Down)?;
        let taker_gets = divide(
            big_multiply(taker_pays, price.d as i64),
            price.n as i64,
            Rounding::Up,
        )?;
        (taker_gets, taker_pays)
    };

    if taker_gets < 0
        || taker_gets > max_taker_receive.min(max_offer_sell)
        || taker_pays < 0
        || taker_pays > max_offer_receive.min(max_taker_send)
    {
        return Err(CrossError::InvalidAmount);
    }

    Ok(CrossResult {
        taker_gets,
        taker_pays,
        offer_stays,
    })
}

/// Compute the fill between a taker and an offer at `price`.
///
/// Wraps the core computation with value-consistency and price-error
/// checks. In [`RoundMode::Normal`] a mispriced fill degrades to a zero
/// fill; in the path payment modes it is an error. A zero-output strict-send
/// fill keeps its `taker_pays` so the caller can consume the input (the
/// taker eats the rounding loss, never the ledger).
pub fn exchange_at_price(
    price: Price,
    max_offer_sell: i64,
    max_taker_receive: i64,
    max_taker_send: i64,
    max_offer_receive: i64,
    mode: RoundMode,
) -> Result<CrossResult, CrossError> {
    let mut res = exchange_at_price_unchecked(
        price,
        max_offer_sell,
        max_taker_receive,
        max_taker_send,
        max_offer_receive,
        mode,
    )?;

    if res.taker_gets > 0 && res.taker_pays > 0 {
        let offer_traded_value = big_multiply(res.taker_gets, price.n as i64);
        let taker_paid_value = big_multiply(res.taker_pays, price.d as i64);
        if res.offer_stays && taker_paid_value < offer_traded_value {
            return Err(CrossError::InvalidAmount);
        }
        if !res.offer_stays && taker_paid_value > offer_traded_value {
            return Err(CrossError::InvalidAmount);
        }
        if mode == RoundMode::Normal {
            if check_price_error_bound(price, res.taker_gets, res.taker_pays, false).is_err() {
                res.taker_gets = 0;
                res.taker_pays = 0;
            }
        } else {
            check_price_error_bound(price, res.taker_gets, res.taker_pays, true)?;
        }
    } else if mode == RoundMode::StrictSend {
        // A strict-send fill can round the output to zero while still
        // consuming input; keep taker_pays so the hop makes progress and
        // the bound check at the end of the path decides the outcome.
        res.taker_gets = 0;
    } else {
        res.taker_gets = 0;
        res.taker_pays = 0;
    }

    Ok(res)
}

/// The amount an offer can actually trade given its owner's capacity.
///
/// Used both when crossing (the effective offer size) and after a partial
/// fill (the surviving remainder); an adjusted amount of zero deletes the
/// offer.
pub fn adjust_offer_amount(
    price: Price,
    max_offer_sell: i64,
    max_offer_receive: i64,
) -> Result<i64, CrossError> {
    let res = exchange_at_price(
        price,
        max_offer_sell,
        i64::MAX,
        i64::MAX,
        max_offer_receive,
        RoundMode::Normal,
    )?;
    Ok(res.taker_gets)
}
