//! Path payment execution.
//!
//! The executor drives a sequence of hop conversions for the two payment
//! modes. Strict-send walks the path forward from the source asset; strict-
//! receive computes backward from the destination asset (the fixed quantity
//! is the final output) while still reporting the claim trail in forward
//! path order. That reversed-compute/forward-report order is normative: it
//! decides which hop observes which pre-state when an asset pair repeats in
//! the path, and with it the exact rounding of every amount.
//!
//! Commit discipline is all-or-nothing: a savepoint is taken on entry and
//! every failure rolls back to it, so the ledger never observes a partial
//! path.

use meridian_common::{AccountId, Asset, ClaimAtom};

use crate::budget::WorkBudget;
use crate::crossing::RoundMode;
use crate::error::{ExchangeError, Result};
use crate::pool::PriceBounds;
use crate::state::{BalanceError, LedgerState};
use crate::step::{convert_hop, HopParams, HopResult};
use crate::LedgerContext;

/// Longest allowed list of intermediate path assets.
pub const MAX_PATH_LENGTH: usize = 5;

/// A payment fixing the amount that leaves the source.
#[derive(Debug, Clone)]
pub struct StrictSendRequest {
    /// The paying account.
    pub source: AccountId,
    /// Asset debited from the source.
    pub send_asset: Asset,
    /// Exact amount debited from the source.
    pub send_amount: i64,
    /// The receiving account.
    pub destination: AccountId,
    /// Asset credited to the destination.
    pub dest_asset: Asset,
    /// Minimum acceptable amount credited to the destination.
    pub dest_min: i64,
    /// Intermediate conversion assets, in order.
    pub path: Vec<Asset>,
}

/// A payment fixing the amount credited to the destination.
#[derive(Debug, Clone)]
pub struct StrictReceiveRequest {
    /// The paying account.
    pub source: AccountId,
    /// Asset debited from the source.
    pub send_asset: Asset,
    /// Maximum acceptable amount debited from the source.
    pub send_max: i64,
    /// The receiving account.
    pub destination: AccountId,
    /// Asset credited to the destination.
    pub dest_asset: Asset,
    /// Exact amount credited to the destination.
    pub dest_amount: i64,
    /// Intermediate conversion assets, in order.
    pub path: Vec<Asset>,
}

/// The outcome of a successful path payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPaymentReceipt {
    /// Every executed trade, in forward (source-to-destination) path order.
    pub claimed: Vec<ClaimAtom>,
    /// Amount debited from the source.
    pub amount_sent: i64,
    /// Amount credited to the destination.
    pub amount_received: i64,
}

/// Execute a strict-send path payment.
///
/// Sends exactly `send_amount` of `send_asset`, converting along `path`,
/// and requires at least `dest_min` of `dest_asset` to arrive. On any
/// failure the ledger state is rolled back to its state at entry.
pub fn execute_strict_send(
    req: &StrictSendRequest,
    state: &mut LedgerState,
    context: &LedgerContext,
) -> Result<PathPaymentReceipt> {
    validate_path(
        &req.send_asset,
        &req.path,
        &req.dest_asset,
        req.send_amount,
        req.dest_min,
    )?;

    let sp = state.savepoint();
    match strict_send_inner(req, state, context) {
        Ok(receipt) => Ok(receipt),
        Err(err) => {
            state.rollback_to(sp);
            Err(err)
        }
    }
}

fn strict_send_inner(
    req: &StrictSendRequest,
    state: &mut LedgerState,
    context: &LedgerContext,
) -> Result<PathPaymentReceipt> {
    state
        .add_balance(&req.source, &req.send_asset, -req.send_amount)
        .map_err(source_debit_error)?;

    let mut budget = WorkBudget::new(context.max_offers_to_cross);
    let mut claimed: Vec<ClaimAtom> = Vec::new();

    let mut send_asset = req.send_asset;
    let mut amount = req.send_amount;
    for recv_asset in req.path.iter().chain(std::iter::once(&req.dest_asset)) {
        let params = HopParams {
            source: &req.source,
            send_asset,
            recv_asset: *recv_asset,
            mode: RoundMode::StrictSend,
            bounds: PriceBounds::default(),
        };
        let mut trail = Vec::new();
        let hop = convert_hop(
            &params,
            amount,
            i64::MAX,
            &mut budget,
            &mut trail,
            state,
        )?;

        if !hop.filled || hop.amount_send != amount {
            return Err(unfilled_hop_error(&hop, RoundMode::StrictSend));
        }
        // A hop that converts everything into nothing can never satisfy a
        // positive destination minimum; abort the whole operation.
        if hop.amount_recv <= 0 {
            return Err(ExchangeError::UnderDestMin);
        }

        amount = hop.amount_recv;
        send_asset = *recv_asset;
        claimed.extend(trail);
    }

    if amount < req.dest_min {
        return Err(ExchangeError::UnderDestMin);
    }

    state
        .add_balance(&req.destination, &req.dest_asset, amount)
        .map_err(dest_credit_error)?;

    tracing::debug!(
        source = %req.source,
        destination = %req.destination,
        send_asset = %req.send_asset,
        dest_asset = %req.dest_asset,
        amount_sent = req.send_amount,
        amount_received = amount,
        atoms = claimed.len(),
        "strict-send path payment filled"
    );

    Ok(PathPaymentReceipt {
        claimed,
        amount_sent: req.send_amount,
        amount_received: amount,
    })
}

/// Execute a strict-receive path payment.
///
/// Delivers exactly `dest_amount` of `dest_asset`, converting along `path`,
/// and requires at most `send_max` of `send_asset` to leave the source.
/// Hops are computed backward from the destination; the receipt still lists
/// atoms in forward path order. On any failure the ledger state is rolled
/// back to its state at entry.
pub fn execute_strict_receive(
    req: &StrictReceiveRequest,
    state: &mut LedgerState,
    context: &LedgerContext,
) -> Result<PathPaymentReceipt> {
    validate_path(
        &req.send_asset,
        &req.path,
        &req.dest_asset,
        req.send_max,
        req.dest_amount,
    )?;

    let sp = state.savepoint();
    match strict_receive_inner(req, state, context) {
        Ok(receipt) => Ok(receipt),
        Err(err) => {
            state.rollback_to(sp);
            Err(err)
        }
    }
}

fn strict_receive_inner(
    req: &StrictReceiveRequest,
    state: &mut LedgerState,
    context: &LedgerContext,
) -> Result<PathPaymentReceipt> {
    state
        .add_balance(&req.destination, &req.dest_asset, req.dest_amount)
        .map_err(dest_credit_error)?;

    let mut budget = WorkBudget::new(context.max_offers_to_cross);
    let mut claimed: Vec<ClaimAtom> = Vec::new();

    // Walk the pairs destination-first; each hop pins the amount the
    // previous (closer-to-source) hop must deliver.
    let mut recv_asset = req.dest_asset;
    let mut amount = req.dest_amount;
    for send_asset in req.path.iter().rev().chain(std::iter::once(&req.send_asset)) {
        let params = HopParams {
            source: &req.source,
            send_asset: *send_asset,
            recv_asset,
            mode: RoundMode::StrictReceive,
            bounds: PriceBounds::default(),
        };
        let mut trail = Vec::new();
        let hop = convert_hop(
            &params,
            i64::MAX,
            amount,
            &mut budget,
            &mut trail,
            state,
        )?;

        if !hop.filled || hop.amount_recv != amount {
            return Err(unfilled_hop_error(&hop, RoundMode::StrictReceive));
        }
        if hop.amount_send <= 0 {
            return Err(ExchangeError::OverSendMax);
        }

        amount = hop.amount_send;
        recv_asset = *send_asset;
        // Report in forward path order despite the reversed computation.
        claimed.splice(0..0, trail);
    }

    if amount > req.send_max {
        return Err(ExchangeError::OverSendMax);
    }

    state
        .add_balance(&req.source, &req.send_asset, -amount)
        .map_err(source_debit_error)?;

    tracing::debug!(
        source = %req.source,
        destination = %req.destination,
        send_asset = %req.send_asset,
        dest_asset = %req.dest_asset,
        amount_sent = amount,
        amount_received = req.dest_amount,
        atoms = claimed.len(),
        "strict-receive path payment filled"
    );

    Ok(PathPaymentReceipt {
        claimed,
        amount_sent: amount,
        amount_received: req.dest_amount,
    })
}

/// Structural validation, before any state access.
///
/// Amounts must be positive, the path must fit [`MAX_PATH_LENGTH`], every
/// asset must be well-formed, and no two adjacent assets in the chain
/// source asset -> path -> destination asset may be equal (a degenerate
/// hop).
fn validate_path(
    send_asset: &Asset,
    path: &[Asset],
    dest_asset: &Asset,
    amount_a: i64,
    amount_b: i64,
) -> Result<()> {
    if amount_a <= 0 || amount_b <= 0 {
        return Err(ExchangeError::MalformedPath);
    }
    if path.len() > MAX_PATH_LENGTH {
        return Err(ExchangeError::MalformedPath);
    }

    let mut prev = send_asset;
    for asset in path.iter().chain(std::iter::once(dest_asset)) {
        if !prev.is_valid() || !asset.is_valid() {
            return Err(ExchangeError::MalformedPath);
        }
        if asset == prev {
            return Err(ExchangeError::MalformedPath);
        }
        prev = asset;
    }
    Ok(())
}

/// Classify an unfilled hop: a pool rejected only by its price bounds means
/// liquidity existed at an unacceptable rate; otherwise it is genuinely
/// missing.
fn unfilled_hop_error(hop: &HopResult, mode: RoundMode) -> ExchangeError {
    if hop.pool_bound_rejected {
        match mode {
            RoundMode::StrictReceive => ExchangeError::OverSendMax,
            _ => ExchangeError::UnderDestMin,
        }
    } else {
        ExchangeError::TooFewOffers
    }
}

fn source_debit_error(err: BalanceError) -> ExchangeError {
    match err {
        BalanceError::Underfunded => ExchangeError::Underfunded,
        // Debits cannot overfill; keep the mapping total anyway.
        BalanceError::LineFull => ExchangeError::LineFull,
    }
}

fn dest_credit_error(err: BalanceError) -> ExchangeError {
    match err {
        BalanceError::LineFull => ExchangeError::LineFull,
        BalanceError::Underfunded => ExchangeError::Underfunded,
    }
}
