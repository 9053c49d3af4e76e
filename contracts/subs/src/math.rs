use crate::storage::{BASIS_POINTS, DIVISOR, FEE_BPS};

/// Charge for the part of the current period still to run
///
/// Formula: amount_per_cycle × (current_period + period_duration − now) / period_duration
///
/// Example:
/// - period: 30 days, now: day 21 of the period (70% elapsed)
/// - amount_per_cycle: 1,000 → charge 300
pub fn prorated(
    amount_per_cycle: i128,
    current_period: u64,
    period_duration: u64,
    now: u64,
) -> Option<i128> {
    let remaining = current_period
        .checked_add(period_duration)?
        .checked_sub(now)?;
    amount_per_cycle
        .checked_mul(i128::from(remaining))?
        .checked_div(i128::from(period_duration))
}

/// Split freshly minted shares into (credited now, committed to future periods)
///
/// The credited part rounds down; the committed part takes the remainder so
/// no share goes unaccounted for.
pub fn split_shares(shares: i128, claimable_now: i128, total_assets: i128) -> Option<(i128, i128)> {
    let credited = shares
        .checked_mul(claimable_now)?
        .checked_div(total_assets)?;
    Some((credited, shares.checked_sub(credited)?))
}

/// Shares a receiver earns for one period at `rate` assets per period
pub fn accrued(rate: i128, price: i128) -> Option<i128> {
    rate.checked_mul(price)?.checked_div(DIVISOR)
}

/// Shares per `DIVISOR` assets a deposit was priced at
pub fn share_price(shares: i128, assets: i128) -> Option<i128> {
    shares.checked_mul(DIVISOR)?.checked_div(assets)
}

/// Committed shares a subscription has paid out so far
///
/// Formula: (accumulator − accumulator_at_start − initial_period_price) × amount_per_cycle / DIVISOR
///
/// `initial_period_price` is the accumulator step of the period the
/// subscription was opened in, which was paid up front. The result is clamped
/// to [0, initial_shares].
pub fn consumed_shares(
    accumulator: i128,
    accumulator_at_start: i128,
    initial_period_price: i128,
    amount_per_cycle: i128,
    initial_shares: i128,
) -> Option<i128> {
    let spent = accumulator
        .checked_sub(accumulator_at_start)?
        .checked_sub(initial_period_price)?;
    if spent <= 0 {
        return Some(0);
    }
    let consumed = spent.checked_mul(amount_per_cycle)?.checked_div(DIVISOR)?;
    Some(consumed.min(initial_shares).max(0))
}

/// Split a withdrawal into (fee, payout)
pub fn fee_split(shares: i128) -> Option<(i128, i128)> {
    let fee = shares.checked_mul(FEE_BPS)?.checked_div(BASIS_POINTS)?;
    Some((fee, shares.checked_sub(fee)?))
}
