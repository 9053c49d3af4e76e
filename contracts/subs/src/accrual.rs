use crate::error::Error;
use crate::math;
use crate::storage::{Config, PeriodPrice, PeriodState, RateChange, ReceiverBalance, Storage};
use crate::value_store::Vault;
use soroban_sdk::{log, Address, Env, Map};

/// Price runs a single catch-up reads before it stops. A receiver left
/// further behind is settled over several calls; `claim(receiver, 0)`
/// continues it.
pub const MAX_WALK_RUNS: u32 = 32;

/// Boundaries crossed since the stored `current_period`, priced once.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Advance {
    /// The `current_period` being left; its share price gets recorded
    pub from: u64,
    pub elapsed: u64,
    pub price: i128,
}

impl Advance {
    pub fn apply(&self, state: &PeriodState, period_duration: u64) -> Result<PeriodState, Error> {
        let accumulated = i128::from(self.elapsed)
            .checked_mul(self.price)
            .ok_or(Error::ArithmeticError)?;
        Ok(PeriodState {
            current_period: self.until(period_duration)?,
            shares_accumulator: state
                .shares_accumulator
                .checked_add(accumulated)
                .ok_or(Error::ArithmeticError)?,
        })
    }

    /// Boundary the advance stops at
    pub fn until(&self, period_duration: u64) -> Result<u64, Error> {
        self.elapsed
            .checked_mul(period_duration)
            .and_then(|span| span.checked_add(self.from))
            .ok_or(Error::ArithmeticError)
    }

    fn record(&self, period_duration: u64) -> Result<PeriodPrice, Error> {
        Ok(PeriodPrice {
            price: self.price,
            next: self.until(period_duration)?,
        })
    }
}

/// Vault share price, never above the cap. A share-price drop leaves the
/// accumulator at the last price, so receivers never draw more shares per
/// period than any live subscription bought.
pub fn ledger_price(env: &Env, vault: &Vault) -> Result<i128, Error> {
    let observed = vault.share_price()?;
    Ok(match Storage::share_price_cap(env) {
        Some(cap) => observed.min(cap),
        None => observed,
    })
}

/// Work out the advance owed for `now`, without touching storage.
///
/// O(1) however many periods have gone by: only the boundary being left is
/// priced, every boundary skipped in the same jump shares that price.
pub fn pending_advance(
    env: &Env,
    config: &Config,
    vault: &Vault,
    state: &PeriodState,
) -> Result<Option<Advance>, Error> {
    let now = env.ledger().timestamp();
    if now < state.current_period {
        return Ok(None);
    }

    let elapsed = (now - state.current_period) / config.period_duration;
    if elapsed == 0 {
        return Ok(None);
    }

    Ok(Some(Advance {
        from: state.current_period,
        elapsed,
        price: ledger_price(env, vault)?,
    }))
}

/// Move the clock and accumulator up to `now` and persist them.
pub fn advance(env: &Env, config: &Config, vault: &Vault) -> Result<PeriodState, Error> {
    let state = Storage::period_state(env);
    let Some(step) = pending_advance(env, config, vault, &state)? else {
        return Ok(state);
    };

    let next = step.apply(&state, config.period_duration)?;
    Storage::set_shares_per_period(env, step.from, &step.record(config.period_duration)?);
    Storage::lower_share_price_cap(env, step.price);
    Storage::set_period_state(env, &next);

    log!(env, "period advanced", step.from, step.elapsed, step.price);

    Ok(next)
}

/// A receiver's balance and rate schedule after a catch-up
pub struct Settlement {
    pub balance: ReceiverBalance,
    pub schedule: Map<u64, RateChange>,
    /// Whether `schedule` lost entries and needs writing back
    pub rescheduled: bool,
}

impl Settlement {
    pub fn save(&self, env: &Env, receiver: &Address) {
        Storage::set_receiver_balance(env, receiver, &self.balance);
        if self.rescheduled {
            Storage::set_rate_schedule(env, receiver, &self.schedule);
        }
    }
}

/// Credit `receiver` for the boundaries it has not been settled for, up to
/// `current_period`. Nothing is written; the caller saves the settlement.
///
/// The walk moves in runs of one price: a run starts where an advance
/// started and ends where it stopped. Inside a run, every change in the
/// receiver's own schedule splits off a segment settled with one
/// multiplication. Storage reads follow advances, not elapsed periods, and
/// stop after `MAX_WALK_RUNS`, always on a recorded boundary. `in_flight`
/// supplies the record of an advance that is computed but not stored.
pub fn catch_up(
    env: &Env,
    config: &Config,
    vault: &Vault,
    receiver: &Address,
    current_period: u64,
    in_flight: Option<&Advance>,
) -> Result<Settlement, Error> {
    let duration = config.period_duration;
    let mut balance = Storage::receiver_balance(env, receiver)
        .unwrap_or_else(|| ReceiverBalance::new(current_period));
    let mut schedule = Storage::rate_schedule(env, receiver);
    let mut rescheduled = false;

    let mut run: Option<PeriodPrice> = None;
    let mut runs: u32 = 0;
    let mut segments: u32 = 0;

    while balance.last_update.saturating_add(duration) <= current_period {
        let period = balance.last_update;

        let (price, run_end) = match &run {
            Some(record) if record.next > period => (record.price, record.next),
            _ => {
                if runs == MAX_WALK_RUNS {
                    break;
                }
                runs += 1;
                run = match in_flight {
                    Some(step) if step.from == period => Some(step.record(duration)?),
                    _ => Storage::shares_per_period(env, period),
                };
                match &run {
                    Some(record) if record.next > period => (record.price, record.next),
                    // A walk always starts on a recorded boundary; this is the sentinel.
                    _ => (ledger_price(env, vault)?, period + duration),
                }
            }
        };

        if let Some(change) = schedule.get(period) {
            balance.amount_per_period = balance
                .amount_per_period
                .checked_add(change.start)
                .and_then(|rate| rate.checked_sub(change.expire))
                .filter(|rate| *rate >= 0)
                .ok_or(Error::ArithmeticError)?;
            schedule.remove(period);
            rescheduled = true;
        }

        let mut end = run_end.min(current_period);
        if let Some((boundary, _)) = schedule.iter().next() {
            if boundary > period {
                end = end.min(boundary);
            }
        }
        let periods = (end - period) / duration;

        let earned = math::accrued(balance.amount_per_period, price)
            .and_then(|per_period| per_period.checked_mul(i128::from(periods)))
            .ok_or(Error::ArithmeticError)?;
        balance.balance = balance
            .balance
            .checked_add(earned)
            .ok_or(Error::ArithmeticError)?;

        balance.last_update = period + periods * duration;
        segments += 1;
    }

    if segments > 0 {
        log!(env, "receiver caught up", receiver.clone(), runs, segments, balance.balance);
    }

    Ok(Settlement {
        balance,
        schedule,
        rescheduled,
    })
}
