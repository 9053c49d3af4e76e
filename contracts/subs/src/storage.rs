use crate::error::Error;
use soroban_sdk::{contracttype, xdr::ToXdr, Address, BytesN, Env, IntoVal, Map, TryFromVal, Val};

// Constants
pub const DIVISOR: i128 = 1_000_000_000_000_000_000; // 1e18, independent of asset decimals
pub const FEE_BPS: i128 = 100; // 1% of every claim
pub const BASIS_POINTS: i128 = 10_000;
pub const DEPOSITS_DISABLED: i128 = i128::MAX;

pub const DAY_IN_LEDGERS: u32 = 17_280;
pub const INSTANCE_BUMP_AMOUNT: u32 = 30 * DAY_IN_LEDGERS;
pub const INSTANCE_LIFETIME_THRESHOLD: u32 = INSTANCE_BUMP_AMOUNT - DAY_IN_LEDGERS;
pub const PERSISTENT_BUMP_AMOUNT: u32 = 180 * DAY_IN_LEDGERS;
pub const PERSISTENT_LIFETIME_THRESHOLD: u32 = PERSISTENT_BUMP_AMOUNT - 30 * DAY_IN_LEDGERS;

/// Deployment parameters, fixed at `initialize`
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Sole holder of the pause switch
    pub admin: Address,
    /// Token subscribers pay in
    pub asset: Address,
    /// Share vault the payments are parked in
    pub vault: Address,
    /// Receiver credited with the claim fee
    pub fee_collector: Address,
    /// Length of one billing period in seconds
    pub period_duration: u64,
}

/// Clock and accumulator as of the last observed boundary
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeriodState {
    pub current_period: u64,
    pub shares_accumulator: i128,
}

/// Share price recorded when a boundary was left. Every boundary skipped by
/// the same advance, up to `next`, shares it.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeriodPrice {
    pub price: i128,
    /// Boundary the advance stopped at
    pub next: u64,
}

/// Rate adjustments a receiver picks up when its walk reaches a boundary
#[contracttype]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RateChange {
    pub start: i128,
    pub expire: i128,
}

impl RateChange {
    pub fn is_empty(&self) -> bool {
        self.start == 0 && self.expire == 0
    }
}

/// One commitment. Never stored directly: its hash marks it active.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscription {
    pub receiver: Address,
    /// Assets paid to the receiver per period
    pub amount_per_cycle: i128,
    /// Period the subscription was opened in
    pub initial_period: u64,
    /// First boundary at which the receiver no longer earns from it
    pub expiration_date: u64,
    /// Accumulator value when the subscription was opened
    pub accumulator_at_start: i128,
    /// Shares committed to future periods
    pub initial_shares: i128,
}

impl Subscription {
    pub fn id(&self, env: &Env) -> BytesN<32> {
        env.crypto().sha256(&self.clone().to_xdr(env)).to_bytes()
    }
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceiverBalance {
    /// Claimable shares
    pub balance: i128,
    /// Assets per period from subscriptions currently earning
    pub amount_per_period: i128,
    /// Next period boundary the catch-up walk will settle
    pub last_update: u64,
}

impl ReceiverBalance {
    pub fn new(current_period: u64) -> Self {
        ReceiverBalance {
            balance: 0,
            amount_per_period: 0,
            last_update: current_period,
        }
    }
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Initialized,
    Config,
    CurrentPeriod,
    SharesAccumulator,
    MinBalanceToTriggerDeposit,
    SharePriceCap,                          // highest share price the accumulator may use
    SharesPerPeriod(u64),                   // period -> PeriodPrice
    Subscription(Address, BytesN<32>),      // (subscriber, id) -> active copies
    ReceiverBalance(Address),               // receiver -> ReceiverBalance
    RateSchedule(Address),                  // receiver -> Map<period, RateChange>
}

pub struct Storage;

impl Storage {
    pub fn bump_instance(env: &Env) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
    }

    /// (threshold, extend_to) for persistent entries, capped below the
    /// network's maximum entry lifetime
    fn persistent_window(env: &Env) -> (u32, u32) {
        let ledger = env.ledger();
        let room = ledger
            .max_live_until_ledger()
            .saturating_sub(ledger.sequence())
            .saturating_sub(1);
        let extend_to = PERSISTENT_BUMP_AMOUNT.min(room);
        (PERSISTENT_LIFETIME_THRESHOLD.min(extend_to), extend_to)
    }

    fn extend_persistent(env: &Env, key: &DataKey) {
        let (threshold, extend_to) = Self::persistent_window(env);
        env.storage()
            .persistent()
            .extend_ttl(key, threshold, extend_to);
    }

    fn set_persistent<V>(env: &Env, key: &DataKey, value: &V)
    where
        V: IntoVal<Env, Val>,
    {
        env.storage().persistent().set(key, value);
        Self::extend_persistent(env, key);
    }

    /// Read an entry and keep it alive for another window
    fn get_persistent<V>(env: &Env, key: &DataKey) -> Option<V>
    where
        V: TryFromVal<Env, Val>,
    {
        let value = env.storage().persistent().get(key);
        if value.is_some() {
            Self::extend_persistent(env, key);
        }
        value
    }

    // Config
    pub fn is_initialized(env: &Env) -> bool {
        env.storage().instance().has(&DataKey::Initialized)
    }

    pub fn init(env: &Env, config: &Config, period_start: u64) {
        env.storage().instance().set(&DataKey::Initialized, &true);
        env.storage().instance().set(&DataKey::Config, config);
        env.storage()
            .instance()
            .set(&DataKey::MinBalanceToTriggerDeposit, &0i128);
        Self::set_period_state(
            env,
            &PeriodState {
                current_period: period_start,
                shares_accumulator: 0,
            },
        );
    }

    pub fn config(env: &Env) -> Result<Config, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(Error::NotInitialized)
    }

    pub fn min_balance_to_trigger_deposit(env: &Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::MinBalanceToTriggerDeposit)
            .unwrap_or(0)
    }

    pub fn set_min_balance_to_trigger_deposit(env: &Env, threshold: i128) {
        env.storage()
            .instance()
            .set(&DataKey::MinBalanceToTriggerDeposit, &threshold);
    }

    // Period clock
    pub fn period_state(env: &Env) -> PeriodState {
        PeriodState {
            current_period: env
                .storage()
                .instance()
                .get(&DataKey::CurrentPeriod)
                .unwrap_or(0),
            shares_accumulator: env
                .storage()
                .instance()
                .get(&DataKey::SharesAccumulator)
                .unwrap_or(0),
        }
    }

    pub fn set_period_state(env: &Env, state: &PeriodState) {
        env.storage()
            .instance()
            .set(&DataKey::CurrentPeriod, &state.current_period);
        env.storage()
            .instance()
            .set(&DataKey::SharesAccumulator, &state.shares_accumulator);
    }

    pub fn shares_per_period(env: &Env, period: u64) -> Option<PeriodPrice> {
        Self::get_persistent(env, &DataKey::SharesPerPeriod(period))
    }

    pub fn set_shares_per_period(env: &Env, period: u64, record: &PeriodPrice) {
        Self::set_persistent(env, &DataKey::SharesPerPeriod(period), record);
    }

    pub fn share_price_cap(env: &Env) -> Option<i128> {
        env.storage().instance().get(&DataKey::SharePriceCap)
    }

    /// Lower the cap to `price` if it sits above it
    pub fn lower_share_price_cap(env: &Env, price: i128) {
        if Self::share_price_cap(env).map_or(true, |cap| price < cap) {
            env.storage().instance().set(&DataKey::SharePriceCap, &price);
        }
    }

    // Subscription markers
    pub fn active_copies(env: &Env, subscriber: &Address, id: &BytesN<32>) -> u32 {
        Self::get_persistent(env, &DataKey::Subscription(subscriber.clone(), id.clone()))
            .unwrap_or(0)
    }

    pub fn activate_subscription(env: &Env, subscriber: &Address, id: &BytesN<32>) {
        let copies = Self::active_copies(env, subscriber, id) + 1;
        Self::set_persistent(
            env,
            &DataKey::Subscription(subscriber.clone(), id.clone()),
            &copies,
        );
    }

    /// Returns false when no active copy is left to consume.
    pub fn consume_subscription(env: &Env, subscriber: &Address, id: &BytesN<32>) -> bool {
        let key = DataKey::Subscription(subscriber.clone(), id.clone());
        match Self::active_copies(env, subscriber, id) {
            0 => false,
            1 => {
                env.storage().persistent().remove(&key);
                true
            }
            copies => {
                Self::set_persistent(env, &key, &(copies - 1));
                true
            }
        }
    }

    // Receivers
    pub fn receiver_balance(env: &Env, receiver: &Address) -> Option<ReceiverBalance> {
        Self::get_persistent(env, &DataKey::ReceiverBalance(receiver.clone()))
    }

    pub fn set_receiver_balance(env: &Env, receiver: &Address, balance: &ReceiverBalance) {
        Self::set_persistent(env, &DataKey::ReceiverBalance(receiver.clone()), balance);
    }

    /// Pending rate changes of `receiver`, keyed by boundary. Only boundaries
    /// its walk has not reached yet are kept.
    pub fn rate_schedule(env: &Env, receiver: &Address) -> Map<u64, RateChange> {
        Self::get_persistent(env, &DataKey::RateSchedule(receiver.clone()))
            .unwrap_or_else(|| Map::new(env))
    }

    pub fn set_rate_schedule(env: &Env, receiver: &Address, schedule: &Map<u64, RateChange>) {
        let key = DataKey::RateSchedule(receiver.clone());
        if schedule.is_empty() {
            env.storage().persistent().remove(&key);
        } else {
            Self::set_persistent(env, &key, schedule);
        }
    }

    pub fn rate_change(env: &Env, receiver: &Address, period: u64) -> RateChange {
        Self::rate_schedule(env, receiver)
            .get(period)
            .unwrap_or_default()
    }
}

/// Add `start` and `expire` to the change booked at `period`. Either may be
/// negative to withdraw an earlier booking; a change that nets out is dropped.
pub fn book_rate_change(
    schedule: &mut Map<u64, RateChange>,
    period: u64,
    start: i128,
    expire: i128,
) -> Result<(), Error> {
    let booked = schedule.get(period).unwrap_or_default();
    let change = RateChange {
        start: booked
            .start
            .checked_add(start)
            .filter(|total| *total >= 0)
            .ok_or(Error::ArithmeticError)?,
        expire: booked
            .expire
            .checked_add(expire)
            .filter(|total| *total >= 0)
            .ok_or(Error::ArithmeticError)?,
    };
    if change.is_empty() {
        schedule.remove(period);
    } else {
        schedule.set(period, change);
    }
    Ok(())
}
