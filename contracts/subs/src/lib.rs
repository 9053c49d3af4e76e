#![no_std]

mod accrual;
mod error;
mod events;
mod math;
mod storage;
mod value_store;

pub use error::Error;
pub use accrual::MAX_WALK_RUNS;
pub use storage::{
    Config, PeriodState, ReceiverBalance, Subscription, BASIS_POINTS, DEPOSITS_DISABLED,
    DIVISOR, FEE_BPS,
};

use events::{ClaimedEvent, DepositThresholdEvent, NewSubscriptionEvent, UnsubscribedEvent};
use storage::{book_rate_change, Storage};
use value_store::Vault;

use soroban_sdk::{contract, contractimpl, token, Address, BytesN, Env, Symbol};

/// Recurring payments from subscribers to receivers, parked in a share vault
/// until claimed. Settlement is lazy: nothing iterates over subscribers, and
/// a receiver's balance is brought up to date only when it is touched.
#[contract]
pub struct Subs;

#[contractimpl]
impl Subs {
    // ============================================
    // INITIALIZATION & ADMIN
    // ============================================

    /// Initialize the ledger
    ///
    /// `period_start` becomes the first period boundary. It may lie in the
    /// past; the periods since then are settled on the first call.
    ///
    /// # Errors
    /// - `AlreadyInitialized`: Contract already initialized
    /// - `InvalidPeriodDuration`: period_duration must be positive
    /// - `InvalidTimestamp`: period_start lies in the future
    /// - `AdapterFailure`: Vault approval failed
    pub fn initialize(
        env: Env,
        admin: Address,
        asset: Address,
        vault: Address,
        fee_collector: Address,
        period_duration: u64,
        period_start: u64,
    ) -> Result<(), Error> {
        if Storage::is_initialized(&env) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        if period_duration == 0 {
            return Err(Error::InvalidPeriodDuration);
        }
        if period_start > env.ledger().timestamp() {
            return Err(Error::InvalidTimestamp);
        }

        let config = Config {
            admin,
            asset,
            vault,
            fee_collector,
            period_duration,
        };
        Storage::init(&env, &config, period_start);
        Storage::bump_instance(&env);

        Self::approve_vault(&env, &config)
    }

    /// Set the deposit threshold. `DEPOSITS_DISABLED` pauses new
    /// subscriptions; cancellations and claims keep working.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `Unauthorized`: Caller is not admin
    /// - `InvalidAmount`: threshold must be non-negative
    pub fn set_deposit_threshold(
        env: Env,
        caller: Address,
        threshold: i128,
    ) -> Result<(), Error> {
        caller.require_auth();

        let config = Storage::config(&env)?;
        if caller != config.admin {
            return Err(Error::Unauthorized);
        }
        if threshold < 0 {
            return Err(Error::InvalidAmount);
        }

        Storage::set_min_balance_to_trigger_deposit(&env, threshold);
        Storage::bump_instance(&env);

        env.events().publish(
            (Symbol::new(&env, "deposit_threshold"),),
            DepositThresholdEvent { threshold },
        );

        Ok(())
    }

    /// Renew the ledger's allowance for the vault over the asset. Anyone may
    /// call it.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `AdapterFailure`: Token approval failed
    pub fn refresh_approval(env: Env) -> Result<(), Error> {
        let config = Storage::config(&env)?;
        Self::approve_vault(&env, &config)
    }

    /// Settle every period boundary crossed since the last call
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `AdapterFailure`: Vault price query failed
    pub fn advance(env: Env) -> Result<PeriodState, Error> {
        let config = Storage::config(&env)?;
        let vault = Vault::new(&env, &config.vault);
        let state = accrual::advance(&env, &config, &vault)?;
        Storage::bump_instance(&env);
        Ok(state)
    }

    // ============================================
    // SUBSCRIPTIONS
    // ============================================

    /// Subscribe `receiver` to `amount_per_cycle` per period for the rest of
    /// the current period plus `num_cycles` full periods
    ///
    /// The remainder of the current period is charged pro rata and credited
    /// to the receiver straight away. The returned record is what
    /// `unsubscribe` expects back.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `Paused`: Deposits are disabled
    /// - `InvalidAmount`: amount_per_cycle must be positive, total payment non-zero
    /// - `AdapterFailure`: Asset pull or vault deposit failed
    /// - `ArithmeticError`: Overflow
    pub fn subscribe(
        env: Env,
        subscriber: Address,
        receiver: Address,
        amount_per_cycle: i128,
        num_cycles: u64,
    ) -> Result<Subscription, Error> {
        subscriber.require_auth();

        let config = Self::deposit_config(&env)?;
        if amount_per_cycle <= 0 {
            return Err(Error::InvalidAmount);
        }

        let vault = Vault::new(&env, &config.vault);
        let state = accrual::advance(&env, &config, &vault)?;
        let now = env.ledger().timestamp();

        let claimable = math::prorated(
            amount_per_cycle,
            state.current_period,
            config.period_duration,
            now,
        )
        .ok_or(Error::ArithmeticError)?;
        let future = amount_per_cycle
            .checked_mul(i128::from(num_cycles))
            .ok_or(Error::ArithmeticError)?;
        let total = claimable
            .checked_add(future)
            .ok_or(Error::ArithmeticError)?;
        if total == 0 {
            return Err(Error::InvalidAmount);
        }

        let shares = Self::collect(&env, &vault, &config, &subscriber, total)?;
        Self::observe_deposit_price(&env, shares, total)?;
        let (credited, committed) =
            math::split_shares(shares, claimable, total).ok_or(Error::ArithmeticError)?;

        let subscription = Subscription {
            receiver,
            amount_per_cycle,
            initial_period: state.current_period,
            expiration_date: Self::expiration(&state, &config, num_cycles, 1)?,
            accumulator_at_start: state.shares_accumulator,
            initial_shares: committed,
        };
        Self::open(&env, &config, &subscriber, &subscription, credited, "new_sub")?;

        Ok(subscription)
    }

    /// Subscribe starting at the next period boundary, for `num_cycles + 1`
    /// full periods. Nothing is prorated or credited now.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `Paused`: Deposits are disabled
    /// - `InvalidAmount`: amount_per_cycle must be positive
    /// - `AdapterFailure`: Asset pull or vault deposit failed
    /// - `ArithmeticError`: Overflow
    pub fn subscribe_for_next_period(
        env: Env,
        subscriber: Address,
        receiver: Address,
        amount_per_cycle: i128,
        num_cycles: u64,
    ) -> Result<Subscription, Error> {
        subscriber.require_auth();

        let config = Self::deposit_config(&env)?;
        if amount_per_cycle <= 0 {
            return Err(Error::InvalidAmount);
        }

        let vault = Vault::new(&env, &config.vault);
        let state = accrual::advance(&env, &config, &vault)?;

        let cycles = num_cycles.checked_add(1).ok_or(Error::ArithmeticError)?;
        let total = amount_per_cycle
            .checked_mul(i128::from(cycles))
            .ok_or(Error::ArithmeticError)?;

        let shares = Self::collect(&env, &vault, &config, &subscriber, total)?;
        Self::observe_deposit_price(&env, shares, total)?;

        let subscription = Subscription {
            receiver,
            amount_per_cycle,
            initial_period: state.current_period,
            expiration_date: Self::expiration(&state, &config, num_cycles, 2)?,
            accumulator_at_start: state.shares_accumulator,
            initial_shares: shares,
        };
        Self::open(&env, &config, &subscriber, &subscription, 0, "new_delayed_sub")?;

        Ok(subscription)
    }

    /// Cancel a subscription and refund its unconsumed shares to the
    /// subscriber. Takes the fields of the `Subscription` record returned at
    /// creation. Returns the assets refunded, 0 if it had already run out.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `InvalidSubscription`: No active subscription matches the fields
    /// - `AdapterFailure`: Vault redeem failed
    /// - `ArithmeticError`: Overflow
    #[allow(clippy::too_many_arguments)]
    pub fn unsubscribe(
        env: Env,
        subscriber: Address,
        initial_period: u64,
        expiration_date: u64,
        amount_per_cycle: i128,
        receiver: Address,
        accumulator_at_start: i128,
        initial_shares: i128,
    ) -> Result<i128, Error> {
        subscriber.require_auth();

        let config = Storage::config(&env)?;
        let vault = Vault::new(&env, &config.vault);
        let state = accrual::advance(&env, &config, &vault)?;

        let subscription = Subscription {
            receiver,
            amount_per_cycle,
            initial_period,
            expiration_date,
            accumulator_at_start,
            initial_shares,
        };
        let id = subscription.id(&env);
        if !Storage::consume_subscription(&env, &subscriber, &id) {
            return Err(Error::InvalidSubscription);
        }
        Storage::bump_instance(&env);

        if expiration_date <= state.current_period {
            return Ok(0);
        }

        // Withdraw the rate from the first period not yet paid for. The
        // receiver's walk picks it up whenever it next runs.
        let receiver = subscription.receiver;
        let mut schedule = Storage::rate_schedule(&env, &receiver);
        if state.current_period == initial_period {
            let first = initial_period
                .checked_add(config.period_duration)
                .ok_or(Error::ArithmeticError)?;
            book_rate_change(&mut schedule, first, -amount_per_cycle, 0)?;
        } else {
            book_rate_change(&mut schedule, state.current_period, 0, amount_per_cycle)?;
        }
        book_rate_change(&mut schedule, expiration_date, 0, -amount_per_cycle)?;
        Storage::set_rate_schedule(&env, &receiver, &schedule);

        let initial_period_price = if state.current_period > initial_period {
            match Storage::shares_per_period(&env, initial_period) {
                Some(record) => record.price,
                None => accrual::ledger_price(&env, &vault)?,
            }
        } else {
            0
        };
        let consumed = math::consumed_shares(
            state.shares_accumulator,
            accumulator_at_start,
            initial_period_price,
            amount_per_cycle,
            initial_shares,
        )
        .ok_or(Error::ArithmeticError)?;

        let refunded_shares = initial_shares - consumed;
        let refunded_assets = if refunded_shares > 0 {
            vault.redeem(&env.current_contract_address(), &subscriber, refunded_shares)?
        } else {
            0
        };

        env.events().publish(
            (Symbol::new(&env, "unsubscribed"), subscriber.clone()),
            UnsubscribedEvent {
                subscriber,
                id,
                refunded_shares,
                refunded_assets,
            },
        );

        Ok(refunded_assets)
    }

    // ============================================
    // RECEIVERS
    // ============================================

    /// Withdraw `max_shares` of the receiver's accrued balance, less the fee.
    /// Returns the assets paid out.
    ///
    /// `claim(receiver, 0)` only settles the receiver's balance. One call
    /// settles at most `MAX_WALK_RUNS` runs; a receiver left further
    /// behind can claim what is settled so far and continue with more calls.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `InvalidAmount`: max_shares must be non-negative
    /// - `InsufficientBalance`: max_shares exceeds the accrued balance
    /// - `AdapterFailure`: Vault call failed
    /// - `ArithmeticError`: Overflow or negative receiver rate
    pub fn claim(env: Env, receiver: Address, max_shares: i128) -> Result<i128, Error> {
        receiver.require_auth();

        let config = Storage::config(&env)?;
        if max_shares < 0 {
            return Err(Error::InvalidAmount);
        }

        let vault = Vault::new(&env, &config.vault);
        let state = accrual::advance(&env, &config, &vault)?;
        let mut settlement = accrual::catch_up(
            &env,
            &config,
            &vault,
            &receiver,
            state.current_period,
            None,
        )?;

        if max_shares > settlement.balance.balance {
            return Err(Error::InsufficientBalance);
        }
        settlement.balance.balance -= max_shares;
        settlement.save(&env, &receiver);
        Storage::bump_instance(&env);

        if max_shares == 0 {
            return Ok(0);
        }

        let (fee, payout) = math::fee_split(max_shares).ok_or(Error::ArithmeticError)?;
        if fee > 0 {
            // Credited as is: the collector's own walk is left for its next claim
            let mut collector = Storage::receiver_balance(&env, &config.fee_collector)
                .unwrap_or_else(|| ReceiverBalance::new(state.current_period));
            collector.balance = collector
                .balance
                .checked_add(fee)
                .ok_or(Error::ArithmeticError)?;
            Storage::set_receiver_balance(&env, &config.fee_collector, &collector);
        }

        let assets = vault.redeem(&env.current_contract_address(), &receiver, payout)?;

        env.events().publish(
            (Symbol::new(&env, "claimed"), receiver.clone()),
            ClaimedEvent {
                receiver,
                shares: max_shares,
                fee,
                assets,
            },
        );

        Ok(assets)
    }

    /// Shares `receiver` could claim right now, from the same bounded walk a
    /// claim runs. Writes nothing.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `AdapterFailure`: Vault price query failed
    /// - `ArithmeticError`: Overflow or negative receiver rate
    pub fn preview_balance(env: Env, receiver: Address) -> Result<i128, Error> {
        let config = Storage::config(&env)?;
        let vault = Vault::new(&env, &config.vault);

        let state = Storage::period_state(&env);
        let step = accrual::pending_advance(&env, &config, &vault, &state)?;
        let current_period = match &step {
            Some(step) => step.apply(&state, config.period_duration)?.current_period,
            None => state.current_period,
        };

        let settlement = accrual::catch_up(
            &env,
            &config,
            &vault,
            &receiver,
            current_period,
            step.as_ref(),
        )?;
        Ok(settlement.balance.balance)
    }

    // ============================================
    // VIEW FUNCTIONS
    // ============================================

    pub fn config(env: Env) -> Result<Config, Error> {
        Storage::config(&env)
    }

    pub fn current_period(env: Env) -> Result<u64, Error> {
        Storage::config(&env)?;
        Ok(Storage::period_state(&env).current_period)
    }

    pub fn shares_accumulator(env: Env) -> Result<i128, Error> {
        Storage::config(&env)?;
        Ok(Storage::period_state(&env).shares_accumulator)
    }

    pub fn period_duration(env: Env) -> Result<u64, Error> {
        Ok(Storage::config(&env)?.period_duration)
    }

    /// Share price recorded when `period` was left, 0 if none was
    pub fn shares_per_period(env: Env, period: u64) -> Result<i128, Error> {
        Storage::config(&env)?;
        Ok(Storage::shares_per_period(&env, period).map_or(0, |record| record.price))
    }

    /// Stored balance, as of its `last_update`
    pub fn receiver_balances(env: Env, receiver: Address) -> Result<ReceiverBalance, Error> {
        Storage::config(&env)?;
        Ok(Storage::receiver_balance(&env, &receiver).unwrap_or_else(|| {
            ReceiverBalance::new(Storage::period_state(&env).current_period)
        }))
    }

    /// Rate `receiver` loses when its walk reaches `period`
    pub fn receiver_amount_to_expire(
        env: Env,
        receiver: Address,
        period: u64,
    ) -> Result<i128, Error> {
        Storage::config(&env)?;
        Ok(Storage::rate_change(&env, &receiver, period).expire)
    }

    /// Rate `receiver` gains when its walk reaches `period`
    pub fn receiver_amount_to_start(
        env: Env,
        receiver: Address,
        period: u64,
    ) -> Result<i128, Error> {
        Storage::config(&env)?;
        Ok(Storage::rate_change(&env, &receiver, period).start)
    }

    /// Highest share price the accumulator may record, if any was observed
    pub fn share_price_cap(env: Env) -> Result<Option<i128>, Error> {
        Storage::config(&env)?;
        Ok(Storage::share_price_cap(&env))
    }

    pub fn min_balance_to_trigger_deposit(env: Env) -> Result<i128, Error> {
        Storage::config(&env)?;
        Ok(Storage::min_balance_to_trigger_deposit(&env))
    }

    /// Asset value of every share the ledger holds
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `AdapterFailure`: Vault query failed
    pub fn total_assets(env: Env) -> Result<i128, Error> {
        let config = Storage::config(&env)?;
        let vault = Vault::new(&env, &config.vault);
        let shares = vault.balance_of(&env.current_contract_address())?;
        vault.convert_to_assets(shares)
    }

    pub fn subscription_id(
        env: Env,
        initial_period: u64,
        expiration_date: u64,
        amount_per_cycle: i128,
        receiver: Address,
        accumulator_at_start: i128,
        initial_shares: i128,
    ) -> BytesN<32> {
        Subscription {
            receiver,
            amount_per_cycle,
            initial_period,
            expiration_date,
            accumulator_at_start,
            initial_shares,
        }
        .id(&env)
    }

    pub fn is_active(env: Env, subscriber: Address, id: BytesN<32>) -> bool {
        Storage::active_copies(&env, &subscriber, &id) > 0
    }

    // ============================================
    // INTERNAL HELPERS
    // ============================================

    fn deposit_config(env: &Env) -> Result<Config, Error> {
        let config = Storage::config(env)?;
        if Storage::min_balance_to_trigger_deposit(env) == DEPOSITS_DISABLED {
            return Err(Error::Paused);
        }
        Ok(config)
    }

    fn approve_vault(env: &Env, config: &Config) -> Result<(), Error> {
        let token = token::Client::new(env, &config.asset);
        // The latest ledger the host still accepts for a new allowance
        let expiration = env.ledger().max_live_until_ledger().saturating_sub(1);
        match token.try_approve(
            &env.current_contract_address(),
            &config.vault,
            &i128::MAX,
            &expiration,
        ) {
            Ok(Ok(())) => Ok(()),
            _ => Err(Error::AdapterFailure),
        }
    }

    /// Pull `assets` from `from` and park them in the vault
    fn collect(
        env: &Env,
        vault: &Vault,
        config: &Config,
        from: &Address,
        assets: i128,
    ) -> Result<i128, Error> {
        let this = env.current_contract_address();
        let token = token::Client::new(env, &config.asset);
        match token.try_transfer(from, &this, &assets) {
            Ok(Ok(())) => {}
            _ => return Err(Error::AdapterFailure),
        }
        let allowance = match token.try_allowance(&this, &config.vault) {
            Ok(Ok(allowance)) => allowance,
            _ => return Err(Error::AdapterFailure),
        };
        if allowance < assets {
            Self::approve_vault(env, config)?;
        }
        vault.deposit(&this, assets)
    }

    /// No later advance may price shares above what this deposit bought
    fn observe_deposit_price(env: &Env, shares: i128, assets: i128) -> Result<(), Error> {
        let price = math::share_price(shares, assets).ok_or(Error::ArithmeticError)?;
        Storage::lower_share_price_cap(env, price);
        Ok(())
    }

    fn expiration(
        state: &PeriodState,
        config: &Config,
        num_cycles: u64,
        extra: u64,
    ) -> Result<u64, Error> {
        num_cycles
            .checked_add(extra)
            .and_then(|cycles| cycles.checked_mul(config.period_duration))
            .and_then(|span| span.checked_add(state.current_period))
            .ok_or(Error::ArithmeticError)
    }

    /// Book a freshly paid subscription against its receiver. The receiver
    /// is not walked: its rate starts and ends through its schedule.
    fn open(
        env: &Env,
        config: &Config,
        subscriber: &Address,
        subscription: &Subscription,
        credited: i128,
        topic: &str,
    ) -> Result<(), Error> {
        let receiver = &subscription.receiver;
        let mut balance = Storage::receiver_balance(env, receiver)
            .unwrap_or_else(|| ReceiverBalance::new(subscription.initial_period));
        balance.balance = balance
            .balance
            .checked_add(credited)
            .ok_or(Error::ArithmeticError)?;
        Storage::set_receiver_balance(env, receiver, &balance);

        let first = subscription
            .initial_period
            .checked_add(config.period_duration)
            .ok_or(Error::ArithmeticError)?;
        let mut schedule = Storage::rate_schedule(env, receiver);
        book_rate_change(&mut schedule, first, subscription.amount_per_cycle, 0)?;
        book_rate_change(
            &mut schedule,
            subscription.expiration_date,
            0,
            subscription.amount_per_cycle,
        )?;
        Storage::set_rate_schedule(env, receiver, &schedule);

        let id = subscription.id(env);
        Storage::activate_subscription(env, subscriber, &id);
        Storage::bump_instance(env);

        env.events().publish(
            (Symbol::new(env, topic), subscriber.clone()),
            NewSubscriptionEvent {
                subscriber: subscriber.clone(),
                id,
                initial_period: subscription.initial_period,
                expiration_date: subscription.expiration_date,
                amount_per_cycle: subscription.amount_per_cycle,
                receiver: receiver.clone(),
                accumulator_at_start: subscription.accumulator_at_start,
                initial_shares: subscription.initial_shares,
            },
        );

        Ok(())
    }
}
