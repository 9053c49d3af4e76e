#![allow(dead_code)]

use soroban_sdk::{
    testutils::{Address as _, Ledger},
    token::{self, StellarAssetClient},
    Address, Env,
};
use subs::{Subs, SubsClient, Subscription, DIVISOR};
use yield_vault::{YieldVault, YieldVaultClient};

pub const SCALE: i128 = 10_000_000;
pub const DAY: u64 = 86_400;
pub const T0: u64 = 1_693_526_400;

pub struct Harness<'a> {
    pub env: Env,
    pub admin: Address,
    pub fee_collector: Address,
    pub asset: Address,
    pub token: token::Client<'a>,
    pub vault: YieldVaultClient<'a>,
    pub subs: SubsClient<'a>,
    pub period: u64,
}

impl<'a> Harness<'a> {
    pub fn new(period: u64) -> Self {
        let env = Env::default();
        env.mock_all_auths();
        env.ledger().with_mut(|li| li.timestamp = T0);

        let admin = Address::generate(&env);
        let fee_collector = Address::generate(&env);

        let asset = env
            .register_stellar_asset_contract_v2(admin.clone())
            .address();
        let token = token::Client::new(&env, &asset);

        let vault_id = env.register(YieldVault, ());
        let vault = YieldVaultClient::new(&env, &vault_id);
        vault.initialize(&admin, &asset);

        let subs_id = env.register(Subs, ());
        let subs = SubsClient::new(&env, &subs_id);
        subs.initialize(&admin, &asset, &vault_id, &fee_collector, &period, &T0);

        Harness {
            env,
            admin,
            fee_collector,
            asset,
            token,
            vault,
            subs,
            period,
        }
    }

    /// A fresh account holding `funds` of the asset
    pub fn user(&self, funds: i128) -> Address {
        let user = Address::generate(&self.env);
        if funds > 0 {
            StellarAssetClient::new(&self.env, &self.asset).mint(&user, &funds);
        }
        user
    }

    pub fn jump_to(&self, timestamp: u64) {
        self.env.ledger().with_mut(|li| li.timestamp = timestamp);
    }

    pub fn now(&self) -> u64 {
        self.env.ledger().timestamp()
    }

    /// Asset sent straight to the vault raises its share price
    pub fn add_yield(&self, amount: i128) {
        StellarAssetClient::new(&self.env, &self.asset).mint(&self.vault.address, &amount);
    }

    /// Vault shares held by the ledger
    pub fn ledger_shares(&self) -> i128 {
        self.vault.balance_of(&self.subs.address)
    }

    pub fn unsubscribe(&self, subscriber: &Address, sub: &Subscription) -> i128 {
        self.subs.unsubscribe(
            subscriber,
            &sub.initial_period,
            &sub.expiration_date,
            &sub.amount_per_cycle,
            &sub.receiver,
            &sub.accumulator_at_start,
            &sub.initial_shares,
        )
    }

    /// Committed shares still owed back to the subscriber were it to cancel now.
    /// Call after `advance()`.
    pub fn unconsumed(&self, sub: &Subscription) -> i128 {
        let current_period = self.subs.current_period();
        if sub.expiration_date <= current_period {
            return 0;
        }
        let initial_period_price = if current_period > sub.initial_period {
            self.subs.shares_per_period(&sub.initial_period)
        } else {
            0
        };
        let spent =
            self.subs.shares_accumulator() - sub.accumulator_at_start - initial_period_price;
        let consumed = (spent.max(0) * sub.amount_per_cycle / DIVISOR).min(sub.initial_shares);
        sub.initial_shares - consumed
    }
}
