#![no_std]

mod error;
mod events;
mod pricing;
mod storage;

pub use error::Error;
use events::{DepositEvent, LossEvent, RedeemEvent};
use pricing::{to_assets, to_shares};
use storage::DataKey;

use soroban_sdk::{contract, contractimpl, token, Address, Env, Symbol};

/// Single-asset share vault. Anything sent to the vault's address counts as
/// yield and raises the share price for every holder.
#[contract]
pub struct YieldVault;

#[contractimpl]
impl YieldVault {
    // ============================================
    // INITIALIZATION & ADMIN
    // ============================================

    /// Initialize the vault over `asset`
    ///
    /// # Errors
    /// - `AlreadyInitialized`: Contract already initialized
    pub fn initialize(env: Env, admin: Address, asset: Address) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Initialized) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Initialized, &true);
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Asset, &asset);
        storage::set_total_supply(&env, 0);
        storage::bump_instance(&env);

        Ok(())
    }

    /// Move `amount` of the underlying out to the admin, lowering the share
    /// price. Stands in for a strategy loss.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `InvalidAmount`: amount must be positive and covered by the vault
    pub fn report_loss(env: Env, amount: i128) -> Result<(), Error> {
        let admin: Address = env
            .storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)?;
        admin.require_auth();

        let held = Self::total_assets(env.clone())?;
        if amount <= 0 || amount > held {
            return Err(Error::InvalidAmount);
        }

        Self::asset_client(&env)?.transfer(&env.current_contract_address(), &admin, &amount);

        env.events().publish(
            (Symbol::new(&env, "loss"),),
            LossEvent {
                amount,
                total_assets: held - amount,
            },
        );

        Ok(())
    }

    // ============================================
    // DEPOSIT / REDEEM
    // ============================================

    /// Pull `assets` from `from` and mint shares to it
    ///
    /// The vault spends `from`'s allowance, so `from` must have approved the
    /// vault beforehand.
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `InvalidAmount`: assets must be positive and worth at least one share
    pub fn deposit(env: Env, from: Address, assets: i128) -> Result<i128, Error> {
        if assets <= 0 {
            return Err(Error::InvalidAmount);
        }

        from.require_auth();

        let shares = Self::convert_to_shares(env.clone(), assets)?;
        if shares == 0 {
            return Err(Error::InvalidAmount);
        }

        let vault = env.current_contract_address();
        Self::asset_client(&env)?.transfer_from(&vault, &from, &vault, &assets);

        let supply = storage::total_supply(&env)
            .checked_add(shares)
            .ok_or(Error::ArithmeticError)?;
        let balance = storage::balance(&env, &from)
            .checked_add(shares)
            .ok_or(Error::ArithmeticError)?;
        storage::set_total_supply(&env, supply);
        storage::set_balance(&env, &from, balance);
        storage::bump_instance(&env);

        env.events().publish(
            (Symbol::new(&env, "deposit"), from.clone()),
            DepositEvent {
                owner: from,
                assets,
                shares,
            },
        );

        Ok(shares)
    }

    /// Burn `shares` owned by `owner` and send the underlying to `to`
    ///
    /// # Errors
    /// - `NotInitialized`: Contract not initialized
    /// - `InvalidAmount`: shares must be positive
    /// - `InsufficientShares`: owner holds fewer shares
    pub fn redeem(env: Env, owner: Address, to: Address, shares: i128) -> Result<i128, Error> {
        if shares <= 0 {
            return Err(Error::InvalidAmount);
        }

        owner.require_auth();

        let balance = storage::balance(&env, &owner);
        if balance < shares {
            return Err(Error::InsufficientShares);
        }

        let assets = Self::convert_to_assets(env.clone(), shares)?;

        storage::set_balance(&env, &owner, balance - shares);
        storage::set_total_supply(&env, storage::total_supply(&env) - shares);
        storage::bump_instance(&env);

        if assets > 0 {
            Self::asset_client(&env)?.transfer(&env.current_contract_address(), &to, &assets);
        }

        env.events().publish(
            (Symbol::new(&env, "redeem"), owner.clone()),
            RedeemEvent {
                owner,
                to,
                shares,
                assets,
            },
        );

        Ok(assets)
    }

    // ============================================
    // VIEW FUNCTIONS
    // ============================================

    pub fn convert_to_shares(env: Env, assets: i128) -> Result<i128, Error> {
        let held = Self::total_assets(env.clone())?;
        to_shares(assets, storage::total_supply(&env), held).ok_or(Error::ArithmeticError)
    }

    pub fn convert_to_assets(env: Env, shares: i128) -> Result<i128, Error> {
        let held = Self::total_assets(env.clone())?;
        to_assets(shares, storage::total_supply(&env), held).ok_or(Error::ArithmeticError)
    }

    /// Underlying held by the vault, yield included
    pub fn total_assets(env: Env) -> Result<i128, Error> {
        storage::bump_instance(&env);
        Ok(Self::asset_client(&env)?.balance(&env.current_contract_address()))
    }

    pub fn total_supply(env: Env) -> i128 {
        storage::total_supply(&env)
    }

    pub fn balance_of(env: Env, owner: Address) -> i128 {
        storage::bump_instance(&env);
        storage::balance(&env, &owner)
    }

    pub fn asset(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Asset)
            .ok_or(Error::NotInitialized)
    }

    // ============================================
    // INTERNAL HELPERS
    // ============================================

    fn asset_client(env: &Env) -> Result<token::Client<'_>, Error> {
        let asset: Address = env
            .storage()
            .instance()
            .get(&DataKey::Asset)
            .ok_or(Error::NotInitialized)?;
        Ok(token::Client::new(env, &asset))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use soroban_sdk::{testutils::Address as _, token::StellarAssetClient, Address, Env};

    const SCALE: i128 = 10_000_000;

    struct Setup<'a> {
        env: Env,
        admin: Address,
        user: Address,
        asset: Address,
        vault: YieldVaultClient<'a>,
    }

    fn setup<'a>() -> Setup<'a> {
        let env = Env::default();
        env.mock_all_auths();

        let admin = Address::generate(&env);
        let user = Address::generate(&env);
        let asset = env
            .register_stellar_asset_contract_v2(admin.clone())
            .address();
        StellarAssetClient::new(&env, &asset).mint(&user, &(10_000 * SCALE));

        let vault_id = env.register(YieldVault, ());
        let vault = YieldVaultClient::new(&env, &vault_id);
        vault.initialize(&admin, &asset);

        let expiration = env.ledger().sequence() + 10_000;
        token::Client::new(&env, &asset).approve(&user, &vault_id, &i128::MAX, &expiration);

        Setup {
            env,
            admin,
            user,
            asset,
            vault,
        }
    }

    #[test]
    fn test_initialize_once() {
        let s = setup();
        let result = s.vault.try_initialize(&s.admin, &s.asset);
        assert_eq!(result, Err(Ok(Error::AlreadyInitialized)));
    }

    #[test]
    fn test_deposit_and_redeem_at_par() {
        let s = setup();
        let token = token::Client::new(&s.env, &s.asset);

        let shares = s.vault.deposit(&s.user, &(1_000 * SCALE));
        assert_eq!(shares, 1_000 * SCALE);
        assert_eq!(s.vault.balance_of(&s.user), 1_000 * SCALE);
        assert_eq!(s.vault.total_assets(), 1_000 * SCALE);
        assert_eq!(token.balance(&s.user), 9_000 * SCALE);

        let assets = s.vault.redeem(&s.user, &s.user, &(400 * SCALE));
        assert_eq!(assets, 400 * SCALE);
        assert_eq!(s.vault.balance_of(&s.user), 600 * SCALE);
        assert_eq!(s.vault.total_supply(), 600 * SCALE);
        assert_eq!(token.balance(&s.user), 9_400 * SCALE);
    }

    #[test]
    fn test_yield_raises_share_price() {
        let s = setup();
        s.vault.deposit(&s.user, &(1_000 * SCALE));

        // 50% yield lands in the vault
        StellarAssetClient::new(&s.env, &s.asset).mint(&s.vault.address, &(500 * SCALE));

        assert!(s.vault.convert_to_shares(&(SCALE)) < SCALE);
        let assets = s.vault.convert_to_assets(&(1_000 * SCALE));
        assert!(assets <= 1_500 * SCALE);
        assert!(1_500 * SCALE - assets <= 1);
    }

    #[test]
    fn test_report_loss_lowers_share_price() {
        let s = setup();
        s.vault.deposit(&s.user, &(1_000 * SCALE));

        s.vault.report_loss(&(200 * SCALE));

        assert_eq!(s.vault.total_assets(), 800 * SCALE);
        assert!(s.vault.convert_to_shares(&SCALE) > SCALE);

        let result = s.vault.try_report_loss(&(900 * SCALE));
        assert_eq!(result, Err(Ok(Error::InvalidAmount)));
    }

    #[test]
    fn test_redeem_more_than_owned() {
        let s = setup();
        s.vault.deposit(&s.user, &(100 * SCALE));

        let result = s.vault.try_redeem(&s.user, &s.user, &(101 * SCALE));
        assert_eq!(result, Err(Ok(Error::InsufficientShares)));
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let s = setup();
        assert_eq!(
            s.vault.try_deposit(&s.user, &0),
            Err(Ok(Error::InvalidAmount))
        );
        assert_eq!(
            s.vault.try_redeem(&s.user, &s.user, &0),
            Err(Ok(Error::InvalidAmount))
        );
    }
}
