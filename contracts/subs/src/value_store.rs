use crate::error::Error;
use crate::storage::DIVISOR;
use soroban_sdk::{contractclient, Address, Env};

/// The slice of the share vault the ledger relies on.
#[allow(dead_code)]
#[contractclient(name = "ValueStoreClient")]
pub trait ValueStore {
    fn deposit(env: Env, from: Address, assets: i128) -> i128;
    fn redeem(env: Env, owner: Address, to: Address, shares: i128) -> i128;
    fn convert_to_shares(env: Env, assets: i128) -> i128;
    fn convert_to_assets(env: Env, shares: i128) -> i128;
    fn balance_of(env: Env, owner: Address) -> i128;
}

/// Vault calls with every failure folded into `AdapterFailure`.
pub struct Vault<'a> {
    client: ValueStoreClient<'a>,
}

impl<'a> Vault<'a> {
    pub fn new(env: &Env, address: &Address) -> Self {
        Vault {
            client: ValueStoreClient::new(env, address),
        }
    }

    /// Shares worth `DIVISOR` assets right now
    pub fn share_price(&self) -> Result<i128, Error> {
        self.convert_to_shares(DIVISOR)
    }

    pub fn deposit(&self, from: &Address, assets: i128) -> Result<i128, Error> {
        match self.client.try_deposit(from, &assets) {
            Ok(Ok(shares)) => Ok(shares),
            _ => Err(Error::AdapterFailure),
        }
    }

    pub fn redeem(&self, owner: &Address, to: &Address, shares: i128) -> Result<i128, Error> {
        match self.client.try_redeem(owner, to, &shares) {
            Ok(Ok(assets)) => Ok(assets),
            _ => Err(Error::AdapterFailure),
        }
    }

    pub fn convert_to_shares(&self, assets: i128) -> Result<i128, Error> {
        match self.client.try_convert_to_shares(&assets) {
            Ok(Ok(shares)) => Ok(shares),
            _ => Err(Error::AdapterFailure),
        }
    }

    pub fn convert_to_assets(&self, shares: i128) -> Result<i128, Error> {
        match self.client.try_convert_to_assets(&shares) {
            Ok(Ok(assets)) => Ok(assets),
            _ => Err(Error::AdapterFailure),
        }
    }

    pub fn balance_of(&self, owner: &Address) -> Result<i128, Error> {
        match self.client.try_balance_of(owner) {
            Ok(Ok(shares)) => Ok(shares),
            _ => Err(Error::AdapterFailure),
        }
    }
}
