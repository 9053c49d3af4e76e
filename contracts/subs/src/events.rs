use soroban_sdk::{contracttype, Address, BytesN};

/// Carries every field `unsubscribe` needs; subscribers must keep it.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewSubscriptionEvent {
    pub subscriber: Address,
    pub id: BytesN<32>,
    pub initial_period: u64,
    pub expiration_date: u64,
    pub amount_per_cycle: i128,
    pub receiver: Address,
    pub accumulator_at_start: i128,
    pub initial_shares: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnsubscribedEvent {
    pub subscriber: Address,
    pub id: BytesN<32>,
    pub refunded_shares: i128,
    pub refunded_assets: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimedEvent {
    pub receiver: Address,
    pub shares: i128,
    pub fee: i128,
    pub assets: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DepositThresholdEvent {
    pub threshold: i128,
}
