use soroban_sdk::contracterror;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    // ============================================
    // INITIALIZATION ERRORS (1-9)
    // ============================================
    /// Contract already initialized
    AlreadyInitialized = 1,
    /// Contract not initialized
    NotInitialized = 2,
    /// Period duration must be positive
    InvalidPeriodDuration = 3,
    /// Period start lies in the future
    InvalidTimestamp = 4,

    // ============================================
    // AUTHORIZATION ERRORS (10-19)
    // ============================================
    /// Caller is not the admin
    Unauthorized = 10,
    /// Deposits are disabled
    Paused = 11,

    // ============================================
    // SUBSCRIPTION ERRORS (20-29)
    // ============================================
    /// No active subscription matches the supplied fields
    InvalidSubscription = 20,

    // ============================================
    // AMOUNT/BALANCE ERRORS (30-39)
    // ============================================
    /// Amount must be positive (or non-negative where zero is meaningful)
    InvalidAmount = 30,
    /// Claim exceeds the receiver's accrued balance
    InsufficientBalance = 31,
    /// Overflow, or a receiver rate that would turn negative
    ArithmeticError = 32,

    // ============================================
    // COLLABORATOR ERRORS (40-49)
    // ============================================
    /// Vault or asset token call failed
    AdapterFailure = 40,
}
