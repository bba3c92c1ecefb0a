use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::domain::math::MathError;
use crate::domain::RebalanceDirection;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("zero address for {field}")]
    ZeroAddress { field: &'static str },

    #[error("slippage {bps} bps exceeds 100%")]
    SlippageTooHigh { bps: u32 },

    #[error("slippage {bps} bps leaves no room for flash fee {fee}")]
    SlippageBelowFlashFee { bps: u32, fee: U256 },

    #[error("leverage bounds out of order: lower {lower} <= target {target} <= upper {upper} required")]
    LeverageBoundsMisordered { lower: u32, target: u32, upper: u32 },

    #[error("failed to read config file: {0}")]
    ReadFile(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Token ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("unknown token {token}")]
    UnknownToken { token: Address },

    #[error("token {token} already registered")]
    AlreadyRegistered { token: Address },

    #[error("insufficient balance of {token} for {account}: {balance} < {needed}")]
    InsufficientBalance {
        token: Address,
        account: Address,
        balance: U256,
        needed: U256,
    },

    #[error("insufficient allowance of {token} from {owner} to {spender}: {allowance} < {needed}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        allowance: U256,
        needed: U256,
    },

    #[error("supply overflow minting {amount} of {token}")]
    SupplyOverflow { token: Address, amount: U256 },
}

/// Price oracle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("no price feed for {token}")]
    MissingFeed { token: Address },

    #[error("zero price for {token}")]
    ZeroPrice { token: Address },

    #[error("stale price for {token}: updated at {updated_at}, now {now}, heartbeat {heartbeat}")]
    StalePrice {
        token: Address,
        updated_at: u64,
        now: u64,
        heartbeat: u64,
    },
}

/// Lending pool collaborator errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("reserve {token} is not listed")]
    UnlistedReserve { token: Address },

    #[error("insufficient liquidity of {token}: available {available}, requested {requested}")]
    InsufficientLiquidity {
        token: Address,
        available: U256,
        requested: U256,
    },

    #[error("borrow would exceed loan-to-value: debt {debt_base} > limit {limit_base}")]
    LtvExceeded { debt_base: U256, limit_base: U256 },

    #[error("zero amount for {operation}")]
    ZeroAmount { operation: &'static str },

    #[error("{caller} cannot act on behalf of {on_behalf_of}")]
    NotDelegated {
        caller: Address,
        on_behalf_of: Address,
    },
}

/// Flash lender errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashLoanError {
    #[error("token {token} not supported by flash lender")]
    UnsupportedToken { token: Address },

    #[error("flash loan of {requested} exceeds available {available}")]
    ExceedsMaxFlashLoan { requested: U256, available: U256 },

    #[error("borrower callback returned an unexpected value")]
    CallbackFailed,

    #[error("flash loan not repaid: balance {actual} < expected {expected}")]
    NotRepaid { actual: U256, expected: U256 },
}

/// Swap settlement and venue errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("slippage exceeded: spent {spent} > maximum {maximum}")]
    SlippageExceeded { spent: U256, maximum: U256 },

    #[error("insufficient output: received {received} < expected {expected}")]
    InsufficientOutput { received: U256, expected: U256 },

    #[error("unexpected output amount: received {received} > allowed {allowed}")]
    UnexpectedAmount { received: U256, allowed: U256 },

    #[error("input and output token are both {token}")]
    IdenticalTokens { token: Address },

    #[error("zero output amount requested")]
    ZeroAmountOut,

    #[error("venue rejected payload: {reason}")]
    VenueRejected { reason: String },
}

/// Leverage vault errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("zero {what}")]
    ZeroAmount { what: &'static str },

    #[error("deposit of {assets} below minimum {minimum}")]
    DepositTooSmall { assets: U256, minimum: U256 },

    #[error("deposit would mint zero shares")]
    ZeroShares,

    #[error("vault is too imbalanced: leverage {current} outside [{lower}, {upper}]")]
    TooImbalanced { current: u64, lower: u32, upper: u32 },

    #[error("leverage {current} outside bounds [{lower}, {upper}]")]
    LeverageOutOfBounds { current: u64, lower: u32, upper: u32 },

    #[error("leverage {current} already within bounds [{lower}, {upper}]")]
    LeverageWithinBounds { current: u64, lower: u32, upper: u32 },

    #[error("leverage {current} needs a {required} rebalance")]
    WrongRebalanceDirection {
        current: u64,
        required: RebalanceDirection,
    },

    #[error("rebalance moved leverage the wrong way: {before} -> {after}, target {target}")]
    LeverageNotImproved { before: u64, after: u64, target: u32 },

    #[error("rebalance overshot target: leverage {after}, target {target}, tolerance {tolerance}")]
    LeverageOvershoot { after: u64, target: u32, tolerance: u32 },

    #[error("insufficient shares of {owner}: {balance} < {requested}")]
    InsufficientShares {
        owner: Address,
        balance: U256,
        requested: U256,
    },

    #[error("caller did not supply repayment: available {available} < required {required}")]
    InsufficientRepayFunds { available: U256, required: U256 },

    #[error("vault net value is zero while {supply} shares are outstanding")]
    Insolvent { supply: U256 },

    #[error("received {received} below minimum {minimum}")]
    BelowMinimumOutput { received: U256, minimum: U256 },
}

/// Flash-loan orchestrator errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("flash loan callback from unexpected lender {caller}")]
    UntrustedLender { caller: Address },

    #[error("flash loan initiated by {initiator}, not this contract")]
    UntrustedInitiator { initiator: Address },

    #[error("flash loan callback received outside of an active flow (phase {phase})")]
    UnexpectedCallback { phase: &'static str },

    #[error("flash loan token {actual} does not match vault debt token {expected}")]
    WrongFlashToken { actual: Address, expected: Address },

    #[error("callback params reference vault {actual}, active vault is {expected}")]
    VaultMismatch { actual: Address, expected: Address },

    #[error("unsupported params version {version}")]
    UnsupportedParamsVersion { version: u8 },

    #[error("malformed callback params: {reason}")]
    MalformedParams { reason: String },

    #[error("flow finished without a settlement receipt")]
    MissingReceipt,

    #[error("shares minted {minted} below minimum {minimum}")]
    SharesBelowMinimum { minted: U256, minimum: U256 },

    #[error("shares did not increase after flash loan: before {before}, after {after}")]
    SharesNotIncreased { before: U256, after: U256 },

    #[error("burned {burned} shares, requested {requested}")]
    InvalidSharesBurned { burned: U256, requested: U256 },

    #[error("received {received} collateral, minimum {minimum}")]
    BelowMinimumReceive { received: U256, minimum: U256 },

    #[error("reward {reward} below minimum {minimum}")]
    RewardBelowMinimum { reward: U256, minimum: U256 },

    #[error("debt token balance increased unexpectedly: before {before}, after {after}")]
    UnexpectedDebtIncrease { before: U256, after: U256 },

    #[error("cannot repay flash loan: holding {available}, owed {owed}")]
    RepayShortfall { available: U256, owed: U256 },

    #[error("{caller} may not redeem on behalf of {owner}")]
    NotOwner { caller: Address, owner: Address },

    #[error("leverage {current} already within bounds [{lower}, {upper}]")]
    LeverageWithinBounds { current: u64, lower: u32, upper: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    FlashLoan(#[from] FlashLoanError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("reentrant call into {entry} while {active} is executing")]
    Reentrancy {
        entry: &'static str,
        active: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
