use thiserror::Error;

use crate::identity::Address;
use crate::ledger::{Amount, Timestamp};

/// Canonical error type returned by every ledger operation.
///
/// A failed operation never leaves partial state behind: the committed ledger
/// is exactly what it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A privileged operation was invoked by someone other than the controller.
    #[error("only the controlling party can call this function (caller {caller})")]
    Unauthorized { caller: Address },

    /// One side of a value movement is on the compliance blacklist.
    #[error("account {account} is blacklisted")]
    ComplianceViolation { account: Address },

    #[error("insufficient balance in account {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        account: Address,
        requested: Amount,
        available: Amount,
    },

    #[error("insufficient stake for {account}: requested {requested}, staked {staked}")]
    InsufficientStake {
        account: Address,
        requested: Amount,
        staked: Amount,
    },

    /// A balance, the supply or the reward product left the `u128` domain.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The supplied clock is behind the accrual start of a stake position.
    #[error("clock moved backwards: accrual started at {accrual_start}, now {now}")]
    ClockRegression {
        accrual_start: Timestamp,
        now: Timestamp,
    },

    /// Ordinary transfers may not touch the staking pool account.
    #[error("account {account} is reserved for the staking pool")]
    ReservedAccount { account: Address },
}

pub type LedgerResult<T> = Result<T, LedgerError>;
