//! Treasury-bond staking: per-holder positions accruing simple interest.
//!
//! Staked value never leaves the ledger. It sits in the pool account
//! ([`Address::staking_pool`]) and the positions here record who owns how
//! much of it. Interest is realized by minting, so claims grow the supply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, LedgerResult};
use crate::identity::{Address, CallContext};
use crate::ledger::{Amount, BasisPoints, LedgerMutation, MintReason, Timestamp};

pub const BPS_DENOMINATOR: Amount = 10_000;
/// Length of the 365-day reference year used by the accrual model.
pub const SECONDS_PER_YEAR: Amount = 31_536_000;

/// What happens to unrealized interest when a holder stakes again.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestakePolicy {
    /// Accrual restarts at the new stake; pending interest is dropped.
    #[default]
    Forfeit,
    /// Pending interest is minted to the holder before the position grows.
    RealizeFirst,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakePosition {
    pub amount: Amount,
    pub accrual_start: Timestamp,
}

impl StakePosition {
    pub fn accrued_reward(&self, rate: BasisPoints, now: Timestamp) -> LedgerResult<Amount> {
        accrued_reward(self.amount, rate, self.accrual_start, now)
    }
}

/// `floor(staked * rate * elapsed / (10_000 * 31_536_000))`, no rounding up,
/// no saturation.
pub fn accrued_reward(
    staked: Amount,
    rate: BasisPoints,
    accrual_start: Timestamp,
    now: Timestamp,
) -> LedgerResult<Amount> {
    let elapsed = now
        .checked_sub(accrual_start)
        .ok_or(LedgerError::ClockRegression { accrual_start, now })?;
    if staked == 0 || rate == 0 || elapsed == 0 {
        return Ok(0);
    }
    let numerator = staked
        .checked_mul(Amount::from(rate))
        .and_then(|v| v.checked_mul(Amount::from(elapsed)))
        .ok_or(LedgerError::ArithmeticOverflow)?;
    Ok(numerator / (BPS_DENOMINATOR * SECONDS_PER_YEAR))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StakingPool {
    positions: BTreeMap<Address, StakePosition>,
}

impl StakingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staked_amount_of(&self, holder: &Address) -> Amount {
        self.positions.get(holder).map(|p| p.amount).unwrap_or(0)
    }

    pub fn position(&self, holder: &Address) -> Option<&StakePosition> {
        self.positions.get(holder)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&Address, &StakePosition)> {
        self.positions.iter()
    }

    pub fn total_staked(&self) -> LedgerResult<Amount> {
        self.positions.values().try_fold(0 as Amount, |acc, p| {
            acc.checked_add(p.amount)
                .ok_or(LedgerError::ArithmeticOverflow)
        })
    }

    pub fn plan_stake(
        &self,
        ctx: &CallContext,
        amount: Amount,
        rate: BasisPoints,
        policy: RestakePolicy,
    ) -> LedgerResult<Vec<LedgerMutation>> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let mut mutations = Vec::with_capacity(3);
        if let Some(position) = self.positions.get(&ctx.caller) {
            // Positions only move forward in time, whatever the policy.
            if ctx.now < position.accrual_start {
                return Err(LedgerError::ClockRegression {
                    accrual_start: position.accrual_start,
                    now: ctx.now,
                });
            }
            if policy == RestakePolicy::RealizeFirst {
                let pending = position.accrued_reward(rate, ctx.now)?;
                if pending > 0 {
                    mutations.push(LedgerMutation::Mint {
                        to: ctx.caller,
                        amount: pending,
                        reason: MintReason::StakingReward,
                    });
                }
            }
        }
        mutations.push(LedgerMutation::Transfer {
            from: ctx.caller,
            to: Address::staking_pool(),
            amount,
        });
        mutations.push(LedgerMutation::Stake {
            holder: ctx.caller,
            amount,
            accrual_start: ctx.now,
        });
        Ok(mutations)
    }

    pub fn plan_unstake(
        &self,
        ctx: &CallContext,
        amount: Amount,
    ) -> LedgerResult<Vec<LedgerMutation>> {
        let staked = self.staked_amount_of(&ctx.caller);
        if amount == 0 || amount > staked {
            return Err(LedgerError::InsufficientStake {
                account: ctx.caller,
                requested: amount,
                staked,
            });
        }
        Ok(vec![
            LedgerMutation::Unstake {
                holder: ctx.caller,
                amount,
            },
            LedgerMutation::Transfer {
                from: Address::staking_pool(),
                to: ctx.caller,
                amount,
            },
        ])
    }

    /// An empty plan means there is nothing to realize.
    pub fn plan_claim(
        &self,
        ctx: &CallContext,
        rate: BasisPoints,
    ) -> LedgerResult<Vec<LedgerMutation>> {
        let Some(position) = self.positions.get(&ctx.caller) else {
            return Ok(Vec::new());
        };
        let reward = position.accrued_reward(rate, ctx.now)?;
        if reward == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![
            LedgerMutation::Mint {
                to: ctx.caller,
                amount: reward,
                reason: MintReason::StakingReward,
            },
            LedgerMutation::ResetAccrual {
                holder: ctx.caller,
                accrual_start: ctx.now,
            },
        ])
    }

    pub(crate) fn add_stake(
        &mut self,
        holder: &Address,
        amount: Amount,
        accrual_start: Timestamp,
    ) -> LedgerResult<()> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let current = self.staked_amount_of(holder);
        let updated = current
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.positions.insert(
            *holder,
            StakePosition {
                amount: updated,
                accrual_start,
            },
        );
        Ok(())
    }

    /// Leaves `accrual_start` alone; drops the position once it is empty.
    pub(crate) fn remove_stake(&mut self, holder: &Address, amount: Amount) -> LedgerResult<()> {
        let staked = self.staked_amount_of(holder);
        if amount == 0 || amount > staked {
            return Err(LedgerError::InsufficientStake {
                account: *holder,
                requested: amount,
                staked,
            });
        }
        if amount == staked {
            self.positions.remove(holder);
        } else if let Some(position) = self.positions.get_mut(holder) {
            position.amount = staked - amount;
        }
        Ok(())
    }

    pub(crate) fn reset_accrual(&mut self, holder: &Address, accrual_start: Timestamp) {
        if let Some(position) = self.positions.get_mut(holder) {
            position.accrual_start = accrual_start;
        }
    }

    pub(crate) fn leaves(&self) -> Vec<[u8; 32]> {
        self.positions
            .iter()
            .map(|(holder, position)| {
                let mut hasher = Sha256::new();
                hasher.update(b"stake");
                hasher.update(holder.as_bytes());
                hasher.update(position.amount.to_le_bytes());
                hasher.update(position.accrual_start.to_le_bytes());
                hasher.finalize().into()
            })
            .collect()
    }
}
