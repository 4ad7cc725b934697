use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, LedgerResult};
use crate::identity::Address;

pub type Amount = u128;
pub type Timestamp = u64;
pub type BasisPoints = u64;

/// Per-identity balances plus the total issued supply.
///
/// Invariant: `total_supply == sum(balances)` after every completed
/// operation. Zero balances are pruned, so an absent entry reads as 0.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountLedger {
    balances: BTreeMap<Address, Amount>,
    total_supply: Amount,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    pub(crate) fn credit(&mut self, account: &Address, amount: Amount) -> LedgerResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let updated = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.balances.insert(*account, updated);
        Ok(())
    }

    pub(crate) fn debit(&mut self, account: &Address, amount: Amount) -> LedgerResult<()> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                requested: amount,
                available,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, remaining);
        }
        Ok(())
    }

    /// Credits `account` and grows the supply by the same amount.
    pub(crate) fn mint(&mut self, account: &Address, amount: Amount) -> LedgerResult<()> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.credit(account, amount)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Recomputes the balance sum and compares it with the supply counter.
    pub fn is_conserved(&self) -> bool {
        let mut sum: Amount = 0;
        for amount in self.balances.values() {
            match sum.checked_add(*amount) {
                Some(next) => sum = next,
                None => return false,
            }
        }
        sum == self.total_supply
    }

    pub(crate) fn leaves(&self) -> Vec<[u8; 32]> {
        let mut leaves = Vec::with_capacity(self.balances.len() + 1);
        for (account, balance) in &self.balances {
            let mut hasher = Sha256::new();
            hasher.update(b"acct");
            hasher.update(account.as_bytes());
            hasher.update(balance.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        let mut hasher = Sha256::new();
        hasher.update(b"supply");
        hasher.update(self.total_supply.to_le_bytes());
        leaves.push(hasher.finalize().into());
        leaves
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MintReason {
    SupplyIncrease,
    StakingReward,
}

/// One staged state change. Operations are planned into a list of these and
/// the list is applied all-or-nothing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerMutation {
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    Mint {
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
        reason: MintReason,
    },
    SetController {
        controller: Address,
    },
    SetInterestRate {
        basis_points: BasisPoints,
    },
    SetBlacklisted {
        account: Address,
        blacklisted: bool,
    },
    Stake {
        holder: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
        accrual_start: Timestamp,
    },
    Unstake {
        holder: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    ResetAccrual {
        holder: Address,
        accrual_start: Timestamp,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    Mint {
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
        reason: MintReason,
    },
    ControllerChanged {
        previous: Address,
        current: Address,
    },
    InterestRateChanged {
        previous: BasisPoints,
        current: BasisPoints,
    },
    BlacklistUpdated {
        account: Address,
        blacklisted: bool,
    },
    Staked {
        holder: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
        accrual_start: Timestamp,
    },
    Unstaked {
        holder: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    AccrualReset {
        holder: Address,
        accrual_start: Timestamp,
    },
}

/// Amounts inside tagged enums travel as decimal strings, so values above
/// `u64::MAX` survive JSON. Plain numbers are still accepted on input.
pub(crate) mod serde_amount {
    use std::fmt;

    use serde::{
        de::{self, Visitor},
        Deserializer, Serializer,
    };

    use super::Amount;

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an unsigned integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(Amount::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            v.parse().map_err(E::custom)
        }
    }
}

/// Binary sha256 tree over `leaves`. An unpaired node is carried up to the
/// next level unchanged rather than hashed with itself.
pub(crate) fn merkle_root(leaves: Vec<[u8; 32]>) -> [u8; 32] {
    let mut level = leaves;
    if level.is_empty() {
        return Sha256::digest(b"cbdc-ledger/empty").into();
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                _ => pair[0],
            })
            .collect();
    }
    level[0]
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"cbdc-ledger/node");
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}
