use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, LedgerResult};
use crate::identity::Address;
use crate::ledger::BasisPoints;

pub const DEFAULT_INTEREST_RATE_BPS: BasisPoints = 500;

/// Controlling identity and the staking interest rate.
///
/// Mutators are unconditional; authorization happens in the facade.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GovernancePolicy {
    controller: Address,
    interest_rate_bps: BasisPoints,
}

impl GovernancePolicy {
    pub fn new(controller: Address, interest_rate_bps: BasisPoints) -> Self {
        Self {
            controller,
            interest_rate_bps,
        }
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn interest_rate_bps(&self) -> BasisPoints {
        self.interest_rate_bps
    }

    pub fn authorize(&self, caller: &Address) -> LedgerResult<()> {
        if *caller != self.controller {
            return Err(LedgerError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    /// Returns the previous controller.
    pub(crate) fn set_controller(&mut self, controller: Address) -> Address {
        std::mem::replace(&mut self.controller, controller)
    }

    /// Returns the previous rate. Any value is accepted, zero included.
    pub(crate) fn set_interest_rate_bps(&mut self, rate: BasisPoints) -> BasisPoints {
        std::mem::replace(&mut self.interest_rate_bps, rate)
    }

    pub(crate) fn leaf(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"gov");
        hasher.update(self.controller.as_bytes());
        hasher.update(self.interest_rate_bps.to_le_bytes());
        hasher.finalize().into()
    }
}
