use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::Address;

/// Identities barred from sending or receiving value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ComplianceRegistry {
    blacklisted: BTreeSet<Address>,
}

impl ComplianceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blacklisted(&self, account: &Address) -> bool {
        self.blacklisted.contains(account)
    }

    /// Returns the previous flag.
    pub(crate) fn set_blacklisted(&mut self, account: &Address, flag: bool) -> bool {
        if flag {
            !self.blacklisted.insert(*account)
        } else {
            self.blacklisted.remove(account)
        }
    }

    pub fn blacklisted(&self) -> impl Iterator<Item = &Address> {
        self.blacklisted.iter()
    }

    pub(crate) fn leaves(&self) -> Vec<[u8; 32]> {
        self.blacklisted
            .iter()
            .map(|account| {
                let mut hasher = Sha256::new();
                hasher.update(b"blacklist");
                hasher.update(account.as_bytes());
                hasher.finalize().into()
            })
            .collect()
    }
}
