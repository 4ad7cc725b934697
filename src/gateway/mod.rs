//! The single path by which value moves between identities.

use crate::compliance::ComplianceRegistry;
use crate::error::{LedgerError, LedgerResult};
use crate::identity::Address;
use crate::ledger::{AccountLedger, Amount};

pub struct TransferGateway<'a> {
    ledger: &'a mut AccountLedger,
    compliance: &'a ComplianceRegistry,
}

impl<'a> TransferGateway<'a> {
    pub fn new(ledger: &'a mut AccountLedger, compliance: &'a ComplianceRegistry) -> Self {
        Self { ledger, compliance }
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// Checks run before any balance is touched; the credit cannot overflow
    /// because the debited value is already part of the supply.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> LedgerResult<()> {
        for party in [from, to] {
            if self.compliance.is_blacklisted(party) {
                return Err(LedgerError::ComplianceViolation { account: *party });
            }
        }
        let available = self.ledger.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                requested: amount,
                available,
            });
        }
        self.ledger.debit(from, amount)?;
        self.ledger.credit(to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn funded() -> AccountLedger {
        let mut ledger = AccountLedger::new();
        ledger.mint(&addr(1), 1_000).unwrap();
        ledger
    }

    #[test]
    fn moves_value_and_conserves_supply() {
        let mut ledger = funded();
        let registry = ComplianceRegistry::new();
        TransferGateway::new(&mut ledger, &registry)
            .transfer(&addr(1), &addr(2), 400)
            .unwrap();
        assert_eq!(ledger.balance_of(&addr(1)), 600);
        assert_eq!(ledger.balance_of(&addr(2)), 400);
        assert_eq!(ledger.total_supply(), 1_000);
        assert!(ledger.is_conserved());
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let mut ledger = funded();
        let registry = ComplianceRegistry::new();
        TransferGateway::new(&mut ledger, &registry)
            .transfer(&addr(1), &addr(1), 1_000)
            .unwrap();
        assert_eq!(ledger.balance_of(&addr(1)), 1_000);
    }

    #[test]
    fn blacklisted_sender_or_receiver_is_rejected() {
        let mut registry = ComplianceRegistry::new();
        registry.set_blacklisted(&addr(2), true);

        let mut ledger = funded();
        let err = TransferGateway::new(&mut ledger, &registry)
            .transfer(&addr(1), &addr(2), 1)
            .unwrap_err();
        assert_eq!(err, LedgerError::ComplianceViolation { account: addr(2) });

        registry.set_blacklisted(&addr(1), true);
        let err = TransferGateway::new(&mut ledger, &registry)
            .transfer(&addr(1), &addr(3), 1)
            .unwrap_err();
        assert_eq!(err, LedgerError::ComplianceViolation { account: addr(1) });
        assert_eq!(ledger, funded());
    }

    #[test]
    fn overdraft_is_rejected() {
        let mut ledger = funded();
        let registry = ComplianceRegistry::new();
        let err = TransferGateway::new(&mut ledger, &registry)
            .transfer(&addr(1), &addr(2), 1_001)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger, funded());
    }
}
