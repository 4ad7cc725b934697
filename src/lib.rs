//! Governed digital-currency ledger.
//!
//! A single balance sheet controlled by one privileged identity, with a
//! compliance blacklist and treasury-bond staking that pays simple interest:
//!
//! * [`ledger`] — balances, supply and the staged [`ledger::LedgerMutation`]s.
//! * [`compliance`] — the transfer blacklist.
//! * [`governance`] — controlling party and interest rate.
//! * [`gateway`] — the only path value takes between accounts.
//! * [`staking`] — stake positions and the accrual formula.
//! * [`facade`] — the authorized operation surface, atomic per call.
//!
//! Around the core sit the pieces a host needs: [`request`] (ed25519-signed
//! calls), [`store`] (JSON persistence), [`config`] and [`telemetry`].

pub mod compliance;
pub mod config;
pub mod facade;
pub mod gateway;
pub mod governance;
pub mod identity;
pub mod ledger;
pub mod request;
pub mod staking;
pub mod store;
pub mod telemetry;

mod error;

pub use error::{LedgerError, LedgerResult};
pub use facade::{Genesis, LedgerFacade, Operation, Receipt};
pub use identity::{Address, CallContext};
