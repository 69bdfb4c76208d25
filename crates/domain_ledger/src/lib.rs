//! Ledger Domain
//!
//! The financial core: an append-only ledger of CHARGE, PENALTY, PAYMENT,
//! and ADJUSTMENT entries per client. Entries are never updated or
//! deleted; corrections are new adjustments, and the balance is always a
//! fold over the entry set.
//!
//! - charge generation at cycle approval, at the tariff in force that day,
//!   idempotent per reading,
//! - FIFO payment application with an operator-visible credit remainder,
//! - manual penalties with mandatory justification, one active per client,
//!   auto-cleared when the balance settles.

pub mod charges;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod payment;
pub mod penalty;
pub mod tariff;

pub use charges::{generate_charges, BillableReading};
pub use entry::{balance, AdjustmentDirection, EntryKind, LedgerEntry};
pub use error::LedgerError;
pub use ledger::{LedgerBook, LedgerConfig};
pub use payment::{
    apply_fifo, outstanding_debits, Allocation, FifoApplication, Outstanding, PaymentRecord,
};
pub use penalty::{Penalty, PenaltyStatus};
pub use tariff::TariffBook;
