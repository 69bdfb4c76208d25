//! Ledger domain errors

use chrono::NaiveDate;
use core_kernel::{ClientId, LedgerEntryId, MoneyError, PenaltyId};
use thiserror::Error;

/// Errors raised by charge generation, payments, and penalties
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Amount must be strictly positive")]
    NonPositiveAmount,

    #[error("No tariff in force on {0}")]
    NoTariffInForce(NaiveDate),

    #[error("Tariff effective {0} conflicts with an existing rate on that date")]
    DuplicateTariffDate(NaiveDate),

    #[error("Ledger entry {0} not found")]
    EntryNotFound(LedgerEntryId),

    #[error("Client {0} already has an active penalty")]
    ActivePenaltyExists(ClientId),

    #[error("Penalty {0} not found")]
    PenaltyNotFound(PenaltyId),

    #[error("Penalty {0} is not active")]
    PenaltyNotActive(PenaltyId),

    #[error("A justification note is required for this action")]
    InsufficientJustification,

    #[error(transparent)]
    Money(#[from] MoneyError),
}
