//! Effective-dated tariff book
//!
//! Charges use the rate in force on the approval date. Tariff changes
//! never retroactively alter closed cycles because each charge captures
//! its amount at posting time.

use chrono::NaiveDate;
use core_kernel::Tariff;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::LedgerError;

/// Rates keyed by the date they take effect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TariffBook {
    rates: BTreeMap<NaiveDate, Tariff>,
}

impl TariffBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A book with a single rate in force from `effective`
    pub fn with_rate(effective: NaiveDate, tariff: Tariff) -> Self {
        let mut book = Self::new();
        book.rates.insert(effective, tariff);
        book
    }

    /// Adds a rate taking effect on `effective`
    pub fn add_rate(&mut self, effective: NaiveDate, tariff: Tariff) -> Result<(), LedgerError> {
        if self.rates.contains_key(&effective) {
            return Err(LedgerError::DuplicateTariffDate(effective));
        }
        self.rates.insert(effective, tariff);
        Ok(())
    }

    /// The rate in force on a date: the latest rate whose effective date
    /// is on or before it
    pub fn rate_on(&self, date: NaiveDate) -> Result<Tariff, LedgerError> {
        self.rates
            .range(..=date)
            .next_back()
            .map(|(_, tariff)| *tariff)
            .ok_or(LedgerError::NoTariffInForce(date))
    }
}
