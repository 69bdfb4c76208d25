pub mod cycles;
pub mod health;
pub mod ledger;
pub mod metering;
pub mod notify;
pub mod sync;
