//! Request/response data transfer objects

pub mod cycles;
pub mod ledger;
pub mod metering;
pub mod notify;
pub mod sync;
