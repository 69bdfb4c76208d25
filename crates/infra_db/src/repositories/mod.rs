//! Repositories over the authoritative store
//!
//! One repository per aggregate. Repositories translate between domain
//! types and rows; they hold no business rules.

pub mod cycles;
pub mod ledger;
pub mod metering;
pub mod notify;
pub mod tombstones;

pub use cycles::CycleRepository;
pub use ledger::LedgerRepository;
pub use metering::MeteringRepository;
pub use notify::NotificationRepository;
pub use tombstones::{TombstoneRepository, TombstoneRow};
