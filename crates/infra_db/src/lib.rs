//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL persistence for the billing core,
//! using SQLx over a connection pool.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: one repository per
//! aggregate, translating between domain types and rows. Business rules
//! live in the domain crates; repositories only persist and fetch.
//!
//! # Write discipline
//!
//! Financial and audit tables are append-mostly. Ledger entries are
//! never updated; readings and cycles only ever move forward through
//! their lifecycle columns. Concurrent reading submissions for one
//! (assignment, cycle) slot serialize through a compare-and-bump on the
//! `reading_slots` version row.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, CycleRepository, DatabaseConfig};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! let cycles = CycleRepository::new(pool);
//! ```

mod codec;

pub mod error;
pub mod pool;
pub mod repositories;

/// Embedded schema migrations, applied at startup
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, DatabaseConfig, DatabasePool};
pub use repositories::{
    CycleRepository, LedgerRepository, MeteringRepository, NotificationRepository,
    TombstoneRepository, TombstoneRow,
};
