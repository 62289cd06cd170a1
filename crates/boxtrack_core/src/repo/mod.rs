//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for boxes, items,
//!   custody membership and fixture maintenance.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Every mutating call runs in one `BEGIN IMMEDIATE` transaction, so its
//!   checks and writes are serialized against other writers.
//! - Repository APIs return semantic errors (`BoxNotFound`, `NotAttached`, ...)
//!   in addition to DB transport errors.

pub mod audit_repo;
pub mod box_repo;
pub mod custody_repo;
pub mod fixture_repo;
pub mod item_repo;
pub mod snapshot;
mod sql_support;
pub mod store_error;

pub use sql_support::ensure_store_ready;
