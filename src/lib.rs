//! Funds Transfer - saga-based account-to-account transfers
//!
//! Moves money between two accounts of a keyed ledger that offers no
//! multi-record transactions: a conditional debit, then a credit, with a
//! compensating refund when the credit fails.
//!
//! # Modules
//!
//! - [`core_types`] - Account and transfer identifiers
//! - [`money`] - Positive decimal amounts and their parsing rules
//! - [`account`] - Account snapshot
//! - [`ledger`] - Account ledger seam (memory and PostgreSQL backends)
//! - [`transfer`] - Orchestrator, journal, compensation, recovery worker
//! - [`auth`] - Caller authentication (JWT bearer)
//! - [`gateway`] - HTTP API
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] / [`logging`] - YAML config and tracing setup

// Core types - must be first!
pub mod core_types;
pub mod money;

pub mod account;
pub mod ledger;
pub mod transfer;

pub mod auth;
pub mod gateway;

pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use account::Account;
pub use core_types::{AccountId, TransferId};
pub use ledger::{AccountLedger, LedgerError, MemoryLedger, PgLedger};
pub use money::{Amount, MoneyError};
pub use transfer::{
    RecoveryWorker, TransferError, TransferOrchestrator, TransferReceipt, TransferRequest,
    TransferState,
};
