//! Funds Transfer Saga
//!
//! Moves funds between two ledger accounts without a multi-record
//! transaction: a conditional debit and a credit, paired by a journaled
//! intent record and undone by a compensating refund when the credit fails.
//!
//! # State Machine
//!
//! ```text
//! VALIDATING → AUTHORIZING → DEBITING → CREDITING → COMPLETED
//!                               ↓           ↓
//!                           REJECTED   COMPENSATING → COMPENSATED
//! ```
//!
//! Only DEBITING onward is journaled.
//!
//! # Safety Invariants
//!
//! 1. **Persist-Before-Call**: the journal is updated before the ledger call it guards
//! 2. **Idempotent Legs**: every ledger mutation carries `(transfer_id, leg)`
//! 3. **Never Left Open**: a debited transfer ends COMPLETED or COMPENSATED,
//!    synchronously or via the [`RecoveryWorker`]

pub mod compensation;
pub mod coordinator;
pub mod error;
pub mod journal;
pub mod state;
pub mod types;
pub mod worker;

mod integration_tests;

pub use compensation::{CompensationError, CompensationHandler};
pub use coordinator::{OrchestratorConfig, TransferOrchestrator};
pub use error::TransferError;
pub use journal::{JournalError, MemoryJournal, PgJournal, TransferJournal};
pub use state::TransferState;
pub use types::{TransferReceipt, TransferRecord, TransferRequest};
pub use worker::{RecoveryWorker, WorkerConfig};
