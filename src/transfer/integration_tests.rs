//! Integration Tests for the Transfer Saga
//!
//! Drive the orchestrator and the recovery worker end to end over the
//! in-memory ledger and journal, injecting faults through `FaultyLedger`
//! and `FaultyJournal`.

#[cfg(test)]
mod integration_tests {
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::core_types::{AccountId, TransferId};
    use crate::ledger::mock::FaultyLedger;
    use crate::ledger::{AccountLedger, LedgerError, MemoryLedger, OpKey};
    use crate::money::Amount;
    use crate::transfer::coordinator::{OrchestratorConfig, TransferOrchestrator};
    use crate::transfer::error::TransferError;
    use crate::transfer::journal::mock::FaultyJournal;
    use crate::transfer::journal::{MemoryJournal, TransferJournal};
    use crate::transfer::state::TransferState;
    use crate::transfer::types::{TransferRecord, TransferRequest};
    use crate::transfer::worker::{RecoveryWorker, WorkerConfig};

    struct TestHarness {
        orchestrator: Arc<TransferOrchestrator>,
        ledger: Arc<FaultyLedger>,
        journal: Arc<MemoryJournal>,
        /// The orchestrator's view of `journal`
        faults: Arc<FaultyJournal>,
    }

    impl TestHarness {
        async fn new(accounts: &[(&str, &str, &str)]) -> Self {
            let memory = Arc::new(MemoryLedger::new());
            for (id, name, balance) in accounts {
                memory
                    .open_account(AccountId::new(*id), name, dec(balance))
                    .await
                    .unwrap();
            }
            let ledger = Arc::new(FaultyLedger::new(memory));
            let journal = Arc::new(MemoryJournal::new());
            let faults = Arc::new(FaultyJournal::new(journal.clone()));

            let config = OrchestratorConfig {
                max_scale: 2,
                credit_timeout: Duration::from_millis(50),
                refund_attempts: 2,
                refund_backoff: Duration::from_millis(1),
            };
            let orchestrator = Arc::new(TransferOrchestrator::new(
                ledger.clone(),
                faults.clone(),
                config,
            ));

            Self {
                orchestrator,
                ledger,
                journal,
                faults,
            }
        }

        /// Alice 1000, Bob 500
        async fn alice_and_bob() -> Self {
            Self::new(&[("alice", "Alice", "1000"), ("bob", "Bob", "500")]).await
        }

        fn worker(&self) -> RecoveryWorker {
            RecoveryWorker::new(
                self.orchestrator.clone(),
                WorkerConfig {
                    scan_interval: Duration::from_millis(10),
                    stale_threshold: Duration::from_secs(60),
                    batch_size: 100,
                    alert_after_retries: 2,
                },
            )
        }

        async fn balance(&self, id: &str) -> Decimal {
            self.ledger.get(&AccountId::new(id)).await.unwrap().balance
        }

        async fn record(&self, id: TransferId) -> TransferRecord {
            self.journal.get(id).await.unwrap().unwrap()
        }

        /// The single journaled record (tests that start one transfer)
        fn only_record(&self) -> TransferRecord {
            let mut records = self.journal.records();
            assert_eq!(records.len(), 1, "expected exactly one journaled transfer");
            records.remove(0)
        }

        fn make_stale(&self, id: TransferId) {
            self.journal.backdate(id, Duration::from_secs(120));
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn transfer(from: &str, to: &str, amount: &str, caller: &str) -> TransferRequest {
        TransferRequest::new(from, to, amount, AccountId::new(caller))
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    #[tokio::test]
    async fn test_successful_transfer_moves_funds() {
        let h = TestHarness::alice_and_bob().await;

        let receipt = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap();

        assert_eq!(receipt.sender_balance, dec("700"));
        assert_eq!(receipt.receiver_balance, dec("800"));
        assert_eq!(receipt.message(), "Transferred $300 from Alice to Bob.");
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("800"));

        let record = h.record(receipt.transfer_id).await;
        assert_eq!(record.state, TransferState::Completed);
        assert_eq!(record.sender_balance, Some(dec("700")));
        assert_eq!(record.receiver_balance, Some(dec("800")));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_balance() {
        let h = TestHarness::new(&[("alice", "Alice", "100"), ("bob", "Bob", "500")]).await;

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();

        assert_eq!(err, TransferError::InsufficientFunds);
        assert_eq!(h.balance("alice").await, dec("100"));
        assert_eq!(h.balance("bob").await, dec("500"));
        assert_eq!(h.ledger.credit_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_receiver_is_compensated() {
        let h = TestHarness::new(&[("alice", "Alice", "500")]).await;

        let err = h
            .orchestrator
            .transfer(transfer("alice", "missing-id", "100", "alice"))
            .await
            .unwrap_err();

        assert_eq!(err, TransferError::ReceiverNotFound("missing-id".into()));
        assert_eq!(h.balance("alice").await, dec("500"));
        assert_eq!(h.ledger.refund_calls(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_caller_mutates_nothing() {
        let h = TestHarness::new(&[
            ("alice", "Alice", "1000"),
            ("bob", "Bob", "500"),
            ("carol", "Carol", "10"),
        ])
        .await;

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "50", "carol"))
            .await
            .unwrap_err();

        assert_eq!(err, TransferError::Forbidden);
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
        assert_eq!(h.ledger.debit_calls(), 0);
        assert!(h.journal.is_empty());
    }

    #[tokio::test]
    async fn test_missing_sender() {
        let h = TestHarness::alice_and_bob().await;

        let err = h
            .orchestrator
            .transfer(transfer("ghost", "bob", "1", "ghost"))
            .await
            .unwrap_err();

        assert_eq!(err, TransferError::SenderNotFound("ghost".into()));
        assert_eq!(err.http_status(), 404);
        assert_eq!(h.balance("bob").await, dec("500"));
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_journal_write() {
        let h = TestHarness::alice_and_bob().await;

        for (from, to, amount) in [
            ("alice", "bob", "0"),
            ("alice", "bob", "-5"),
            ("alice", "bob", "abc"),
            ("alice", "bob", "1.001"),
            ("", "bob", "1"),
            ("alice", "alice", "1"),
        ] {
            let err = h
                .orchestrator
                .transfer(transfer(from, to, amount, "alice"))
                .await
                .unwrap_err();
            assert!(
                matches!(err, TransferError::Validation(_)),
                "{} -> {} ({}) gave {:?}",
                from,
                to,
                amount,
                err
            );
        }

        assert!(h.journal.is_empty());
        assert_eq!(h.ledger.debit_calls(), 0);
    }

    // ========================================================================
    // Compensation
    // ========================================================================

    #[tokio::test]
    async fn test_credit_failure_refunds_sender() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_fail_credit(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::CreditFailure(_)));
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
        assert!(h.journal.find_stale(Duration::ZERO, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credit_timeout_triggers_compensation() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_credit_delay(Duration::from_millis(500));

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();

        assert!(
            matches!(&err, TransferError::CreditFailure(msg) if msg.contains("timed out")),
            "got {:?}",
            err
        );
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
    }

    #[tokio::test]
    async fn test_failed_refund_is_distinct_and_stays_pending() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_fail_credit(true);
        h.ledger.fail_next_refunds(100);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();

        assert!(err.is_fund_safety_violation());
        assert_eq!(err.category(), "CompensationFailure");
        assert_eq!(h.balance("alice").await, dec("700"));

        let pending = h.only_record();
        assert_eq!(pending.state, TransferState::Compensating);
        assert!(pending.error.is_some());
    }

    // ========================================================================
    // Invariants under concurrency
    // ========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_no_double_spend_under_concurrency() {
        let h = TestHarness::new(&[("alice", "Alice", "1000"), ("bob", "Bob", "0")]).await;

        let mut handles = Vec::new();
        for _ in 0..40 {
            let orchestrator = h.orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .transfer(transfer("alice", "bob", "70", "alice"))
                    .await
            }));
        }

        let results = futures::future::join_all(handles).await;
        let mut successes = 0;
        for result in results {
            match result.unwrap() {
                Ok(receipt) => {
                    assert!(receipt.sender_balance >= Decimal::ZERO);
                    successes += 1;
                }
                Err(e) => assert_eq!(e, TransferError::InsufficientFunds),
            }
        }

        // floor(1000 / 70) = 14
        assert_eq!(successes, 14);
        assert_eq!(h.balance("alice").await, dec("20"));
        assert_eq!(h.balance("bob").await, dec("980"));
        assert_eq!(h.ledger.inner().total_balance(), dec("1000"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_conservation_with_crossing_transfers() {
        let h = TestHarness::alice_and_bob().await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let orchestrator = h.orchestrator.clone();
            let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            handles.push(tokio::spawn(async move {
                orchestrator.transfer(transfer(from, to, "12.34", from)).await
            }));
        }
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        assert_eq!(h.ledger.inner().total_balance(), dec("1500"));
        assert!(h.balance("alice").await >= Decimal::ZERO);
        assert!(h.balance("bob").await >= Decimal::ZERO);
    }

    // ========================================================================
    // Idempotency (client cid)
    // ========================================================================

    #[tokio::test]
    async fn test_cid_replay_returns_original_receipt() {
        let h = TestHarness::alice_and_bob().await;

        let first = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice").with_cid("pay-1"))
            .await
            .unwrap();
        let second = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice").with_cid("pay-1"))
            .await
            .unwrap();

        assert_eq!(first.transfer_id, second.transfer_id);
        assert_eq!(second.sender_balance, dec("700"));
        assert_eq!(second.message(), "Transferred $300 from Alice to Bob.");
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.ledger.debit_calls(), 1);
    }

    #[tokio::test]
    async fn test_cid_reuse_with_other_details_is_rejected() {
        let h = TestHarness::alice_and_bob().await;

        h.orchestrator
            .transfer(transfer("alice", "bob", "300", "alice").with_cid("pay-1"))
            .await
            .unwrap();
        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "301", "alice").with_cid("pay-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Validation(_)));
        assert_eq!(h.balance("alice").await, dec("700"));
    }

    #[tokio::test]
    async fn test_cid_of_unfinished_transfer_is_duplicate() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_fail_credit(true);
        h.ledger.fail_next_refunds(100);

        let _ = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice").with_cid("pay-2"))
            .await;
        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice").with_cid("pay-2"))
            .await
            .unwrap_err();

        assert_eq!(err, TransferError::DuplicateRequest);
        assert_eq!(err.http_status(), 409);
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    #[tokio::test]
    async fn test_worker_completes_unknown_debit() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_fail_debit(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::DebitFailure(_)));

        let stuck = h.only_record();
        assert_eq!(stuck.state, TransferState::Debiting);

        // Fresh records are left alone
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 0);

        h.ledger.set_fail_debit(false);
        h.make_stale(stuck.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        assert_eq!(h.record(stuck.transfer_id).await.state, TransferState::Completed);
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("800"));
    }

    #[tokio::test]
    async fn test_worker_does_not_repeat_applied_debit() {
        let h = TestHarness::alice_and_bob().await;

        // Crash after the debit, before the journal moved past DEBITING
        let req = transfer("alice", "bob", "300", "alice").validate(2).unwrap();
        let record = TransferRecord::new(TransferId::new(), &req);
        h.journal.create(&record).await.unwrap();
        h.ledger
            .conditional_debit(OpKey::debit(record.transfer_id), &record.from, record.amount)
            .await
            .unwrap();
        h.make_stale(record.transfer_id);

        h.worker().scan_and_recover().await.unwrap();

        assert_eq!(h.record(record.transfer_id).await.state, TransferState::Completed);
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("800"));
    }

    #[tokio::test]
    async fn test_worker_rejects_stale_debit_without_funds() {
        let h = TestHarness::new(&[("alice", "Alice", "100"), ("bob", "Bob", "0")]).await;

        let req = transfer("alice", "bob", "300", "alice").validate(2).unwrap();
        let record = TransferRecord::new(TransferId::new(), &req);
        h.journal.create(&record).await.unwrap();
        h.make_stale(record.transfer_id);

        h.worker().scan_and_recover().await.unwrap();

        assert_eq!(h.record(record.transfer_id).await.state, TransferState::Rejected);
        assert_eq!(h.balance("alice").await, dec("100"));
    }

    #[tokio::test]
    async fn test_worker_finishes_in_flight_credit() {
        let h = TestHarness::alice_and_bob().await;

        // Crash while CREDITING
        let req = transfer("alice", "bob", "300", "alice").validate(2).unwrap();
        let record = TransferRecord::new(TransferId::new(), &req);
        h.journal.create(&record).await.unwrap();
        h.ledger
            .conditional_debit(OpKey::debit(record.transfer_id), &record.from, record.amount)
            .await
            .unwrap();
        h.journal
            .update_state_if(
                record.transfer_id,
                TransferState::Debiting,
                TransferState::Crediting,
            )
            .await
            .unwrap();
        h.make_stale(record.transfer_id);

        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        let done = h.record(record.transfer_id).await;
        assert_eq!(done.state, TransferState::Completed);
        assert_eq!(done.receiver_balance, Some(dec("800")));
        assert_eq!(h.ledger.inner().total_balance(), dec("1500"));
    }

    #[tokio::test]
    async fn test_worker_compensates_in_flight_credit_to_missing_receiver() {
        let h = TestHarness::new(&[("alice", "Alice", "500")]).await;

        let req = transfer("alice", "gone", "100", "alice").validate(2).unwrap();
        let record = TransferRecord::new(TransferId::new(), &req);
        h.journal.create(&record).await.unwrap();
        h.ledger
            .conditional_debit(OpKey::debit(record.transfer_id), &record.from, record.amount)
            .await
            .unwrap();
        h.journal
            .update_state_if(
                record.transfer_id,
                TransferState::Debiting,
                TransferState::Crediting,
            )
            .await
            .unwrap();
        h.make_stale(record.transfer_id);

        h.worker().scan_and_recover().await.unwrap();

        assert_eq!(h.record(record.transfer_id).await.state, TransferState::Compensated);
        assert_eq!(h.balance("alice").await, dec("500"));
    }

    #[tokio::test]
    async fn test_worker_retries_pending_refund_until_acknowledged() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_fail_credit(true);
        h.ledger.fail_next_refunds(100);

        let _ = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await;
        let pending = h.only_record();
        assert_eq!(pending.state, TransferState::Compensating);

        // Refund ledger still down: no progress, retry counted
        h.make_stale(pending.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 0);
        assert_eq!(h.record(pending.transfer_id).await.retry_count, 1);
        assert_eq!(h.balance("alice").await, dec("700"));

        // Ledger back
        h.ledger.fail_next_refunds(0);
        h.make_stale(pending.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        assert_eq!(h.record(pending.transfer_id).await.state, TransferState::Compensated);
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
    }

    #[tokio::test]
    async fn test_status_is_scoped_to_caller() {
        let h = TestHarness::alice_and_bob().await;
        let receipt = h
            .orchestrator
            .transfer(transfer("alice", "bob", "1", "alice"))
            .await
            .unwrap();

        let record = h
            .orchestrator
            .status(receipt.transfer_id, &"alice".into())
            .await
            .unwrap();
        assert_eq!(record.state, TransferState::Completed);

        assert!(matches!(
            h.orchestrator.status(receipt.transfer_id, &"bob".into()).await,
            Err(TransferError::TransferNotFound(_))
        ));
    }

    // ========================================================================
    // Fenced legs
    // ========================================================================

    #[tokio::test]
    async fn test_late_credit_ack_completes_instead_of_refunding() {
        let h = TestHarness::alice_and_bob().await;
        // Credit lands, its acknowledgement arrives after the timeout
        h.ledger.set_credit_ack_delay(Duration::from_millis(200));

        let receipt = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap();

        assert_eq!(receipt.sender_balance, dec("700"));
        assert_eq!(receipt.receiver_balance, dec("800"));
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("800"));
        assert_eq!(h.ledger.inner().total_balance(), dec("1500"));
        assert_eq!(h.ledger.refund_calls(), 0);
        assert_eq!(h.only_record().state, TransferState::Completed);
    }

    #[tokio::test]
    async fn test_refunded_transfer_blocks_late_credit() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_credit_delay(Duration::from_millis(500));

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::CreditFailure(_)));
        let refunded = h.only_record();
        assert_eq!(refunded.state, TransferState::Compensated);

        // A retried credit arriving after the refund is refused
        let late = h
            .ledger
            .inner()
            .credit(OpKey::credit(refunded.transfer_id), &refunded.to, refunded.amount)
            .await;
        assert!(matches!(late, Err(LedgerError::Voided(_))));
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
        assert_eq!(h.ledger.inner().total_balance(), dec("1500"));
    }

    #[tokio::test]
    async fn test_unfenced_credit_is_pending_until_recovered() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.set_credit_delay(Duration::from_millis(500));
        h.ledger.set_fail_void(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Pending(_)));
        assert_eq!(err.http_status(), 503);
        let pending = h.only_record();
        assert_eq!(pending.state, TransferState::Crediting);
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.ledger.refund_calls(), 0);

        // Still unfenceable: no progress
        h.make_stale(pending.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 0);
        assert_eq!(h.record(pending.transfer_id).await.state, TransferState::Crediting);

        h.ledger.set_credit_delay(Duration::ZERO);
        h.ledger.set_fail_void(false);
        h.make_stale(pending.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        assert_eq!(h.record(pending.transfer_id).await.state, TransferState::Completed);
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("800"));
    }

    #[tokio::test]
    async fn test_rejection_stands_when_journal_write_fails() {
        let h = TestHarness::new(&[("alice", "Alice", "100"), ("bob", "Bob", "0")]).await;
        h.faults.fail_transitions_into(TransferState::Rejected);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::InsufficientFunds);
        let rejected = h.only_record();
        assert_eq!(rejected.state, TransferState::Debiting);

        // Funds arrive after the caller was told no
        h.ledger
            .credit(
                OpKey::credit(TransferId::new()),
                &AccountId::new("alice"),
                Amount::new(dec("500")).unwrap(),
            )
            .await
            .unwrap();

        // Recovery while the journal is still down must not debit
        h.make_stale(rejected.transfer_id);
        h.worker().scan_and_recover().await.unwrap();
        assert_eq!(h.balance("alice").await, dec("600"));
        assert_eq!(h.balance("bob").await, dec("0"));

        h.faults.heal();
        h.worker().scan_and_recover().await.unwrap();
        assert_eq!(h.record(rejected.transfer_id).await.state, TransferState::Rejected);
        assert_eq!(h.balance("alice").await, dec("600"));
        assert_eq!(h.balance("bob").await, dec("0"));
    }

    #[tokio::test]
    async fn test_unfenced_rejection_is_left_for_recovery() {
        let h = TestHarness::new(&[("alice", "Alice", "100"), ("bob", "Bob", "0")]).await;
        h.ledger.set_fail_void(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::DebitFailure(_)));
        let stuck = h.only_record();
        assert_eq!(stuck.state, TransferState::Debiting);

        h.ledger.set_fail_void(false);
        h.make_stale(stuck.transfer_id);
        h.worker().scan_and_recover().await.unwrap();

        assert_eq!(h.record(stuck.transfer_id).await.state, TransferState::Rejected);
        assert_eq!(h.balance("alice").await, dec("100"));
    }

    // ========================================================================
    // Journal faults
    // ========================================================================

    #[tokio::test]
    async fn test_journal_create_failure_moves_nothing() {
        let h = TestHarness::alice_and_bob().await;
        h.faults.set_fail_create(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Journal(_)));
        assert!(h.journal.is_empty());
        assert_eq!(h.ledger.debit_calls(), 0);
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
    }

    #[tokio::test]
    async fn test_credit_proceeds_when_crediting_write_fails() {
        let h = TestHarness::alice_and_bob().await;
        h.faults.fail_transitions_into(TransferState::Crediting);

        let receipt = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap();
        assert_eq!(receipt.receiver_balance, dec("800"));
        let behind = h.record(receipt.transfer_id).await;
        assert_eq!(behind.state, TransferState::Debiting);

        h.faults.heal();
        h.make_stale(behind.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        assert_eq!(h.record(behind.transfer_id).await.state, TransferState::Completed);
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("800"));
    }

    #[tokio::test]
    async fn test_refund_proceeds_when_crediting_write_fails() {
        let h = TestHarness::alice_and_bob().await;
        h.faults.fail_transitions_into(TransferState::Crediting);
        h.ledger.set_fail_credit(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::CreditFailure(_)));
        assert_eq!(h.balance("alice").await, dec("1000"));
        let behind = h.only_record();
        assert_eq!(behind.state, TransferState::Debiting);

        // Credit healthy again, but the refunded leg stays fenced
        h.faults.heal();
        h.ledger.set_fail_credit(false);
        h.make_stale(behind.transfer_id);
        h.worker().scan_and_recover().await.unwrap();

        assert_eq!(h.record(behind.transfer_id).await.state, TransferState::Compensated);
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
    }

    #[tokio::test]
    async fn test_receipt_stands_when_completion_write_fails() {
        let h = TestHarness::alice_and_bob().await;
        h.faults.set_fail_complete(true);

        let receipt = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap();
        assert_eq!(receipt.sender_balance, dec("700"));
        assert_eq!(receipt.receiver_balance, dec("800"));
        assert_eq!(
            h.record(receipt.transfer_id).await.state,
            TransferState::Crediting
        );

        h.faults.heal();
        h.make_stale(receipt.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        let done = h.record(receipt.transfer_id).await;
        assert_eq!(done.state, TransferState::Completed);
        assert_eq!(done.receiver_balance, Some(dec("800")));
        assert_eq!(h.ledger.inner().total_balance(), dec("1500"));
    }

    #[tokio::test]
    async fn test_refund_proceeds_when_compensating_write_fails() {
        let h = TestHarness::alice_and_bob().await;
        h.faults.fail_transitions_into(TransferState::Compensating);
        h.ledger.set_fail_credit(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::CreditFailure(_)));
        assert_eq!(h.balance("alice").await, dec("1000"));
        let behind = h.only_record();
        assert_eq!(behind.state, TransferState::Crediting);

        h.faults.heal();
        h.ledger.set_fail_credit(false);
        h.make_stale(behind.transfer_id);
        h.worker().scan_and_recover().await.unwrap();

        assert_eq!(h.record(behind.transfer_id).await.state, TransferState::Compensated);
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
    }

    #[tokio::test]
    async fn test_compensated_write_failure_is_finished_by_worker() {
        let h = TestHarness::alice_and_bob().await;
        h.faults.fail_transitions_into(TransferState::Compensated);
        h.ledger.set_fail_credit(true);

        let err = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::CreditFailure(_)));
        let behind = h.only_record();
        assert_eq!(behind.state, TransferState::Compensating);

        h.faults.heal();
        h.make_stale(behind.transfer_id);
        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        assert_eq!(h.record(behind.transfer_id).await.state, TransferState::Compensated);
        assert_eq!(h.balance("alice").await, dec("1000"));
        assert_eq!(h.balance("bob").await, dec("500"));
    }

    #[tokio::test]
    async fn test_worker_continues_past_failed_retry_count() {
        let h = TestHarness::alice_and_bob().await;
        h.ledger.fail_next_refunds(100);

        // Pending refund that cannot progress
        let req = transfer("alice", "bob", "100", "alice").validate(2).unwrap();
        let pending = TransferRecord::new(TransferId::new(), &req);
        h.journal.create(&pending).await.unwrap();
        h.ledger
            .conditional_debit(OpKey::debit(pending.transfer_id), &pending.from, pending.amount)
            .await
            .unwrap();
        h.journal
            .update_state_if(
                pending.transfer_id,
                TransferState::Debiting,
                TransferState::Crediting,
            )
            .await
            .unwrap();
        h.journal
            .update_state_with_error(
                pending.transfer_id,
                TransferState::Crediting,
                TransferState::Compensating,
                "credit failed",
            )
            .await
            .unwrap();

        // Interrupted transfer that can
        let req = transfer("alice", "bob", "200", "alice").validate(2).unwrap();
        let interrupted = TransferRecord::new(TransferId::new(), &req);
        h.journal.create(&interrupted).await.unwrap();

        h.make_stale(pending.transfer_id);
        h.make_stale(interrupted.transfer_id);
        h.faults.set_fail_increment_retry(true);

        assert_eq!(h.worker().scan_and_recover().await.unwrap(), 1);

        assert_eq!(h.record(interrupted.transfer_id).await.state, TransferState::Completed);
        let still = h.record(pending.transfer_id).await;
        assert_eq!(still.state, TransferState::Compensating);
        assert_eq!(still.retry_count, 0);
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("700"));
    }

    #[tokio::test]
    async fn test_pruned_transfers_release_memory() {
        let h = TestHarness::alice_and_bob().await;
        let receipt = h
            .orchestrator
            .transfer(transfer("alice", "bob", "300", "alice").with_cid("order-9"))
            .await
            .unwrap();
        assert_eq!(h.ledger.inner().op_count(), 2);

        let pruned = h.journal.prune_terminal(Duration::ZERO);
        assert_eq!(pruned, vec![receipt.transfer_id]);
        h.ledger.inner().forget_transfers(&pruned);

        assert!(h.journal.is_empty());
        assert_eq!(h.ledger.inner().op_count(), 0);
        assert_eq!(h.balance("alice").await, dec("700"));
        assert_eq!(h.balance("bob").await, dec("800"));
    }
}
