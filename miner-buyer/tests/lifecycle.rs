mod common;

use chain_time::Disposition;
use common::{Harness, MINER, deadline_at_hour};
use lotus_gateway::{Address, TokenAmount, methods};
use miner_buyer::admission::AdmissionGate;
use miner_buyer::daemon::RELOCATED_DIR_NAME;
use miner_buyer::error::Error;
use miner_buyer::ledger::RunEvent;
use miner_buyer::lifecycle::{CreateOutcome, LifecycleState, RunReport};

fn gate(harness: &Harness, estimate_fil: u64, threshold_fil: u64) -> AdmissionGate {
    *harness.chain.fee.lock() = Some(TokenAmount::from_whole(estimate_fil));
    AdmissionGate::new(harness.chain.clone(), TokenAmount::from_whole(threshold_fil))
}

async fn create(harness: &Harness, estimate_fil: u64, threshold_fil: u64) -> CreateOutcome {
    let gate = gate(harness, estimate_fil, threshold_fil);
    harness
        .orchestrator
        .create(&gate, &harness.owner())
        .await
        .unwrap()
}

fn completed(outcome: CreateOutcome) -> RunReport {
    match outcome {
        CreateOutcome::Completed(report) => report,
        CreateOutcome::Rejected(decision) => panic!("unexpectedly rejected: {decision:?}"),
    }
}

async fn transitions(harness: &Harness) -> Vec<(LifecycleState, LifecycleState)> {
    harness
        .orchestrator
        .runs()
        .records()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|record| match record.event {
            RunEvent::Transition { from, to } => Some((from, to)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_admitted_create_ends_relocated() {
    let harness = Harness::new((9, 17));
    let report = completed(create(&harness, 1, 2).await);

    assert_eq!(report.final_state, LifecycleState::Relocated);
    assert_eq!(report.miner, Some(Address::new_id(MINER)));

    let backup_dir = harness.paths.backup_dir(&report.worker);
    assert_eq!(report.backup_dir.as_deref(), Some(backup_dir.as_path()));
    assert_eq!(
        report.relocated_to.as_deref(),
        Some(backup_dir.join(RELOCATED_DIR_NAME).as_path())
    );
    assert!(backup_dir.join("bak").is_file());
    assert!(backup_dir.join("key").is_file());
    assert!(backup_dir.join(RELOCATED_DIR_NAME).is_dir());
    assert!(!harness.paths.miner_dir(&report.worker).exists());

    assert_eq!(
        harness.daemon.calls(),
        ["initialize", "start", "stop", "backup", "relocate"]
    );
    // worker activation is a plain send from the owner
    let submitted = harness.chain.submitted.lock();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].method, methods::SEND);
    assert_eq!(submitted[0].from, harness.owner());
    assert_eq!(submitted[0].to, report.worker);

    drop(submitted);
    assert_eq!(
        transitions(&harness).await,
        vec![
            (LifecycleState::Uninitialized, LifecycleState::Initialized),
            (LifecycleState::Initialized, LifecycleState::Running),
            (LifecycleState::Running, LifecycleState::Stopped),
            (LifecycleState::Stopped, LifecycleState::BackedUp),
            (LifecycleState::BackedUp, LifecycleState::Relocated),
        ]
    );
}

#[tokio::test]
async fn test_rejected_create_touches_nothing() {
    let harness = Harness::new((9, 17));
    let outcome = create(&harness, 2, 1).await;

    match outcome {
        CreateOutcome::Rejected(decision) => {
            assert!(!decision.admitted);
            assert_eq!(decision.estimate, Some(TokenAmount::from_whole(2)));
        }
        CreateOutcome::Completed(report) => panic!("unexpectedly created {}", report.worker),
    }
    assert!(harness.daemon.calls().is_empty());
    assert!(harness.chain.submitted.lock().is_empty());
    assert!(!harness.orchestrator.runs().path().exists());
    for disposition in [Disposition::Keep, Disposition::Sell, Disposition::ArchiveOnly] {
        assert!(harness.ledger_lines(disposition.ledger_file_name()).is_empty());
    }
}

#[tokio::test]
async fn test_unreadable_fee_rejects() {
    let harness = Harness::new((9, 17));
    let gate = gate(&harness, 1, 2);
    *harness.chain.fee.lock() = None;

    let outcome = harness
        .orchestrator
        .create(&gate, &harness.owner())
        .await
        .unwrap();
    assert!(matches!(outcome, CreateOutcome::Rejected(d) if d.estimate.is_none()));
    assert!(harness.daemon.calls().is_empty());
}

#[tokio::test]
async fn test_deadline_inside_window_is_kept() {
    let harness = Harness::new((9, 17));
    *harness.chain.deadline.lock() = Some(deadline_at_hour(14));

    let report = completed(create(&harness, 1, 2).await);

    assert_eq!(report.classification.map(|c| c.hour), Some(14));
    assert_eq!(report.disposition, Some(Disposition::Keep));
    assert_eq!(harness.ledger_lines("keepminer.list"), vec![report.worker.to_string()]);
    assert!(harness.ledger_lines("sellminer.list").is_empty());
}

#[tokio::test]
async fn test_deadline_outside_window_is_sold() {
    let harness = Harness::new((9, 17));
    *harness.chain.deadline.lock() = Some(deadline_at_hour(22));

    let report = completed(create(&harness, 1, 2).await);

    assert_eq!(report.classification.map(|c| c.hour), Some(22));
    assert_eq!(report.disposition, Some(Disposition::Sell));
    assert_eq!(harness.ledger_lines("sellminer.list"), vec![report.worker.to_string()]);
    assert!(harness.ledger_lines("keepminer.list").is_empty());

    let summaries = harness.orchestrator.runs().summaries().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].disposition, Some(Disposition::Sell));
    assert_eq!(summaries[0].miner, Some(Address::new_id(MINER)));
}

#[tokio::test]
async fn test_failed_activation_stops_before_init() {
    let harness = Harness::new((9, 17));
    *harness.chain.exit_code.lock() = 6;

    let gate = gate(&harness, 1, 2);
    let err = harness
        .orchestrator
        .create(&gate, &harness.owner())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Init { .. }));
    assert!(harness.daemon.calls().is_empty());
}

#[tokio::test]
async fn test_failure_after_start_still_stops() {
    let harness = Harness::new((9, 17));
    // the miner actor cannot be read while running
    *harness.miner_api.miner.lock() = None;

    let gate = gate(&harness, 1, 2);
    let err = harness
        .orchestrator
        .create(&gate, &harness.owner())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ChainRead { .. }));
    assert_eq!(harness.daemon.calls(), ["initialize", "start", "stop"]);

    let records = harness.orchestrator.runs().records().await.unwrap();
    let last = records.last().unwrap();
    assert!(matches!(
        last.event,
        RunEvent::Transition {
            to: LifecycleState::Failed,
            ..
        }
    ));
    assert!(records.iter().any(|r| matches!(
        &r.event,
        RunEvent::Failed { error_kind, .. } if error_kind == "chain_read"
    )));
}

#[tokio::test]
async fn test_failed_cleanup_stop_keeps_original_error() {
    let harness = Harness::new((9, 17));
    *harness.chain.deadline.lock() = None;
    *harness.daemon.fail_on.lock() = Some("stop");

    let gate = gate(&harness, 1, 2);
    let err = harness
        .orchestrator
        .create(&gate, &harness.owner())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ChainRead { .. }));
    assert_eq!(harness.daemon.calls(), ["initialize", "start", "stop"]);
}

#[tokio::test]
async fn test_failed_stop_after_success_is_reported() {
    let harness = Harness::new((9, 17));
    *harness.daemon.fail_on.lock() = Some("stop");

    let gate = gate(&harness, 1, 2);
    let err = harness
        .orchestrator
        .create(&gate, &harness.owner())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Stop { .. }));
    assert!(harness.ledger_lines("keepminer.list").is_empty());
}

#[tokio::test]
async fn test_resume_reports_without_ledger_entry() {
    let harness = Harness::new((9, 17));
    let worker = Address::new_id(4242);
    harness.seed_backup(&worker);

    let report = harness.orchestrator.resume(&worker).await.unwrap();

    assert_eq!(report.final_state, LifecycleState::Relocated);
    assert_eq!(report.classification.map(|c| c.hour), Some(14));
    assert_eq!(report.disposition, None);
    assert_eq!(
        harness.daemon.calls(),
        ["restore", "start", "stop", "relocate"]
    );

    let relocated = report.relocated_to.unwrap();
    assert!(relocated.is_dir());
    let parked_under = relocated.parent().unwrap();
    assert_eq!(parked_under.parent(), Some(harness.paths.backup_dir(&worker).as_path()));
    assert!(
        parked_under
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("resume-")
    );
    assert!(harness.ledger_lines("keepminer.list").is_empty());
    assert!(!harness.paths.miner_dir(&worker).exists());
}

#[tokio::test]
async fn test_resume_without_archive_fails_at_restore() {
    let harness = Harness::new((9, 17));
    let err = harness
        .orchestrator
        .resume(&Address::new_id(4243))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Restore { .. }));
    assert_eq!(harness.daemon.calls(), ["restore"]);
}

#[tokio::test]
async fn test_archive_backs_up_existing_data_dir() {
    let harness = Harness::new((9, 17));
    let worker = Address::new_id(4300);
    std::fs::create_dir_all(harness.paths.miner_dir(&worker)).unwrap();

    let report = harness.orchestrator.archive(&worker).await.unwrap();

    assert_eq!(report.final_state, LifecycleState::Relocated);
    assert_eq!(report.disposition, Some(Disposition::ArchiveOnly));
    assert_eq!(report.classification, None);
    assert_eq!(report.miner, Some(Address::new_id(MINER)));
    assert_eq!(
        harness.daemon.calls(),
        ["start", "stop", "backup", "relocate"]
    );
    assert_eq!(harness.ledger_lines("backupminer.list"), vec![worker.to_string()]);
}

#[tokio::test]
async fn test_archive_without_data_dir_spawns_nothing() {
    let harness = Harness::new((9, 17));
    let err = harness
        .orchestrator
        .archive(&Address::new_id(4301))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidStateTransition { .. }));
    assert!(harness.daemon.calls().is_empty());
}

#[tokio::test]
async fn test_archive_into_occupied_backup_dir_touches_nothing() {
    let harness = Harness::new((9, 17));
    let worker = Address::new_id(4302);
    std::fs::create_dir_all(harness.paths.miner_dir(&worker)).unwrap();
    let parked = harness.paths.backup_dir(&worker).join(RELOCATED_DIR_NAME);
    std::fs::create_dir_all(&parked).unwrap();

    let err = harness.orchestrator.archive(&worker).await.unwrap_err();

    assert!(matches!(err, Error::Relocate { .. }));
    assert!(harness.daemon.calls().is_empty());
    assert!(harness.ledger_lines("backupminer.list").is_empty());
    assert!(!harness.paths.backup_dir(&worker).join("bak").exists());
    assert!(harness.paths.miner_dir(&worker).is_dir());
}

#[tokio::test]
async fn test_create_into_occupied_backup_dir_submits_nothing() {
    let harness = Harness::new((9, 17));
    // the fake node hands out f03000 as the first worker key
    let worker = Address::new_id(3000);
    std::fs::create_dir_all(harness.paths.backup_dir(&worker).join(RELOCATED_DIR_NAME)).unwrap();

    let gate = gate(&harness, 1, 2);
    let err = harness
        .orchestrator
        .create(&gate, &harness.owner())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Relocate { .. }));
    assert!(harness.daemon.calls().is_empty());
    assert!(harness.chain.submitted.lock().is_empty());
    assert!(harness.ledger_lines("keepminer.list").is_empty());
    assert!(harness.ledger_lines("sellminer.list").is_empty());
}
