use spectra_core::cache::{CacheConfig, CacheEngine};
use spectra_core::domain::{LedgerError, SpectraError};
use spectra_core::ledger::{DuplicateLedger, LedgerScope};
use spectra_core::pipeline::{BatchStatus, IngestOptions, ingest_batch, ingest_bytes};
use tempfile::TempDir;

const BYTES: &[u8] = b"# xunits: nm\n400.0 1.0\n500.0 2.0\n600.0 3.0\n";

fn engine(temp: &TempDir) -> CacheEngine {
    CacheEngine::new(CacheConfig::new(temp.path().join("cache")))
}

fn global_options() -> IngestOptions {
    IngestOptions {
        scope: Some(LedgerScope::Global),
        ..IngestOptions::default()
    }
}

#[test]
fn identical_bytes_under_lock_yield_one_entry_and_a_rejection() {
    let temp = TempDir::new().expect("tempdir should be created");
    let store = temp.path().join("ledger.json");
    let ledger = DuplicateLedger::open(&store)
        .expect("store should open")
        .with_lock(true);
    let cache = engine(&temp);

    let first = ingest_bytes("scan.txt", BYTES, &global_options(), &ledger, &cache)
        .expect("first ingest should pass the gate");
    assert!(first.duplicate_of.is_none());

    let second = ingest_bytes("scan-copy.txt", BYTES, &global_options(), &ledger, &cache)
        .expect_err("identical bytes must be rejected while locked");
    assert!(matches!(
        second,
        SpectraError::Ledger(LedgerError::DuplicateLocked { .. })
    ));

    assert_eq!(ledger.entries().expect("entries").len(), 1);

    let overridden = ingest_bytes(
        "scan-forced.txt",
        BYTES,
        &IngestOptions {
            override_duplicate_lock: true,
            ..global_options()
        },
        &ledger,
        &cache,
    )
    .expect("explicit override must pass");
    assert!(overridden.duplicate_of.is_some());
    assert_eq!(ledger.entries().expect("entries").len(), 1);
}

#[test]
fn global_entries_gate_across_store_reopen() {
    let temp = TempDir::new().expect("tempdir should be created");
    let store = temp.path().join("ledger.json");
    let cache = engine(&temp);

    {
        let ledger = DuplicateLedger::open(&store).expect("store should open");
        ingest_bytes("scan.txt", BYTES, &global_options(), &ledger, &cache)
            .expect("first session ingest");
    }

    let reopened = DuplicateLedger::open(&store)
        .expect("store should reopen")
        .with_lock(true);
    let error = ingest_bytes("scan.txt", BYTES, &global_options(), &reopened, &cache)
        .expect_err("persisted entry must gate the next session");
    assert!(matches!(
        error,
        SpectraError::Ledger(LedgerError::DuplicateLocked { .. })
    ));
}

#[test]
fn session_scope_does_not_leak_into_a_new_ledger() {
    let temp = TempDir::new().expect("tempdir should be created");
    let cache = engine(&temp);

    {
        let ledger = DuplicateLedger::in_memory().with_lock(true);
        ingest_bytes("scan.txt", BYTES, &IngestOptions::default(), &ledger, &cache)
            .expect("session ingest");
    }

    let fresh = DuplicateLedger::in_memory().with_lock(true);
    ingest_bytes("scan.txt", BYTES, &IngestOptions::default(), &fresh, &cache)
        .expect("a new session starts with a clean session scope");
}

#[test]
fn batch_counts_locked_duplicates_as_skips() {
    let temp = TempDir::new().expect("tempdir should be created");
    let ledger = DuplicateLedger::in_memory().with_lock(true);
    let cache = engine(&temp);

    let report = ingest_batch(
        [
            ("a.txt".to_string(), BYTES.to_vec()),
            ("a-again.txt".to_string(), BYTES.to_vec()),
            ("broken.txt".to_string(), b"# xunits: nm\nonly text\n".to_vec()),
        ],
        &IngestOptions::default(),
        &ledger,
        &cache,
    );

    assert_eq!(report.ingested, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.items[1].status, BatchStatus::DuplicateSkipped);
    assert_eq!(report.items[2].status, BatchStatus::Failed);
}

#[test]
fn concurrent_identical_ingests_record_exactly_one_entry() {
    let temp = TempDir::new().expect("tempdir should be created");
    let ledger = DuplicateLedger::in_memory();
    let cache = engine(&temp);

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let ledger = &ledger;
            let cache = &cache;
            scope.spawn(move || {
                let name = format!("worker-{worker}.txt");
                ingest_bytes(&name, BYTES, &IngestOptions::default(), ledger, cache)
                    .expect("unlocked duplicate ingest is permitted");
            });
        }
    });

    assert_eq!(
        ledger.entries().expect("entries").len(),
        1,
        "check-and-record must collapse concurrent identical content"
    );
}
