//! Integration tests for pool sizing, publishing, and reconciliation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{account, FakeDirectory, Gate, RecordingScheduler, Reply};
use ecdh_keypool::upload::StaticAccount;
use ecdh_keypool::{
    BackoffPolicy, KeyPoolManager, KeyStore, P256Crypto, PoolIntent, PoolOptions, PoolOutcome,
    PublishResponse, SqliteKeyStore, UploadCoordinator, MINIMUM_KEYS,
};

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    manager: Arc<KeyPoolManager>,
    store: Arc<SqliteKeyStore>,
    directory: Arc<FakeDirectory>,
    scheduler: Arc<RecordingScheduler>,
}

fn harness(directory: FakeDirectory) -> Harness {
    let store = Arc::new(SqliteKeyStore::open_in_memory().expect("open store"));
    let directory = Arc::new(directory);
    let scheduler = Arc::new(RecordingScheduler::default());
    let uploader = Arc::new(UploadCoordinator::new(
        directory.clone(),
        scheduler.clone(),
        BackoffPolicy::default(),
    ));
    let manager = Arc::new(KeyPoolManager::new(
        store.clone(),
        Arc::new(P256Crypto),
        Arc::new(StaticAccount(Some(account()))),
        uploader,
        PoolOptions::default(),
    ));
    Harness {
        manager,
        store,
        directory,
        scheduler,
    }
}

fn key_ids(store: &SqliteKeyStore) -> Vec<String> {
    store
        .list_ecdh_key_pairs()
        .expect("list")
        .iter()
        .map(|p| p.key_id().to_string())
        .collect()
}

// ============================================================================
// Sizing and publishing
// ============================================================================

#[tokio::test]
async fn empty_pool_is_filled_published_and_acknowledged() {
    let h = harness(FakeDirectory::default());

    let outcome = h.manager.ensure_pool(PoolIntent::fresh()).await.expect("ensure");

    assert_eq!(
        outcome,
        PoolOutcome::Synced {
            generated: MINIMUM_KEYS,
            removed: 0,
            pool_size: MINIMUM_KEYS
        }
    );
    assert_eq!(h.store.count_ecdh_key_pairs().unwrap(), MINIMUM_KEYS);
    assert_eq!(h.manager.uploader().backoff_attempts(), 0);

    let requests = h.directory.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].public_keys.len(), MINIMUM_KEYS);
    assert_eq!(requests[0].account, account());
}

#[tokio::test]
async fn published_halves_match_stored_pairs() {
    let h = harness(FakeDirectory::default());
    h.manager.ensure_pool(PoolIntent::fresh()).await.expect("ensure");

    let requests = h.directory.requests.lock();
    for half in &requests[0].public_keys {
        let pair = h
            .store
            .get_ecdh_key_pair(&half.key_id)
            .unwrap()
            .expect("published pair is stored");
        assert_eq!(half.public_key, hex::encode(pair.public_point()));
    }
}

#[tokio::test]
async fn full_pool_is_not_regenerated() {
    let h = harness(FakeDirectory::default());
    h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();
    let before = key_ids(&h.store);

    let outcome = h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();

    assert!(matches!(outcome, PoolOutcome::Synced { generated: 0, .. }));
    assert_eq!(key_ids(&h.store), before);
}

#[tokio::test]
async fn retry_intent_twice_generates_nothing() {
    let h = harness(FakeDirectory::default());
    h.manager
        .ensure_pool(PoolIntent::fresh().without_upload())
        .await
        .unwrap();
    let before = key_ids(&h.store);

    h.manager.ensure_pool(PoolIntent::retry()).await.unwrap();
    h.manager.ensure_pool(PoolIntent::retry()).await.unwrap();

    assert_eq!(key_ids(&h.store), before);
    assert_eq!(h.directory.request_count(), 2);
}

#[tokio::test]
async fn no_account_skips_publish_and_resets_backoff() {
    let store = Arc::new(SqliteKeyStore::open_in_memory().unwrap());
    let directory = Arc::new(FakeDirectory::scripted([Reply::Offline]));
    let scheduler = Arc::new(RecordingScheduler::default());
    let uploader = Arc::new(UploadCoordinator::new(
        directory.clone(),
        scheduler,
        BackoffPolicy::default(),
    ));
    let manager = KeyPoolManager::new(
        store.clone(),
        Arc::new(P256Crypto),
        Arc::new(StaticAccount(None)),
        uploader.clone(),
        PoolOptions::default(),
    );

    let outcome = manager.ensure_pool(PoolIntent::fresh()).await.unwrap();

    assert_eq!(outcome, PoolOutcome::NoAccount { pool_size: MINIMUM_KEYS });
    assert_eq!(directory.request_count(), 0);
    assert_eq!(uploader.backoff_attempts(), 0);
}

// ============================================================================
// Failure and backoff
// ============================================================================

#[tokio::test]
async fn connectivity_failure_schedules_retry() {
    let h = harness(FakeDirectory::scripted([Reply::Offline]));
    h.manager
        .ensure_pool(PoolIntent::fresh().without_upload())
        .await
        .unwrap();

    let outcome = h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();

    assert!(matches!(outcome, PoolOutcome::RetryScheduled { attempt: 1, .. }));
    assert_eq!(h.store.count_ecdh_key_pairs().unwrap(), MINIMUM_KEYS);
    assert_eq!(h.manager.uploader().backoff_attempts(), 1);
    let retries = h.scheduler.retries.lock();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].intent, PoolIntent::retry());
}

#[tokio::test]
async fn backoff_grows_until_success() {
    let h = harness(FakeDirectory::scripted([
        Reply::Offline,
        Reply::Status(500),
        Reply::Status(429),
        Reply::AckAll,
    ]));
    h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();
    h.manager.ensure_pool(PoolIntent::retry()).await.unwrap();
    h.manager.ensure_pool(PoolIntent::retry()).await.unwrap();

    let delays: Vec<Duration> = h.scheduler.retries.lock().iter().map(|r| r.delay).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(30),
            Duration::from_secs(60),
            Duration::from_secs(120)
        ]
    );

    let outcome = h.manager.ensure_pool(PoolIntent::retry()).await.unwrap();
    assert!(matches!(outcome, PoolOutcome::Synced { .. }));
    assert_eq!(h.manager.uploader().backoff_attempts(), 0);
}

#[tokio::test]
async fn rejected_publish_keeps_every_pair() {
    let h = harness(FakeDirectory::scripted([Reply::Status(503)]));
    h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();
    assert_eq!(h.store.count_ecdh_key_pairs().unwrap(), MINIMUM_KEYS);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn reconcile_keeps_only_acknowledged_ids() {
    let h = harness(FakeDirectory::default());
    h.manager
        .ensure_pool(PoolIntent::fresh().without_upload())
        .await
        .unwrap();
    let ids = key_ids(&h.store);
    let kept: Vec<String> = ids[..10].to_vec();

    let removed = h
        .manager
        .reconcile(&PublishResponse::ok(kept.clone()))
        .unwrap();

    assert_eq!(removed, 15);
    assert_eq!(key_ids(&h.store), kept);

    let outcome = h
        .manager
        .ensure_pool(PoolIntent::fresh().without_upload())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PoolOutcome::Generated {
            generated: 15,
            pool_size: MINIMUM_KEYS
        }
    );
    let after = key_ids(&h.store);
    assert_eq!(&after[..10], kept.as_slice());
}

#[tokio::test]
async fn partial_ack_refills_within_one_call() {
    let h = harness(FakeDirectory::scripted([Reply::AckFirst(10)]));

    let outcome = h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();

    assert_eq!(
        outcome,
        PoolOutcome::Synced {
            generated: 40,
            removed: 15,
            pool_size: MINIMUM_KEYS
        }
    );
    assert_eq!(h.directory.request_count(), 2);
}

#[tokio::test]
async fn reconciliation_rounds_are_bounded() {
    let h = harness(FakeDirectory::scripted([
        Reply::AckFirst(0),
        Reply::AckFirst(0),
        Reply::AckFirst(0),
        Reply::AckFirst(0),
    ]));

    let outcome = h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();

    assert_eq!(
        outcome,
        PoolOutcome::ReconcileLimitReached {
            removed: 3 * MINIMUM_KEYS,
            pool_size: 0
        }
    );
    assert_eq!(
        h.directory.request_count(),
        PoolOptions::default().max_reconcile_rounds
    );
}

// ============================================================================
// Single flight
// ============================================================================

#[tokio::test]
async fn concurrent_publish_makes_one_network_call() {
    let gate = Arc::new(Gate::default());
    let h = harness(FakeDirectory::gated(gate.clone()));
    h.manager
        .ensure_pool(PoolIntent::fresh().without_upload())
        .await
        .unwrap();

    let first = {
        let manager = h.manager.clone();
        tokio::spawn(async move { manager.ensure_pool(PoolIntent::fresh()).await })
    };
    gate.entered.notified().await;

    let second = h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();
    assert!(matches!(second, PoolOutcome::Deferred { .. }));
    assert_eq!(h.directory.request_count(), 1);

    gate.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, PoolOutcome::Synced { .. }));

    assert_eq!(h.directory.request_count(), 1);
    let retries = h.scheduler.retries.lock();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].intent, PoolIntent::retry());
}

// ============================================================================
// Account removal
// ============================================================================

#[tokio::test]
async fn forgetting_account_empties_both_tables() {
    let h = harness(FakeDirectory::default());
    h.manager.ensure_pool(PoolIntent::fresh()).await.unwrap();
    h.store
        .insert_symmetric_key(&ecdh_keypool::SymmetricSessionKey::new("s1", [1u8; 32]))
        .unwrap();

    h.manager.forget_account().unwrap();

    assert_eq!(h.store.count_ecdh_key_pairs().unwrap(), 0);
    assert!(h.store.get_symmetric_key("s1").unwrap().is_none());
}
