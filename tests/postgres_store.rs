//! Runs the vote path against a real Postgres.
//!
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

use std::env;
use std::sync::Arc;

use quick_polls::db::create_pool;
use quick_polls::error::PollError;
use quick_polls::services::PollService;
use quick_polls::store::{PgStore, Storage, VoteLedger};
use quick_polls::VoterId;
use tokio::task::JoinSet;

async fn pg_service() -> (PollService, Arc<PgStore>) {
    let url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = create_pool(&url, 20).await.unwrap();
    let store = Arc::new(PgStore::new(pool));
    (PollService::new(store.clone()), store)
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn pick_one_scenario() {
    let (svc, _) = pg_service().await;
    let poll = svc.create_poll("Pick one", ["A", "B"]).await.unwrap();
    let id = poll.id.to_string();

    assert_eq!(svc.cast_vote(&id, "v1", 0).await.unwrap().tallies(), vec![1, 0]);
    assert!(matches!(svc.cast_vote(&id, "v1", 1).await, Err(PollError::AlreadyVoted)));
    assert!(matches!(
        svc.cast_vote(&id, "v2", 5).await,
        Err(PollError::IndexOutOfRange { .. })
    ));
    assert_eq!(svc.get_poll(&id).await.unwrap().tallies(), vec![1, 0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires TEST_DATABASE_URL"]
async fn concurrent_votes_are_exact() {
    let (svc, store) = pg_service().await;
    let poll = svc.create_poll("Concurrency", ["A", "B"]).await.unwrap();
    let id = poll.id.to_string();

    let mut tasks = JoinSet::new();
    for i in 0..100 {
        let svc = svc.clone();
        let id = id.clone();
        tasks.spawn(async move { svc.cast_vote(&id, &format!("voter-{i}"), 0).await });
    }
    for _ in 0..20 {
        let svc = svc.clone();
        let id = id.clone();
        tasks.spawn(async move { svc.cast_vote(&id, "voter-0", 1).await });
    }

    let mut accepted = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(PollError::AlreadyVoted) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 100);

    let poll = svc.get_poll(&id).await.unwrap();
    assert_eq!(poll.total_votes(), 100);
    assert_eq!(store.ledger_tally(poll.id, 2).await.unwrap(), poll.tallies());
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn reconcile_repairs_unapplied_ledger_rows() {
    let (svc, store) = pg_service().await;
    let poll = svc.create_poll("Drift", ["A", "B", "C"]).await.unwrap();

    store
        .record_vote(poll.id, &VoterId::parse("orphan").unwrap(), 2)
        .await
        .unwrap();
    assert!(svc.verify_poll(poll.id).await.is_err());

    let reconciled = store.reconcile(poll.id).await.unwrap();
    assert!(reconciled.repaired());
    assert_eq!(reconciled.poll.tallies(), vec![0, 0, 1]);
    svc.verify_poll(poll.id).await.unwrap();
}
