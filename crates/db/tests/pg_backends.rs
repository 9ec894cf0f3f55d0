//! PostgreSQL queue and result store tests.
//!
//! These need a live database (`DATABASE_URL`) and are ignored by default:
//! run with `cargo test -p imgq-db -- --ignored`.

use std::time::Duration;

use imgq_core::generation::GenerateRequest;
use imgq_core::queue::{JobQueue, QueueError, RetryOutcome, RetryPolicy};
use imgq_core::result::result_key;
use imgq_core::store::ResultStore;
use imgq_core::types::ClientId;
use imgq_db::repositories::{JobRepo, ResultRepo};
use imgq_db::{PgJobQueue, PgResultStore};
use sqlx::PgPool;

fn job(client: &str) -> imgq_core::generation::GenerationJob {
    GenerateRequest {
        prompt: "a lighthouse at dusk".into(),
        width: Some(640),
        height: Some(480),
        ..Default::default()
    }
    .into_job(ClientId::from(client))
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn enqueue_then_dequeue_round_trips_payload(pool: PgPool) {
    let queue = PgJobQueue::new(pool);
    let original = job("c1");
    let id = queue
        .enqueue(original.clone(), &RetryPolicy::default())
        .await
        .unwrap();

    let delivery = queue.dequeue().await.unwrap().expect("job should be claimable");
    assert_eq!(delivery.job_id, id);
    assert_eq!(delivery.job, original);
    assert_eq!(delivery.attempt, 1);
    assert_eq!(delivery.max_attempts, 5);

    // Claimed jobs are not handed out twice.
    assert!(queue.dequeue().await.unwrap().is_none());

    queue.ack(&delivery).await.unwrap();
    let depth = queue.depth().await.unwrap();
    assert_eq!((depth.queued, depth.in_flight), (0, 0));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failures_retry_until_cap_then_die(pool: PgPool) {
    let queue = PgJobQueue::new(pool.clone());
    let id = queue
        .enqueue(job("c1"), &RetryPolicy::new(1, Duration::ZERO))
        .await
        .unwrap();

    let delivery = queue.dequeue().await.unwrap().unwrap();
    let first = queue.fail(&delivery, "store down").await.unwrap();
    assert_eq!(
        first,
        RetryOutcome::Retrying {
            next_attempt: 2,
            delay: Duration::ZERO
        }
    );

    let again = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(again.attempt, 2);
    let second = queue.fail(&again, "store still down").await.unwrap();
    assert_eq!(second, RetryOutcome::Exhausted { attempts: 2 });

    let row = JobRepo::find_by_id(&pool, id.0).await.unwrap().unwrap();
    assert_eq!(row.status, "dead");
    assert_eq!(row.last_error.as_deref(), Some("store still down"));
    assert!(matches!(
        queue.ack(&again).await,
        Err(QueueError::NotInFlight(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn superseded_attempt_cannot_settle_the_redelivery(pool: PgPool) {
    let queue = PgJobQueue::with_lease(pool.clone(), Duration::from_millis(1));
    let id = queue
        .enqueue(job("c1"), &RetryPolicy::default())
        .await
        .unwrap();

    let first = queue.dequeue().await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(second.attempt, 2);

    // The first worker finishes late: neither call may touch attempt 2.
    assert!(matches!(
        queue.fail(&first, "slow").await,
        Err(QueueError::NotInFlight(_))
    ));
    assert!(matches!(
        queue.ack(&first).await,
        Err(QueueError::NotInFlight(_))
    ));
    let row = JobRepo::find_by_id(&pool, id.0).await.unwrap().unwrap();
    assert_eq!((row.status.as_str(), row.attempt), ("running", 2));
    assert_eq!(row.last_error, None);

    queue.ack(&second).await.unwrap();
    let row = JobRepo::find_by_id(&pool, id.0).await.unwrap().unwrap();
    assert_eq!(row.status, "completed");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn expired_lease_is_redelivered_then_reaped(pool: PgPool) {
    let queue = PgJobQueue::with_lease(pool.clone(), Duration::from_millis(1));
    let id = queue
        .enqueue(job("c1"), &RetryPolicy::new(1, Duration::ZERO))
        .await
        .unwrap();

    queue.dequeue().await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Worker "crashed": the lease lapsed, so the job comes back as attempt 2.
    let redelivered = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(redelivered.job_id, id);
    assert_eq!(redelivered.attempt, 2);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(queue.dequeue().await.unwrap().is_none());

    let abandoned = queue.reap_abandoned().await.unwrap();
    assert_eq!(abandoned.len(), 1);
    assert_eq!(abandoned[0].client_id, ClientId::from("c1"));
    assert_eq!(abandoned[0].attempts, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn result_store_honours_ttl(pool: PgPool) {
    let store = PgResultStore::new(pool.clone());
    let id = ClientId::from("c1");

    store.put(&id, "first", Duration::from_secs(60)).await.unwrap();
    store.put(&id, r#"{"images":[]}"#, Duration::from_secs(60)).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap().as_deref(), Some(r#"{"images":[]}"#));

    store.put(&id, "short", Duration::from_millis(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.get(&id).await.unwrap(), None);

    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert_eq!(
        ResultRepo::find_live(&pool, &result_key(&id)).await.unwrap(),
        None
    );
}
