//! End-to-end flush: a device queue draining into a live gateway.

use std::sync::Arc;

use opsync_client::{CompletionDraft, Flusher, GatewayClient, GatewayIdentity, OfflineQueue};
use opsync_core::types::CompletionStatus;
use opsync_engine::notify::LogDispatcher;
use opsync_server::{OpsyncServer, ServerConfig};
use opsync_store::connection::{new_file, ConnectionConfig};
use opsync_store::migrations::run_migrations;
use opsync_store::repositories::task::{TaskCreateParams, TaskRepository};

struct Fixture {
    server: OpsyncServer,
    flusher: Flusher,
    _serve: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

async fn start_fixture() -> Fixture {
    start_fixture_with(ServerConfig::default()).await
}

async fn start_fixture_with(config: ServerConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();

    let server_db = dir.path().join("server.db");
    let pool = new_file(server_db.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    let server = OpsyncServer::new(config, pool, Arc::new(LogDispatcher));
    let (addr, serve) = server.listen().await.unwrap();
    let base_url = format!("http://{addr}");

    let client_db = dir.path().join("device.db");
    let client_pool = new_file(client_db.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
    let queue = OfflineQueue::open(client_pool, "dev1").unwrap();
    let gateway = GatewayClient::new(
        base_url,
        GatewayIdentity {
            tenant_id: "t1".into(),
            user_id: "u1".into(),
            role: "staff".into(),
        },
    );

    Fixture { server, flusher: Flusher::new(queue, gateway), _serve: serve, _dir: dir }
}

fn seed_task(fx: &Fixture, title: &str) -> String {
    let conn = fx.server_pool().get().unwrap();
    TaskRepository::create_task(
        &conn,
        &TaskCreateParams { tenant_id: "t1".into(), title: title.into(), ..Default::default() },
    )
    .unwrap()
    .id
}

impl Fixture {
    fn server_pool(&self) -> &opsync_store::ConnectionPool {
        self.server.pool()
    }
}

#[tokio::test]
async fn queue_drains_into_gateway_and_survives_refetch() {
    let fx = start_fixture().await;
    let task_a = seed_task(&fx, "Restock cart");
    let task_b = seed_task(&fx, "Wipe counters");

    let queue = fx.flusher.queue();
    let _ = queue
        .capture(&CompletionDraft { task_id: task_a.clone(), ..Default::default() })
        .unwrap();
    let _ = queue
        .capture(&CompletionDraft {
            task_id: task_b.clone(),
            status: CompletionStatus::Problem,
            notes: Some("Dispenser jammed".into()),
            problem_reason: Some("equipment".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(queue.pending_count().unwrap(), 2);

    let report = fx.flusher.flush().await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(report.rejected, 0);
    assert!(!report.fallback_used);
    assert_eq!(queue.pending_count().unwrap(), 0);

    // Server side landed both: tasks completed, problem spawned.
    let conn = fx.server_pool().get().unwrap();
    let done = TaskRepository::get_task(&conn, "t1", &task_a).unwrap().unwrap();
    assert_eq!(done.status, opsync_core::types::TaskStatus::Completed);
    let open: i64 = conn
        .query_row("SELECT COUNT(*) FROM problems WHERE tenant_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(open, 1);

    // Nothing pending: a second flush is a no-op.
    let report = fx.flusher.flush().await.unwrap();
    assert_eq!(report, opsync_client::FlushReport::default());

    fx.server.shutdown().shutdown();
}

#[tokio::test]
async fn rejected_item_stays_queued_with_retry_counter() {
    let fx = start_fixture().await;
    let good = seed_task(&fx, "Sweep entrance");

    let queue = fx.flusher.queue();
    let _ = queue
        .capture(&CompletionDraft { task_id: good, ..Default::default() })
        .unwrap();
    let _ = queue
        .capture(&CompletionDraft { task_id: "task-deleted-elsewhere".into(), ..Default::default() })
        .unwrap();

    let report = fx.flusher.flush().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.rejected, 1);

    let leftover = queue.pending(10).unwrap();
    assert_eq!(leftover.len(), 1);
    assert_eq!(leftover[0].completion.task_id, "task-deleted-elsewhere");
    assert_eq!(leftover[0].retry_count, 1);
    assert!(leftover[0].last_error.is_some());

    fx.server.shutdown().shutdown();
}

#[tokio::test]
async fn resubmitting_after_a_lost_response_dedupes() {
    let fx = start_fixture().await;
    let task = seed_task(&fx, "Check extinguishers");

    let queue = fx.flusher.queue();
    let captured = queue
        .capture(&CompletionDraft { task_id: task, ..Default::default() })
        .unwrap();

    // First push lands; pretend the device crashed before recording the
    // ack, so the row is still pending locally.
    let report = fx.flusher.flush().await.unwrap();
    assert_eq!(report.synced, 1);
    {
        let conn = queue_pool(queue).get().unwrap();
        let _ = conn
            .execute(
                "UPDATE outbox SET state = 'pending', synced_at = NULL WHERE offline_id = ?1",
                [&captured.offline_id],
            )
            .unwrap();
    }

    // The retry is acknowledged as a duplicate and settles the same way.
    let report = fx.flusher.flush().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(queue.pending_count().unwrap(), 0);

    // Only one ledger row exists server-side.
    let conn = fx.server_pool().get().unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM completions WHERE tenant_id = 't1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);

    fx.server.shutdown().shutdown();
}

#[tokio::test]
async fn fallback_drains_when_batch_endpoint_is_unreachable() {
    // Point the flusher at a dead port: the batch push fails with a
    // transport error, the fallback also cannot connect, and everything
    // stays queued for the next attempt.
    let dir = tempfile::tempdir().unwrap();
    let client_db = dir.path().join("device.db");
    let pool = new_file(client_db.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
    let queue = OfflineQueue::open(pool, "dev1").unwrap();
    let gateway = GatewayClient::new(
        "http://127.0.0.1:1",
        GatewayIdentity { tenant_id: "t1".into(), user_id: "u1".into(), role: "staff".into() },
    );
    let flusher = Flusher::new(queue, gateway);

    let _ = flusher
        .queue()
        .capture(&CompletionDraft { task_id: "task-1".into(), ..Default::default() })
        .unwrap();

    let report = flusher.flush().await.unwrap();
    assert!(report.fallback_used);
    assert_eq!(report.synced, 0);
    assert_eq!(flusher.queue().pending_count().unwrap(), 1);
}

#[tokio::test]
async fn oversized_batch_falls_back_to_single_pushes() {
    // A gateway with a tight body limit rejects the combined batch with
    // 413, but each item on its own fits. The fallback drains them all
    // rather than leaving the backlog wedged.
    let fx = start_fixture_with(ServerConfig { max_body_bytes: 700, ..ServerConfig::default() })
        .await;
    let queue = fx.flusher.queue();
    for title in ["Restock cart", "Wipe counters", "Sweep entrance"] {
        let task = seed_task(&fx, title);
        let _ = queue
            .capture(&CompletionDraft {
                task_id: task,
                notes: Some("x".repeat(200)),
                ..Default::default()
            })
            .unwrap();
    }

    let report = fx.flusher.flush().await.unwrap();
    assert!(report.fallback_used);
    assert_eq!(report.synced, 3);
    assert_eq!(report.rejected, 0);
    assert_eq!(queue.pending_count().unwrap(), 0);

    fx.server.shutdown().shutdown();
}

fn queue_pool(queue: &OfflineQueue) -> &opsync_store::ConnectionPool {
    queue.pool()
}
