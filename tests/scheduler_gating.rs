use std::sync::Arc;

use chrono::Utc;
use gsctl::driver::FakeDriver;
use gsctl::models::{ConfigVar, Game, Gameserver, GameserverStatus, PortMapping, Protocol, ScheduledTask, TaskType};
use gsctl::scheduler::{calculate_next_run, CronExpr, Scheduler};
use gsctl::service::GameserverService;
use gsctl::store::Store;

fn seeded_service() -> (Arc<Store>, Arc<GameserverService>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let driver = Arc::new(FakeDriver::new());
    let service = Arc::new(GameserverService::new(store.clone(), driver, "gsctl".to_string()));
    (store, service)
}

fn minimal_game(store: &Store) {
    store
        .create_game(Game {
            id: "g".to_string(),
            name: "g".to_string(),
            image: "g:latest".to_string(),
            min_memory_mb: 512,
            rec_memory_mb: 1024,
            port_mappings: vec![PortMapping {
                name: "game".to_string(),
                protocol: Protocol::Tcp,
                container_port: 30000,
                host_port: 0,
            }],
            config_vars: vec![ConfigVar {
                name: "X".to_string(),
                display_name: "X".to_string(),
                required: false,
                default: None,
                description: "".to_string(),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .unwrap();
}

/// S6 — a scheduled restart on a stopped server is a no-op; once started, a
/// later tick past next_run does restart it (container id changes). Drives
/// the real `Scheduler::tick`, not a hand-rolled restatement of its gate,
/// so the hydrate-before-gating fix is actually exercised.
#[tokio::test]
async fn s6_scheduled_restart_gating_via_real_tick() {
    let (store, service) = seeded_service();
    minimal_game(&store);

    let gs = Gameserver::new("restart-target".to_string(), "g".to_string(), 1024, vec![]);
    let gs = service.create_gameserver(gs).await.unwrap();

    let mut task = ScheduledTask::new(
        gs.id.clone(),
        "every minute".to_string(),
        TaskType::Restart,
        "* * * * *".to_string(),
    );
    task.next_run = Some(Utc::now() - chrono::Duration::minutes(1));
    let task = store.create_scheduled_task(task).unwrap();

    let scheduler = Scheduler::new(service.clone());

    // Tick while stopped: the restart must be gated out, not just logged —
    // no container is created and the gameserver stays stopped.
    scheduler.tick().await;
    let still_stopped = service.get_gameserver(&gs.id).await.unwrap();
    assert_eq!(still_stopped.status, GameserverStatus::Stopped);
    assert_eq!(still_stopped.container_id, "");

    let started = service.start_gameserver(&gs.id).await.unwrap();
    let first_container_id = started.container_id.clone();
    assert_eq!(started.status, GameserverStatus::Starting);

    // Force the task due again (the first tick already advanced next_run
    // into the future since a gated-out restart still counts as success).
    let mut due_again = store.get_scheduled_task(&task.id).unwrap();
    due_again.next_run = Some(Utc::now() - chrono::Duration::minutes(1));
    store.update_scheduled_task(due_again).unwrap();

    // This tick must hydrate the gameserver (reconciling `Starting` ->
    // `Running` against the fake driver) before gating, otherwise the
    // restart stays permanently skipped.
    scheduler.tick().await;
    let restarted = service.get_gameserver(&gs.id).await.unwrap();
    assert_ne!(restarted.container_id, first_container_id);
    assert_ne!(restarted.container_id, "");
}

/// S2 — port reservation stability: ports assigned at creation survive a
/// store reopen against the same file.
#[test]
fn s2_port_reservation_stable_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("gsctl.db");
    let db_path_str = db_path.to_str().unwrap().to_string();

    let assigned_port = {
        let store = Store::open(&db_path_str).unwrap();
        minimal_game(&store);
        let mut gs = Gameserver::new("stable1".to_string(), "g".to_string(), 1024, vec![]);
        gs.port_mappings = vec![PortMapping {
            name: "game".to_string(),
            protocol: Protocol::Tcp,
            container_port: 30000,
            host_port: 30000,
        }];
        let gs = store.create_gameserver(gs).unwrap();
        gs.port_mappings[0].host_port
    };

    let reopened = Store::open(&db_path_str).unwrap();
    let reloaded = reopened
        .list_gameservers()
        .unwrap()
        .into_iter()
        .find(|gs| gs.name == "stable1")
        .unwrap();
    assert_eq!(reloaded.port_mappings[0].host_port, assigned_port);
}

#[test]
fn s4_cron_vectors_hold() {
    use chrono::TimeZone;
    let expr = CronExpr::parse("*/15 * * * *").unwrap();
    let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 7, 0).unwrap();
    assert_eq!(
        calculate_next_run(&expr, &from),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 15, 0).unwrap())
    );
}
