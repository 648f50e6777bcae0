use std::sync::Arc;

use gsctl::driver::FakeDriver;
use gsctl::models::{ConfigVar, Game, Gameserver, GameserverStatus, PortMapping, Protocol, TaskType};
use gsctl::service::GameserverService;
use gsctl::store::Store;

fn seeded_service() -> (Arc<Store>, GameserverService) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let driver = Arc::new(FakeDriver::new());
    let service = GameserverService::new(store.clone(), driver, "gsctl".to_string());
    (store, service)
}

fn no_config_var_game(store: &Store, id: &str, container_port: u16) -> Game {
    let game = Game {
        id: id.to_string(),
        name: id.to_string(),
        image: format!("{id}:latest"),
        min_memory_mb: 512,
        rec_memory_mb: 1024,
        port_mappings: vec![PortMapping {
            name: "game".to_string(),
            protocol: Protocol::Tcp,
            container_port,
            host_port: 0,
        }],
        config_vars: vec![ConfigVar {
            name: "EULA".to_string(),
            display_name: "EULA".to_string(),
            required: false,
            default: Some("false".to_string()),
            description: "".to_string(),
        }],
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.create_game(game.clone()).unwrap();
    game
}

// S1 — Create -> Start -> Stop -> Delete.
#[tokio::test]
async fn s1_create_start_stop_delete() {
    let (store, service) = seeded_service();
    no_config_var_game(&store, "minecraft-like", 25565);

    let gs = Gameserver::new(
        "mc1".to_string(),
        "minecraft-like".to_string(),
        1024,
        vec!["EULA=true".to_string()],
    );
    let created = service.create_gameserver(gs).await.unwrap();
    assert_eq!(created.status, GameserverStatus::Stopped);
    assert_eq!(created.container_id, "");
    assert_eq!(created.port_mappings.len(), 1);
    assert!(created.port_mappings[0].host_port >= 25565);

    let started = service.start_gameserver(&created.id).await.unwrap();
    assert_eq!(started.status, GameserverStatus::Starting);
    assert_ne!(started.container_id, "");

    let stopped = service.stop_gameserver(&created.id).await.unwrap();
    assert_eq!(stopped.status, GameserverStatus::Stopped);
    assert_eq!(stopped.container_id, "");

    service.delete_gameserver(&created.id).await.unwrap();
    assert!(service.get_gameserver(&created.id).await.is_err());
}

// S3 — Allocator collision: two servers of the same Game get sequential ports.
#[tokio::test]
async fn s3_allocator_collision_gets_next_free_port() {
    let (store, service) = seeded_service();
    no_config_var_game(&store, "valheim-like", 2456);

    let gs1 = Gameserver::new("v1".to_string(), "valheim-like".to_string(), 2048, vec![]);
    let gs1 = service.create_gameserver(gs1).await.unwrap();

    let gs2 = Gameserver::new("v2".to_string(), "valheim-like".to_string(), 2048, vec![]);
    let gs2 = service.create_gameserver(gs2).await.unwrap();

    let mut ports = [gs1.port_mappings[0].host_port, gs2.port_mappings[0].host_port];
    ports.sort();
    assert_eq!(ports, [2456, 2457]);
}

// Invariant 3 — every returned Gameserver has as many port mappings as its Game template.
#[tokio::test]
async fn invariant3_port_mapping_count_matches_game_template() {
    let (store, service) = seeded_service();
    let game = Game {
        id: "multi-port".to_string(),
        name: "multi-port".to_string(),
        image: "multi:latest".to_string(),
        min_memory_mb: 512,
        rec_memory_mb: 1024,
        port_mappings: vec![
            PortMapping {
                name: "game".to_string(),
                protocol: Protocol::Udp,
                container_port: 7777,
                host_port: 0,
            },
            PortMapping {
                name: "query".to_string(),
                protocol: Protocol::Udp,
                container_port: 27015,
                host_port: 0,
            },
        ],
        config_vars: vec![],
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.create_game(game.clone()).unwrap();

    let gs = Gameserver::new("mp1".to_string(), "multi-port".to_string(), 2048, vec![]);
    let created = service.create_gameserver(gs).await.unwrap();
    assert_eq!(created.port_mappings.len(), game.port_mappings.len());
}

// Invariant 4 — deleting a Gameserver cascades away its scheduled tasks.
#[tokio::test]
async fn invariant4_delete_cascades_scheduled_tasks() {
    let (store, service) = seeded_service();
    no_config_var_game(&store, "cascade-game", 25565);

    let gs = Gameserver::new("cascade1".to_string(), "cascade-game".to_string(), 1024, vec![]);
    let created = service.create_gameserver(gs).await.unwrap();

    // Creation already scheduled a default backup task; add a second one.
    let extra = gsctl::models::ScheduledTask::new(
        created.id.clone(),
        "Nightly restart".to_string(),
        TaskType::Restart,
        "0 3 * * *".to_string(),
    );
    store.create_scheduled_task(extra).unwrap();
    assert_eq!(store.list_scheduled_tasks_for_gameserver(&created.id).unwrap().len(), 2);

    service.delete_gameserver(&created.id).await.unwrap();
    assert_eq!(store.list_scheduled_tasks_for_gameserver(&created.id).unwrap().len(), 0);
}

// S7 — Path sandbox: every file-manager entry point rejects an escape attempt.
#[tokio::test]
async fn s7_path_sandbox_rejects_escapes() {
    let (store, service) = seeded_service();
    no_config_var_game(&store, "sandboxed-game", 25565);

    let gs = Gameserver::new("sb1".to_string(), "sandboxed-game".to_string(), 1024, vec![]);
    let created = service.create_gameserver(gs).await.unwrap();
    service.start_gameserver(&created.id).await.unwrap();

    assert!(service.write_file(&created.id, "/etc/passwd", b"x".to_vec()).await.is_err());
    assert!(service
        .read_file(&created.id, "/data/server/../../etc/passwd")
        .await
        .is_err());
    assert!(service.list_files(&created.id, "/data/server-evil").await.is_err());
    assert!(service.delete_path(&created.id, "/data/server").await.is_err());
}

// S5 — Backup retention: five backups with max_backups=3 leaves exactly three.
#[tokio::test]
async fn s5_backup_retention_keeps_only_max_backups() {
    let (store, service) = seeded_service();
    no_config_var_game(&store, "backup-game", 25565);

    let mut gs = Gameserver::new("bk1".to_string(), "backup-game".to_string(), 1024, vec![]);
    gs.max_backups = 3;
    let created = service.create_gameserver(gs).await.unwrap();
    service.start_gameserver(&created.id).await.unwrap();

    for _ in 0..5 {
        service.create_gameserver_backup(&created.id).await.unwrap();
    }

    let backups = service.list_gameserver_backups(&created.id).await.unwrap();
    assert_eq!(backups.len(), 3);
}
