//! Property coverage for the file manager (spec §8 invariants 5 and 7):
//! any path escaping the sandbox is rejected by every entry point, and any
//! content at or under the 10 MiB read limit round-trips through
//! `WriteFile`/`ReadFile` unchanged.

use std::sync::Arc;

use gsctl::driver::sandbox::{validate_path, SandboxScope};
use gsctl::driver::FakeDriver;
use gsctl::models::{ConfigVar, Game, Gameserver, PortMapping, Protocol};
use gsctl::service::GameserverService;
use gsctl::store::Store;
use quickcheck_macros::quickcheck;

async fn service_with_running_gameserver() -> (Arc<GameserverService>, String) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let driver = Arc::new(FakeDriver::new());
    let service = Arc::new(GameserverService::new(store.clone(), driver, "gsctl".to_string()));

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
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .unwrap();

    let gs = Gameserver::new("fileserver".to_string(), "g".to_string(), 1024, vec![]);
    let gs = service.create_gameserver(gs).await.unwrap();
    service.start_gameserver(&gs.id).await.unwrap();
    (service, gs.id)
}

// Invariant 7 — WriteFile(p, C); ReadFile(p) == C for content under the
// 10 MiB limit and any path under /data/server.
#[tokio::test]
async fn invariant7_write_then_read_round_trips() {
    let (service, id) = service_with_running_gameserver().await;

    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("/data/server/world/level.dat", b"hello world".to_vec()),
        ("/data/server/config.yml", vec![]),
        ("/data/server/save/player.bin", vec![7u8; 4096]),
    ];

    for (path, content) in cases {
        service.write_file(&id, path, content.clone()).await.unwrap();
        let read_back = service.read_file(&id, path).await.unwrap();
        assert_eq!(read_back, content, "round-trip mismatch for {path}");
    }
}

// Invariant 5 — any path with a `..` component, or one that isn't prefixed
// by an allowed sandbox root, is rejected before it ever reaches the driver.
#[quickcheck]
fn invariant5_dotdot_paths_are_always_rejected(segments: Vec<String>) -> bool {
    let mut path = String::from("/data/server");
    for seg in segments.into_iter().take(20) {
        let seg = seg.replace('/', "_");
        if seg.is_empty() {
            continue;
        }
        path.push('/');
        path.push_str(&seg);
    }
    path.push_str("/../../../etc/passwd");

    validate_path(&path, SandboxScope::ServerAndBackups).is_err()
}

#[quickcheck]
fn invariant5_paths_outside_both_roots_are_rejected(raw: String) -> bool {
    let candidate = format!("/{}", raw.replace("..", "_"));
    if candidate.starts_with("/data/server") || candidate.starts_with("/data/backups") {
        return true; // not the case this property is about
    }
    validate_path(&candidate, SandboxScope::ServerAndBackups).is_err()
}
