//! Gameserver Service — the lifecycle orchestrator (spec §4.4). Owns the
//! public contract the HTTP layer and the scheduler both call through;
//! neither ever touches the Store or a `ContainerDriver` directly.

use std::sync::Arc;

use chrono::Utc;

use crate::driver::{ContainerDriver, FileEntry, LogChunk, StatsSample};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Gameserver, GameserverStatus, ScheduledTask, TaskType};
use crate::driver::sandbox::SandboxScope;
use crate::store::Store;

pub struct GameserverService {
    store: Arc<Store>,
    driver: Arc<dyn ContainerDriver>,
    namespace: String,
    /// Guards the allocate-then-persist sequence in `create_gameserver`
    /// and `update_gameserver` (spec §5's resolved Open Question: the
    /// used-ports snapshot and the row it is about to be assigned to must
    /// not interleave with a concurrent create/update).
    alloc_guard: tokio::sync::Mutex<()>,
}

impl GameserverService {
    pub fn new(store: Arc<Store>, driver: Arc<dyn ContainerDriver>, namespace: String) -> Self {
        GameserverService {
            store,
            driver,
            namespace,
            alloc_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Populates the fields derived from the owning Game and the live
    /// container state, persisting only if the reconciled status differs
    /// from what was loaded (spec §4.4's definition of "hydrate").
    async fn hydrate(&self, mut gs: Gameserver) -> ServiceResult<Gameserver> {
        let game = self.store.get_game(&gs.game_id)?;
        gs.game_type = game.name.clone();
        gs.image = game.image.clone();
        gs.memory_gb = gs.memory_mb as f64 / 1024.0;
        gs.volume_info = self.driver.get_volume_info(&gs.data_volume_name(&self.namespace)).await?;

        if !gs.container_id.is_empty() {
            let observed = self
                .driver
                .get_container_status(&gs.container_id)
                .await
                .unwrap_or(GameserverStatus::Stopped);
            if observed != gs.status {
                gs.status = observed;
                gs = self.store.update_gameserver(gs)?;
            }
        }

        Ok(gs)
    }

    pub async fn get_gameserver(&self, id: &str) -> ServiceResult<Gameserver> {
        let gs = self.store.get_gameserver(id)?;
        self.hydrate(gs).await
    }

    pub async fn list_gameservers(&self) -> ServiceResult<Vec<Gameserver>> {
        let mut out = Vec::new();
        for gs in self.store.list_gameservers()? {
            out.push(self.hydrate(gs).await?);
        }
        Ok(out)
    }

    /// spec §4.4.1. Validates required config vars, copies default port
    /// mappings, allocates host ports, persists, then best-effort creates
    /// the default daily-backup scheduled task.
    pub async fn create_gameserver(&self, mut gs: Gameserver) -> ServiceResult<Gameserver> {
        let game = self
            .store
            .get_game(&gs.game_id)
            .map_err(|_| ServiceError::NotFound(format!("game '{}' not found", gs.game_id)))?;

        let missing: Vec<&str> = game
            .config_vars
            .iter()
            .filter(|cv| cv.required)
            .filter(|cv| !gs.environment.iter().any(|e| non_empty_var(e, &cv.name)))
            .map(|cv| cv.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::BadRequest(format!(
                "missing required config vars: {}",
                missing.join(", ")
            )));
        }

        if gs.port_mappings.is_empty() {
            gs.port_mappings = game.port_mappings.clone();
        }

        gs.status = GameserverStatus::Stopped;
        gs.container_id = String::new();
        let now = Utc::now();
        gs.created_at = now;
        gs.updated_at = now;

        let _guard = self.alloc_guard.lock().await;
        let existing = self.store.list_gameservers()?;
        let used = crate::allocator::collect_used_ports(&existing, None);
        crate::allocator::allocate_ports_for_server(&mut gs, &used)?;

        let gs = self.store.create_gameserver(gs)?;
        drop(_guard);

        let task = ScheduledTask::new(
            gs.id.clone(),
            "Daily Backup".to_string(),
            TaskType::Backup,
            "0 2 * * *".to_string(),
        );
        if let Err(err) = self.store.create_scheduled_task(task) {
            tracing::warn!(
                "failed to create default backup schedule for gameserver {}: {err}",
                gs.id
            );
        }

        self.hydrate(gs).await
    }

    /// spec §4.4.2. Preserves `created_at`/`container_id`/`status` from
    /// the prior record and re-runs port allocation under the same guard
    /// create uses.
    pub async fn update_gameserver(&self, id: &str, mut gs: Gameserver) -> ServiceResult<Gameserver> {
        let prior = self.store.get_gameserver(id)?;
        gs.id = prior.id.clone();
        gs.created_at = prior.created_at;
        gs.container_id = prior.container_id.clone();
        gs.status = prior.status;
        gs.updated_at = Utc::now();

        let _guard = self.alloc_guard.lock().await;
        let existing = self.store.list_gameservers()?;
        let used = crate::allocator::collect_used_ports(&existing, Some(id));
        crate::allocator::allocate_ports_for_server(&mut gs, &used)?;

        let gs = self.store.update_gameserver(gs)?;
        drop(_guard);
        self.hydrate(gs).await
    }

    /// spec §4.4.3. `CreateContainer` writes back `container_id`; on
    /// driver failure the gameserver row is left untouched (no container
    /// id was ever persisted, so there is nothing to roll back).
    pub async fn start_gameserver(&self, id: &str) -> ServiceResult<Gameserver> {
        let mut gs = self.store.get_gameserver(id)?;
        gs = self.hydrate(gs).await?;

        self.driver.create_container(&mut gs, &self.namespace).await?;
        self.driver.start_container(&gs.container_id).await?;

        gs.status = GameserverStatus::Starting;
        let gs = self.store.update_gameserver(gs)?;
        Ok(gs)
    }

    /// spec §4.4.4. `RemoveContainer` both stops and deletes; an unknown
    /// container (already gone) is non-fatal here.
    pub async fn stop_gameserver(&self, id: &str) -> ServiceResult<Gameserver> {
        let mut gs = self.store.get_gameserver(id)?;

        if !gs.container_id.is_empty() {
            if let Err(err) = self.driver.remove_container(&gs.container_id).await {
                tracing::info!(
                    "stop_gameserver: container {} already gone for {}: {err}",
                    gs.container_id,
                    gs.id
                );
            }
        }

        gs.container_id = String::new();
        gs.status = GameserverStatus::Stopped;
        let gs = self.store.update_gameserver(gs)?;
        Ok(gs)
    }

    /// spec §4.4.5. Callers driving a *scheduled* restart must first check
    /// the gameserver is `running` (a scheduled restart of a stopped
    /// server is a no-op) — the scheduler does this check itself before
    /// calling in; an interactive restart request always proceeds.
    pub async fn restart_gameserver(&self, id: &str) -> ServiceResult<Gameserver> {
        self.stop_gameserver(id).await?;
        self.start_gameserver(id).await
    }

    /// spec §4.4.6. Best-effort container and volume removal; deleting
    /// the row cascades to the gameserver's scheduled tasks.
    pub async fn delete_gameserver(&self, id: &str) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;

        if !gs.container_id.is_empty() {
            if let Err(err) = self.driver.remove_container(&gs.container_id).await {
                tracing::info!("delete_gameserver: container removal failed for {id}: {err}");
            }
        }

        let volume_name = gs.data_volume_name(&self.namespace);
        if let Err(err) = self.driver.remove_volume(&volume_name).await {
            tracing::info!("delete_gameserver: volume removal failed for {id}: {err}");
        }

        self.store.delete_gameserver(id)?;
        Ok(())
    }

    /// spec §4.4.7. Cleanup failure does not fail the backup itself.
    pub async fn create_gameserver_backup(&self, id: &str) -> ServiceResult<String> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;

        let filename = self.driver.create_backup(&gs.container_id, &gs.name).await?;

        if let Err(err) = self.driver.cleanup_old_backups(&gs.container_id, gs.max_backups).await {
            tracing::warn!("backup cleanup failed for gameserver {id}: {err}");
        }

        Ok(filename)
    }

    pub async fn restore_gameserver_backup(&self, id: &str, filename: &str) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        self.driver.restore_backup(&gs.container_id, filename).await
    }

    /// Sorted by modification time descending, ties broken by name, both
    /// parsed from the `backup-<timestamp>.tar.gz` filename convention.
    pub async fn list_gameserver_backups(&self, id: &str) -> ServiceResult<Vec<FileEntry>> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;

        let mut entries: Vec<FileEntry> = self
            .driver
            .list_files(&gs.container_id, crate::driver::sandbox::BACKUPS_ROOT)
            .await?
            .into_iter()
            .filter(|f| f.name.ends_with(".tar.gz"))
            .collect();

        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    pub async fn stream_gameserver_logs(
        &self,
        id: &str,
    ) -> ServiceResult<futures::stream::BoxStream<'static, ServiceResult<LogChunk>>> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        self.driver.stream_container_logs(&gs.container_id).await
    }

    pub async fn stream_gameserver_stats(
        &self,
        id: &str,
    ) -> ServiceResult<futures::stream::BoxStream<'static, ServiceResult<StatsSample>>> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        self.driver.stream_container_stats(&gs.container_id).await
    }

    pub async fn send_command(&self, id: &str, cmd: &str) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        self.driver.send_command(&gs.container_id, cmd).await
    }

    // --- File manager: thin pass-through to the driver, all paths are
    // validated against the sandbox before reaching it (spec §4.4.9). ---

    pub async fn list_files(&self, id: &str, path: &str) -> ServiceResult<Vec<FileEntry>> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let path = validate(path, SandboxScope::ServerAndBackups)?;
        self.driver.list_files(&gs.container_id, &path).await
    }

    pub async fn read_file(&self, id: &str, path: &str) -> ServiceResult<Vec<u8>> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let path = validate(path, SandboxScope::ServerAndBackups)?;
        self.driver.read_file(&gs.container_id, &path).await
    }

    pub async fn write_file(&self, id: &str, path: &str, content: Vec<u8>) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let path = validate(path, SandboxScope::ServerOnly)?;
        self.driver.write_file(&gs.container_id, &path, content).await
    }

    pub async fn create_directory(&self, id: &str, path: &str) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let path = validate(path, SandboxScope::ServerOnly)?;
        self.driver.create_directory(&gs.container_id, &path).await
    }

    pub async fn delete_path(&self, id: &str, path: &str) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let path = validate(path, SandboxScope::ServerAndBackups)?;
        crate::driver::sandbox::validate_deletable(&path).map_err(ServiceError::BadRequest)?;
        self.driver.delete_path(&gs.container_id, &path).await
    }

    pub async fn rename_file(&self, id: &str, from: &str, to: &str) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let from = validate(from, SandboxScope::ServerOnly)?;
        let to = validate(to, SandboxScope::ServerOnly)?;
        self.driver.rename_file(&gs.container_id, &from, &to).await
    }

    /// Raw tar stream of `path`, distinct from `read_file` (spec §4.2):
    /// no extraction, no 10MiB cap. Allowed under `/data/backups` too, same
    /// as list/delete.
    pub async fn download_file(&self, id: &str, path: &str) -> ServiceResult<Vec<u8>> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let path = validate(path, SandboxScope::ServerAndBackups)?;
        self.driver.download_file(&gs.container_id, &path).await
    }

    /// Tar-wrapped copy-in distinct from `write_file`: the upload path is
    /// bounded by the upload-size limit at the HTTP layer, not the smaller
    /// file-editor cap.
    pub async fn upload_file(&self, id: &str, path: &str, content: Vec<u8>) -> ServiceResult<()> {
        let gs = self.store.get_gameserver(id)?;
        require_container(&gs)?;
        let path = validate(path, SandboxScope::ServerOnly)?;
        self.driver.upload_file(&gs.container_id, &path, content).await
    }
}

fn require_container(gs: &Gameserver) -> ServiceResult<()> {
    if gs.container_id.is_empty() {
        return Err(ServiceError::BadRequest(format!(
            "gameserver '{}' has no running container",
            gs.name
        )));
    }
    Ok(())
}

fn validate(path: &str, scope: SandboxScope) -> ServiceResult<String> {
    crate::driver::sandbox::validate_path(path, scope).map_err(ServiceError::BadRequest)
}

fn non_empty_var(entry: &str, name: &str) -> bool {
    match entry.split_once('=') {
        Some((key, value)) => key == name && !value.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FakeDriver;
    use crate::models::{ConfigVar, Game, PortMapping, Protocol};
    use crate::store::Store;

    fn service_with_game() -> (Arc<Store>, GameserverService, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let driver = Arc::new(FakeDriver::new());
        let game = Game {
            id: "custom".to_string(),
            name: "Custom".to_string(),
            image: "custom:latest".to_string(),
            min_memory_mb: 512,
            rec_memory_mb: 1024,
            port_mappings: vec![PortMapping {
                name: "game".to_string(),
                protocol: Protocol::Tcp,
                container_port: 7777,
                host_port: 0,
            }],
            config_vars: vec![ConfigVar {
                name: "SERVER_NAME".to_string(),
                display_name: "Server Name".to_string(),
                required: true,
                default: None,
                description: "".to_string(),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_game(game).unwrap();
        let service = GameserverService::new(store.clone(), driver, "gsctl".to_string());
        (store, service, "custom".to_string())
    }

    #[tokio::test]
    async fn create_rejects_missing_required_config_var() {
        let (_store, service, game_id) = service_with_game();
        let gs = Gameserver::new("s1".to_string(), game_id, 1024, vec![]);
        let err = service.create_gameserver(gs).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn create_allocates_ports_and_schedules_default_backup() {
        let (store, service, game_id) = service_with_game();
        let gs = Gameserver::new(
            "s1".to_string(),
            game_id,
            1024,
            vec!["SERVER_NAME=hello".to_string()],
        );
        let gs = service.create_gameserver(gs).await.unwrap();
        assert_eq!(gs.port_mappings[0].host_port, 7777);

        let tasks = store.list_scheduled_tasks_for_gameserver(&gs.id).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_type, TaskType::Backup);
    }

    #[tokio::test]
    async fn second_server_same_game_gets_a_different_port() {
        let (_store, service, game_id) = service_with_game();
        let gs1 = Gameserver::new(
            "s1".to_string(),
            game_id.clone(),
            1024,
            vec!["SERVER_NAME=a".to_string()],
        );
        let gs1 = service.create_gameserver(gs1).await.unwrap();

        let gs2 = Gameserver::new("s2".to_string(), game_id, 1024, vec!["SERVER_NAME=b".to_string()]);
        let gs2 = service.create_gameserver(gs2).await.unwrap();

        assert_ne!(gs1.port_mappings[0].host_port, gs2.port_mappings[0].host_port);
    }

    #[tokio::test]
    async fn start_stop_delete_round_trip() {
        let (store, service, game_id) = service_with_game();
        let gs = Gameserver::new(
            "s1".to_string(),
            game_id,
            1024,
            vec!["SERVER_NAME=hello".to_string()],
        );
        let gs = service.create_gameserver(gs).await.unwrap();

        let started = service.start_gameserver(&gs.id).await.unwrap();
        assert!(!started.container_id.is_empty());
        assert_eq!(started.status, GameserverStatus::Starting);

        let stopped = service.stop_gameserver(&gs.id).await.unwrap();
        assert!(stopped.container_id.is_empty());
        assert_eq!(stopped.status, GameserverStatus::Stopped);

        service.delete_gameserver(&gs.id).await.unwrap();
        assert!(store.get_gameserver(&gs.id).is_err());
    }

    #[tokio::test]
    async fn file_manager_rejects_paths_outside_sandbox() {
        let (_store, service, game_id) = service_with_game();
        let gs = Gameserver::new(
            "s1".to_string(),
            game_id,
            1024,
            vec!["SERVER_NAME=hello".to_string()],
        );
        let gs = service.create_gameserver(gs).await.unwrap();
        service.start_gameserver(&gs.id).await.unwrap();

        let err = service
            .write_file(&gs.id, "/etc/passwd", b"pwned".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }
}
