use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::ServiceError;
use crate::models::{Gameserver, GameserverStatus, VolumeInfo};

use super::{ContainerDriver, FileEntry, LogChunk, StatsSample};

const READ_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;

struct ContainerState {
    running: bool,
    files: HashMap<String, Vec<u8>>,
    backups: Vec<String>,
}

/// In-memory stand-in for a real container runtime (spec §9: "An
/// in-memory fake with the same surface is the test double"). Lets
/// `GameserverService` and the scheduler be exercised in tests without a
/// Docker daemon.
pub struct FakeDriver {
    containers: Mutex<HashMap<String, ContainerState>>,
    volumes: Mutex<HashMap<String, VolumeInfo>>,
    next_id: AtomicU64,
    backup_clock_offset: AtomicU64,
}

impl Default for FakeDriver {
    fn default() -> Self {
        FakeDriver {
            containers: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            backup_clock_offset: AtomicU64::new(0),
        }
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContainerDriver for FakeDriver {
    async fn create_container(&self, gs: &mut Gameserver, namespace: &str) -> Result<(), ServiceError> {
        if gs.port_mappings.iter().any(|m| m.host_port == 0) {
            return Err(ServiceError::BadRequest(
                "every port mapping must have a host_port assigned before container creation"
                    .to_string(),
            ));
        }

        let volume_name = gs.data_volume_name(namespace);
        self.volumes.lock().unwrap().entry(volume_name.clone()).or_insert(VolumeInfo {
            name: volume_name,
            mountpoint: "/var/lib/fake-driver/volumes".to_string(),
        });

        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().unwrap().insert(
            id.clone(),
            ContainerState {
                running: false,
                files: HashMap::new(),
                backups: Vec::new(),
            },
        );
        gs.container_id = id;
        Ok(())
    }

    async fn start_container(&self, container_id: &str) -> Result<(), ServiceError> {
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        state.running = true;
        Ok(())
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), ServiceError> {
        self.containers.lock().unwrap().remove(container_id);
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), ServiceError> {
        self.containers.lock().unwrap().remove(container_id);
        Ok(())
    }

    async fn get_container_status(&self, container_id: &str) -> Result<GameserverStatus, ServiceError> {
        let containers = self.containers.lock().unwrap();
        match containers.get(container_id) {
            Some(state) if state.running => Ok(GameserverStatus::Running),
            Some(_) => Ok(GameserverStatus::Stopped),
            None => Err(ServiceError::RuntimeOp("unknown container".to_string())),
        }
    }

    async fn stream_container_logs(
        &self,
        _container_id: &str,
    ) -> Result<BoxStream<'static, Result<LogChunk, ServiceError>>, ServiceError> {
        let lines: Vec<Result<LogChunk, ServiceError>> = vec![
            Ok(b"[server] starting up\n".to_vec()),
            Ok(b"[server] ready for connections\n".to_vec()),
        ];
        Ok(stream::iter(lines).boxed())
    }

    async fn stream_container_stats(
        &self,
        _container_id: &str,
    ) -> Result<BoxStream<'static, Result<StatsSample, ServiceError>>, ServiceError> {
        let samples: Vec<Result<StatsSample, ServiceError>> = vec![Ok(StatsSample {
            cpu_percent: 12.5,
            memory_usage_bytes: 256 * 1024 * 1024,
            memory_limit_bytes: 1024 * 1024 * 1024,
        })];
        Ok(stream::iter(samples).boxed())
    }

    async fn send_command(&self, container_id: &str, _cmd: &str) -> Result<(), ServiceError> {
        if !self.containers.lock().unwrap().contains_key(container_id) {
            return Err(ServiceError::RuntimeOp("unknown container".to_string()));
        }
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<(), ServiceError> {
        self.volumes.lock().unwrap().entry(name.to_string()).or_insert(VolumeInfo {
            name: name.to_string(),
            mountpoint: "/var/lib/fake-driver/volumes".to_string(),
        });
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), ServiceError> {
        self.volumes.lock().unwrap().remove(name);
        Ok(())
    }

    async fn get_volume_info(&self, name: &str) -> Result<Option<VolumeInfo>, ServiceError> {
        Ok(self.volumes.lock().unwrap().get(name).cloned())
    }

    async fn create_backup(&self, container_id: &str, _gs_name: &str) -> Result<String, ServiceError> {
        let offset = self.backup_clock_offset.fetch_add(1, Ordering::SeqCst);
        let ts = Utc::now() + ChronoDuration::seconds(offset as i64);
        let filename = format!("backup-{}.tar.gz", ts.format("%Y-%m-%d_%H-%M-%S"));

        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        state.backups.push(filename.clone());
        Ok(filename)
    }

    async fn restore_backup(&self, container_id: &str, filename: &str) -> Result<(), ServiceError> {
        let containers = self.containers.lock().unwrap();
        let state = containers
            .get(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        if !state.backups.contains(&filename.to_string()) {
            return Err(ServiceError::NotFound(format!("backup {filename} not found")));
        }
        Ok(())
    }

    async fn cleanup_old_backups(&self, container_id: &str, max: u32) -> Result<(), ServiceError> {
        if max == 0 {
            return Ok(());
        }
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        state.backups.sort();
        let max = max as usize;
        if state.backups.len() > max {
            let drop_count = state.backups.len() - max;
            state.backups.drain(0..drop_count);
        }
        Ok(())
    }

    async fn list_files(&self, container_id: &str, path: &str) -> Result<Vec<FileEntry>, ServiceError> {
        if path == super::sandbox::BACKUPS_ROOT {
            let containers = self.containers.lock().unwrap();
            let state = containers
                .get(container_id)
                .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
            return Ok(state
                .backups
                .iter()
                .map(|name| FileEntry {
                    name: name.clone(),
                    path: format!("{}/{}", super::sandbox::BACKUPS_ROOT, name),
                    is_dir: false,
                    size: 0,
                    modified: Utc::now(),
                })
                .collect());
        }

        let containers = self.containers.lock().unwrap();
        let state = containers
            .get(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(state
            .files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .map(|p| FileEntry {
                name: p.rsplit('/').next().unwrap_or(p).to_string(),
                path: p.clone(),
                is_dir: false,
                size: state.files[p].len() as u64,
                modified: Utc::now(),
            })
            .collect())
    }

    async fn read_file(&self, container_id: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        let containers = self.containers.lock().unwrap();
        let state = containers
            .get(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        let content = state
            .files
            .get(path)
            .ok_or_else(|| ServiceError::NotFound(format!("file {path} not found")))?;
        if content.len() as u64 > READ_FILE_MAX_BYTES {
            return Err(ServiceError::BadRequest(format!(
                "file {path} exceeds the 10MiB read limit"
            )));
        }
        Ok(content.clone())
    }

    async fn write_file(&self, container_id: &str, path: &str, content: Vec<u8>) -> Result<(), ServiceError> {
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        state.files.insert(path.to_string(), content);
        Ok(())
    }

    async fn create_directory(&self, container_id: &str, path: &str) -> Result<(), ServiceError> {
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        state.files.entry(format!("{path}/.keep")).or_insert_with(Vec::new);
        Ok(())
    }

    async fn delete_path(&self, container_id: &str, path: &str) -> Result<(), ServiceError> {
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        // A nonexistent path is tolerated: deleting server files or a backup
        // archive share this entry point and neither is an error if missing.
        state.files.retain(|p, _| p != path && !p.starts_with(&format!("{path}/")));
        state.backups.retain(|name| format!("{}/{}", super::sandbox::BACKUPS_ROOT, name) != path);
        Ok(())
    }

    async fn rename_file(&self, container_id: &str, from: &str, to: &str) -> Result<(), ServiceError> {
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        if let Some(content) = state.files.remove(from) {
            state.files.insert(to.to_string(), content);
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!("file {from} not found")))
        }
    }

    /// Unlike `read_file`, not subject to the 10MiB edit cap — this fake has
    /// no tar layer to speak of, so "raw tar stream" is simply the stored
    /// bytes back unmodified.
    async fn download_file(&self, container_id: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        let containers = self.containers.lock().unwrap();
        let state = containers
            .get(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("file {path} not found")))
    }

    async fn upload_file(&self, container_id: &str, path: &str, content: Vec<u8>) -> Result<(), ServiceError> {
        let mut containers = self.containers.lock().unwrap();
        let state = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::RuntimeOp("unknown container".to_string()))?;
        state.files.insert(path.to_string(), content);
        Ok(())
    }
}
