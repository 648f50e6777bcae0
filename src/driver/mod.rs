mod bollard_driver;
mod fake;
pub mod sandbox;

pub use bollard_driver::BollardDriver;
pub use fake::FakeDriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;
use crate::models::{Gameserver, GameserverStatus, VolumeInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: chrono::DateTime<chrono::Utc>,
}

/// One CPU/memory sample, already reduced from the two raw Docker stats
/// snapshots a real driver would have to diff (spec §4.4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatsSample {
    pub cpu_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
}

pub type LogChunk = Vec<u8>;

/// Capability set a container runtime adapter must provide (spec §4.2).
/// The production implementation (`BollardDriver`) wraps the Docker Engine
/// API via `bollard`; `FakeDriver` is the in-memory test double spec §9
/// calls for, so `GameserverService` and the scheduler can be exercised
/// without a real Docker daemon.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Idempotently ensures the image exists locally (smart pull, §4.2),
    /// creates the data volume if absent, and creates (but does not
    /// start) the container, writing the new id back into `gs`. Fails if
    /// any port mapping still has `host_port == 0`.
    async fn create_container(&self, gs: &mut Gameserver, namespace: &str) -> ServiceResult<()>;

    async fn start_container(&self, container_id: &str) -> ServiceResult<()>;

    /// Stops then force-removes the container.
    async fn stop_container(&self, container_id: &str) -> ServiceResult<()>;

    /// Removes the container outright (used on `Delete`, where the
    /// container may already be stopped or gone).
    async fn remove_container(&self, container_id: &str) -> ServiceResult<()>;

    async fn get_container_status(&self, container_id: &str) -> ServiceResult<GameserverStatus>;

    async fn stream_container_logs(
        &self,
        container_id: &str,
    ) -> ServiceResult<futures::stream::BoxStream<'static, ServiceResult<LogChunk>>>;

    async fn stream_container_stats(
        &self,
        container_id: &str,
    ) -> ServiceResult<futures::stream::BoxStream<'static, ServiceResult<StatsSample>>>;

    /// Executes `/data/scripts/send-command.sh <cmd>` inside the
    /// container. Fails if the command exits non-zero.
    async fn send_command(&self, container_id: &str, cmd: &str) -> ServiceResult<()>;

    async fn create_volume(&self, name: &str) -> ServiceResult<()>;
    async fn remove_volume(&self, name: &str) -> ServiceResult<()>;
    async fn get_volume_info(&self, name: &str) -> ServiceResult<Option<VolumeInfo>>;

    /// Creates `/data/backups/backup-<UTC timestamp>.tar.gz` from the
    /// contents of `/data/server` and returns the filename.
    async fn create_backup(&self, container_id: &str, gs_name: &str) -> ServiceResult<String>;

    /// Clears `/data/server/*` then extracts `/data/backups/<filename>`
    /// into it. Not transactional: a failure partway leaves the server in
    /// an error state (spec §4.2).
    async fn restore_backup(&self, container_id: &str, filename: &str) -> ServiceResult<()>;

    /// No-op when `max == 0`; otherwise keeps the `max` newest
    /// `*.tar.gz` files under `/data/backups` and deletes the rest.
    async fn cleanup_old_backups(&self, container_id: &str, max: u32) -> ServiceResult<()>;

    async fn list_files(&self, container_id: &str, path: &str) -> ServiceResult<Vec<FileEntry>>;
    async fn read_file(&self, container_id: &str, path: &str) -> ServiceResult<Vec<u8>>;
    async fn write_file(&self, container_id: &str, path: &str, content: Vec<u8>) -> ServiceResult<()>;
    async fn create_directory(&self, container_id: &str, path: &str) -> ServiceResult<()>;
    async fn delete_path(&self, container_id: &str, path: &str) -> ServiceResult<()>;
    async fn rename_file(&self, container_id: &str, from: &str, to: &str) -> ServiceResult<()>;

    /// Raw tar stream of `path`, unextracted and with no size cap — distinct
    /// from `read_file`, which decodes a single file and enforces the 10MiB
    /// edit limit (spec §4.2's "DownloadFile (raw tar stream)").
    async fn download_file(&self, container_id: &str, path: &str) -> ServiceResult<Vec<u8>>;

    /// Tar-wraps `content` and copies it in, same mechanism as `write_file`
    /// but not subject to the file-editor's 10MiB cap — the upload path is
    /// bounded by the (larger) upload-size limit instead (spec §4.2's
    /// "UploadFile").
    async fn upload_file(&self, container_id: &str, path: &str, content: Vec<u8>) -> ServiceResult<()>;
}
