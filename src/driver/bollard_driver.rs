//! Production container driver, backed by the Docker Engine API through
//! `bollard`. The container-assembly half (port bindings, memory/CPU
//! limits, restart policy, env injection) is a direct generalization of
//! the teacher's `Server::start` in `cpdt-r2wraith/src/server_cluster.rs`
//! — that code built one `HostConfig` for one long-lived game process;
//! this one builds the same shape of `HostConfig` from a Gameserver's
//! full port-mapping list, environment, and extra volume binds.

use std::collections::HashMap;
use std::io::Read;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, LogsOptions, RemoveContainerOptions,
    StatsOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::Docker;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::ServiceError;
use crate::models::{Gameserver, GameserverStatus, VolumeInfo};

use super::sandbox::BACKUPS_ROOT;
use super::{ContainerDriver, FileEntry, LogChunk, StatsSample};

const READ_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;

pub struct BollardDriver {
    docker: Docker,
    stop_timeout_secs: i64,
}

impl BollardDriver {
    pub fn connect(socket: Option<&str>, stop_timeout_secs: i64) -> anyhow::Result<Self> {
        let docker = match socket {
            Some(addr) => Docker::connect_with_socket(addr, 120, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(BollardDriver {
            docker,
            stop_timeout_secs,
        })
    }

    fn map_err(err: bollard::errors::Error) -> ServiceError {
        ServiceError::RuntimeOp(err.to_string())
    }

    /// Compares the locally-cached image digest against the registry's
    /// manifest digest and pulls only on mismatch or absence (spec §4.2).
    /// Any failure probing the remote registry is swallowed: the driver
    /// proceeds best-effort with whatever is local.
    async fn ensure_image(&self, image: &str) -> Result<(), ServiceError> {
        let local_digest = self
            .docker
            .inspect_image(image)
            .await
            .ok()
            .and_then(|inspect| inspect.repo_digests.and_then(|d| d.into_iter().next()));

        let remote_digest = match self.docker.inspect_registry_distribution(image).await {
            Ok(dist) => dist.descriptor.and_then(|d| d.digest),
            Err(err) => {
                tracing::debug!("skipping image digest probe for {image}: {err}");
                None
            }
        };

        let needs_pull = match (&local_digest, &remote_digest) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(local), Some(remote)) => !local.contains(remote.as_str()),
        };

        if needs_pull {
            let (from_image, tag) = match image.rsplit_once(':') {
                Some((name, tag)) => (name.to_string(), tag.to_string()),
                None => (image.to_string(), "latest".to_string()),
            };
            let mut stream = self.docker.create_image(
                Some(CreateImageOptions {
                    from_image,
                    tag,
                    ..Default::default()
                }),
                None,
                None,
            );
            while let Some(progress) = stream.next().await {
                if let Err(err) = progress {
                    tracing::warn!("image pull progress error for {image}: {err}");
                }
            }
        }

        Ok(())
    }

    async fn exec(&self, container_id: &str, cmd: Vec<&str>) -> Result<(String, bool), ServiceError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(Self::map_err)?;

        let mut output = String::new();
        if let StartExecResults::Attached { mut output: frames, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(Self::map_err)?
        {
            while let Some(Ok(chunk)) = frames.next().await {
                output_push(&mut output, chunk);
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(Self::map_err)?;
        let success = inspect.exit_code.unwrap_or(1) == 0;
        Ok((output, success))
    }

    async fn exec_ok(&self, container_id: &str, cmd: Vec<&str>) -> Result<(), ServiceError> {
        let (output, success) = self.exec(container_id, cmd).await?;
        if success {
            Ok(())
        } else {
            Err(ServiceError::RuntimeOp(format!(
                "in-container command failed: {output}"
            )))
        }
    }

    /// Pulls `path` out of the container as a raw tar byte stream, with no
    /// extraction and no size cap — the shared primitive behind both
    /// `read_file` (which extracts a single entry and caps it at 10MiB) and
    /// `download_file` (which hands the tar straight back).
    async fn download_raw_tar(&self, container_id: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        let mut stream = self.docker.download_from_container(
            container_id,
            Some(DownloadFromContainerOptions { path: path.to_string() }),
        );

        let mut tar_bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            tar_bytes.extend_from_slice(&chunk.map_err(Self::map_err)?);
        }
        Ok(tar_bytes)
    }

    /// Tar-wraps `content` as a single entry named for `path`'s basename
    /// and copies it into `path`'s parent directory inside the container —
    /// the shared primitive behind both `write_file` and `upload_file`.
    async fn upload_raw_tar(&self, container_id: &str, path: &str, content: Vec<u8>) -> Result<(), ServiceError> {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let parent = path
            .rsplit_once('/')
            .map(|(dir, _)| if dir.is_empty() { "/" } else { dir })
            .unwrap_or("/");

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, &file_name, content.as_slice())
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let tar_bytes = builder.into_inner().map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.docker
            .upload_to_container(
                container_id,
                Some(UploadToContainerOptions {
                    path: parent.to_string(),
                    ..Default::default()
                }),
                tar_bytes.into(),
            )
            .await
            .map_err(Self::map_err)
    }
}

fn output_push(buf: &mut String, chunk: bollard::container::LogOutput) {
    if let Ok(text) = std::str::from_utf8(&chunk.into_bytes()) {
        buf.push_str(text);
    }
}

#[async_trait]
impl ContainerDriver for BollardDriver {
    async fn create_container(&self, gs: &mut Gameserver, namespace: &str) -> Result<(), ServiceError> {
        if gs.port_mappings.iter().any(|m| m.host_port == 0) {
            return Err(ServiceError::BadRequest(
                "every port mapping must have a host_port assigned before container creation"
                    .to_string(),
            ));
        }

        self.ensure_image(&gs.image).await?;

        let volume_name = gs.data_volume_name(namespace);
        self.create_volume(&volume_name).await?;

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for mapping in &gs.port_mappings {
            let key = format!("{}/{}", mapping.container_port, mapping.protocol.as_str());
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(mapping.host_port.to_string()),
                }]),
            );
        }

        let mut binds = vec![format!("{volume_name}:/data")];
        for vol in &gs.volumes {
            if vol.read_only {
                binds.push(format!("{}:{}:ro", vol.host_path, vol.container_path));
            } else {
                binds.push(format!("{}:{}", vol.host_path, vol.container_path));
            }
        }

        let mut env = gs.environment.clone();
        env.push(format!("MEMORY_MB={}", gs.memory_mb));

        let mut labels = HashMap::new();
        labels.insert("gameserver.id".to_string(), gs.id.clone());
        labels.insert("gameserver.name".to_string(), gs.name.clone());
        labels.insert("gameserver.type".to_string(), gs.game_type.clone());

        let config = Config {
            image: Some(gs.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            labels: Some(labels),
            host_config: Some(HostConfig {
                binds: Some(binds),
                port_bindings: Some(port_bindings),
                memory: Some(gs.memory_mb as i64 * 1024 * 1024),
                cpu_period: if gs.cpu_cores > 0.0 { Some(100_000) } else { None },
                cpu_quota: if gs.cpu_cores > 0.0 {
                    Some((gs.cpu_cores * 100_000.0) as i64)
                } else {
                    None
                },
                restart_policy: Some(bollard::models::RestartPolicy {
                    name: Some(bollard::models::RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: format!("{namespace}-{}", gs.name),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(Self::map_err)?;

        gs.container_id = response.id;
        Ok(())
    }

    async fn start_container(&self, container_id: &str) -> Result<(), ServiceError> {
        self.docker
            .start_container::<String>(container_id, None)
            .await
            .map_err(Self::map_err)
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), ServiceError> {
        if let Err(err) = self
            .docker
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: self.stop_timeout_secs,
                }),
            )
            .await
        {
            tracing::debug!("stop_container({container_id}) failed (treated as already stopped): {err}");
        }
        self.remove_container(container_id).await
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), ServiceError> {
        match self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(err) => Err(Self::map_err(err)),
        }
    }

    async fn get_container_status(&self, container_id: &str) -> Result<GameserverStatus, ServiceError> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(Self::map_err)?;

        let status = inspect
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| match s {
                bollard::models::ContainerStateStatusEnum::RUNNING => GameserverStatus::Running,
                bollard::models::ContainerStateStatusEnum::RESTARTING => GameserverStatus::Starting,
                bollard::models::ContainerStateStatusEnum::EXITED
                | bollard::models::ContainerStateStatusEnum::DEAD
                | bollard::models::ContainerStateStatusEnum::CREATED
                | bollard::models::ContainerStateStatusEnum::PAUSED => GameserverStatus::Stopped,
                _ => GameserverStatus::Error,
            })
            .unwrap_or(GameserverStatus::Error);

        Ok(status)
    }

    async fn stream_container_logs(
        &self,
        container_id: &str,
    ) -> Result<BoxStream<'static, Result<LogChunk, ServiceError>>, ServiceError> {
        let stream = self.docker.logs::<String>(
            container_id,
            Some(LogsOptions {
                follow: true,
                stdout: true,
                stderr: true,
                timestamps: true,
                tail: "100".to_string(),
                ..Default::default()
            }),
        );

        // bollard demultiplexes the Docker log stream frames for us, so the
        // "strip the first 8 bytes per frame" caveat in spec §4.2 does not
        // apply at this layer — it only matters to a caller reading the raw
        // HTTP stream directly.
        let mapped = stream.map(|item| item.map(|output| output.into_bytes().to_vec()).map_err(Self::map_err));
        Ok(mapped.boxed())
    }

    async fn stream_container_stats(
        &self,
        container_id: &str,
    ) -> Result<BoxStream<'static, Result<StatsSample, ServiceError>>, ServiceError> {
        let stream = self.docker.stats(
            container_id,
            Some(StatsOptions {
                stream: true,
                one_shot: false,
            }),
        );

        let mapped = stream.map(|item| {
            item.map_err(Self::map_err).map(|stats| {
                let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as i64
                    - stats.precpu_stats.cpu_usage.total_usage as i64;
                let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as i64
                    - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
                let online_cpus = stats
                    .cpu_stats
                    .cpu_usage
                    .percpu_usage
                    .as_ref()
                    .map(|v| v.len() as u64)
                    .filter(|n| *n > 0)
                    .or(stats.cpu_stats.online_cpus)
                    .unwrap_or(1);

                let cpu_percent = if system_delta > 0 && cpu_delta > 0 {
                    (cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0
                } else {
                    0.0
                };

                let cache = stats
                    .memory_stats
                    .stats
                    .as_ref()
                    .and_then(|s| s.get("cache"))
                    .copied()
                    .unwrap_or(0);
                let memory_usage_bytes = stats.memory_stats.usage.unwrap_or(0).saturating_sub(cache);

                StatsSample {
                    cpu_percent,
                    memory_usage_bytes,
                    memory_limit_bytes: stats.memory_stats.limit.unwrap_or(0),
                }
            })
        });

        Ok(mapped.boxed())
    }

    async fn send_command(&self, container_id: &str, cmd: &str) -> Result<(), ServiceError> {
        self.exec_ok(container_id, vec!["/data/scripts/send-command.sh", cmd])
            .await
    }

    async fn create_volume(&self, name: &str) -> Result<(), ServiceError> {
        match self
            .docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                if self.docker.inspect_volume(name).await.is_ok() {
                    Ok(())
                } else {
                    Err(Self::map_err(err))
                }
            }
        }
    }

    async fn remove_volume(&self, name: &str) -> Result<(), ServiceError> {
        match self.docker.remove_volume(name, Some(RemoveVolumeOptions { force: true })).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(err) => Err(Self::map_err(err)),
        }
    }

    async fn get_volume_info(&self, name: &str) -> Result<Option<VolumeInfo>, ServiceError> {
        match self.docker.inspect_volume(name).await {
            Ok(v) => Ok(Some(VolumeInfo {
                name: v.name,
                mountpoint: v.mountpoint,
            })),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(None),
            Err(err) => Err(Self::map_err(err)),
        }
    }

    async fn create_backup(&self, container_id: &str, _gs_name: &str) -> Result<String, ServiceError> {
        let filename = format!("backup-{}.tar.gz", Utc::now().format("%Y-%m-%d_%H-%M-%S"));
        let archive_path = format!("{BACKUPS_ROOT}/{filename}");
        self.exec_ok(
            container_id,
            vec!["tar", "-czf", &archive_path, "-C", "/data/server", "."],
        )
        .await?;
        Ok(filename)
    }

    async fn restore_backup(&self, container_id: &str, filename: &str) -> Result<(), ServiceError> {
        let archive_path = format!("{BACKUPS_ROOT}/{filename}");
        let script = format!(
            "rm -rf /data/server/* && tar -xzf {archive_path} -C /data/server"
        );
        self.exec_ok(container_id, vec!["sh", "-c", &script]).await
    }

    async fn cleanup_old_backups(&self, container_id: &str, max: u32) -> Result<(), ServiceError> {
        if max == 0 {
            return Ok(());
        }
        let script = format!(
            "ls -t {BACKUPS_ROOT}/*.tar.gz 2>/dev/null | tail -n +{} | xargs -r rm -f",
            max + 1
        );
        self.exec_ok(container_id, vec!["sh", "-c", &script]).await
    }

    async fn list_files(&self, container_id: &str, path: &str) -> Result<Vec<FileEntry>, ServiceError> {
        // `%T@ %s %y %f` => mtime-epoch, size, type (f/d), basename.
        let find_cmd = format!("find {path} -mindepth 1 -maxdepth 1 -printf '%T@ %s %y %f\\n'");
        let (output, success) = self.exec(container_id, vec!["sh", "-c", &find_cmd]).await?;
        if !success {
            return Err(ServiceError::RuntimeOp(format!("listing {path} failed")));
        }

        let mut entries = Vec::new();
        for line in output.lines() {
            let mut parts = line.splitn(4, ' ');
            let (Some(mtime), Some(size), Some(kind), Some(name)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let modified = mtime
                .parse::<f64>()
                .ok()
                .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
                .unwrap_or_else(Utc::now);
            entries.push(FileEntry {
                name: name.to_string(),
                path: format!("{}/{}", path.trim_end_matches('/'), name),
                is_dir: kind == "d",
                size: size.parse().unwrap_or(0),
                modified,
            });
        }
        Ok(entries)
    }

    async fn read_file(&self, container_id: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        let tar_bytes = self.download_raw_tar(container_id, path).await?;

        let target_name = path.rsplit('/').next().unwrap_or(path);
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        for entry in archive.entries().map_err(|e| ServiceError::Internal(e.to_string()))? {
            let mut entry = entry.map_err(|e| ServiceError::Internal(e.to_string()))?;
            let entry_path = entry.path().map_err(|e| ServiceError::Internal(e.to_string()))?;
            if entry_path.file_name().and_then(|n| n.to_str()) == Some(target_name) {
                if entry.size() > READ_FILE_MAX_BYTES {
                    return Err(ServiceError::BadRequest(format!(
                        "file {path} exceeds the 10MiB read limit"
                    )));
                }
                let mut buf = Vec::new();
                entry
                    .read_to_end(&mut buf)
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;
                return Ok(buf);
            }
        }
        Err(ServiceError::NotFound(format!("file {path} not found")))
    }

    async fn write_file(&self, container_id: &str, path: &str, content: Vec<u8>) -> Result<(), ServiceError> {
        self.upload_raw_tar(container_id, path, content).await
    }

    async fn create_directory(&self, container_id: &str, path: &str) -> Result<(), ServiceError> {
        self.exec_ok(container_id, vec!["mkdir", "-p", path]).await
    }

    async fn delete_path(&self, container_id: &str, path: &str) -> Result<(), ServiceError> {
        self.exec_ok(container_id, vec!["rm", "-rf", path]).await
    }

    async fn rename_file(&self, container_id: &str, from: &str, to: &str) -> Result<(), ServiceError> {
        self.exec_ok(container_id, vec!["mv", from, to]).await
    }

    async fn download_file(&self, container_id: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        self.download_raw_tar(container_id, path).await
    }

    async fn upload_file(&self, container_id: &str, path: &str, content: Vec<u8>) -> Result<(), ServiceError> {
        self.upload_raw_tar(container_id, path, content).await
    }
}
