use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortMapping {
    pub name: String,
    pub protocol: Protocol,
    pub container_port: u16,
    /// 0 means "unassigned"; the Port Allocator fills this in before the
    /// mapping is persisted on a Gameserver.
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVar {
    pub name: String,
    pub display_name: String,
    pub required: bool,
    pub default: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub image: String,
    pub min_memory_mb: u32,
    pub rec_memory_mb: u32,
    pub port_mappings: Vec<PortMapping>,
    pub config_vars: Vec<ConfigVar>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameserverStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl GameserverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameserverStatus::Stopped => "stopped",
            GameserverStatus::Starting => "starting",
            GameserverStatus::Running => "running",
            GameserverStatus::Stopping => "stopping",
            GameserverStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "starting" => GameserverStatus::Starting,
            "running" => GameserverStatus::Running,
            "stopping" => GameserverStatus::Stopping,
            "error" => GameserverStatus::Error,
            _ => GameserverStatus::Stopped,
        }
    }
}

/// A bind-mounted extra volume the user asked for, beyond the implicit
/// `/data` data volume every Gameserver gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gameserver {
    pub id: String,
    pub name: String,
    pub game_id: String,
    pub container_id: String,
    pub status: GameserverStatus,
    pub port_mappings: Vec<PortMapping>,
    pub memory_mb: u32,
    pub cpu_cores: f64,
    pub max_backups: u32,
    pub environment: Vec<String>,
    pub volumes: Vec<VolumeSpec>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Derived, never persisted (populated by hydrate()).
    #[serde(default)]
    pub game_type: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub memory_gb: f64,
    #[serde(default)]
    pub volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: String,
}

impl Gameserver {
    pub fn new(name: String, game_id: String, memory_mb: u32, environment: Vec<String>) -> Self {
        let now = Utc::now();
        Gameserver {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            game_id,
            container_id: String::new(),
            status: GameserverStatus::Stopped,
            port_mappings: Vec::new(),
            memory_mb,
            cpu_cores: 0.0,
            max_backups: 0,
            environment,
            volumes: Vec::new(),
            created_at: now,
            updated_at: now,
            game_type: String::new(),
            image: String::new(),
            memory_gb: 0.0,
            volume_info: None,
        }
    }

    pub fn data_volume_name(&self, namespace: &str) -> String {
        format!("{namespace}-{}-data", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Restart,
    Backup,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Restart => "restart",
            TaskType::Backup => "backup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "restart" => Some(TaskType::Restart),
            "backup" => Some(TaskType::Backup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Disabled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub gameserver_id: String,
    pub name: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub cron_schedule: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(gameserver_id: String, name: String, task_type: TaskType, cron_schedule: String) -> Self {
        let now = Utc::now();
        ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            gameserver_id,
            name,
            task_type,
            status: TaskStatus::Active,
            cron_schedule,
            last_run: None,
            next_run: None,
            created_at: now,
            updated_at: now,
        }
    }
}
