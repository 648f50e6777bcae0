use std::time::Duration;

/// Process-wide configuration, read once at startup from the environment
/// (spec §6). Every field is optional on the environment and falls back to
/// the default noted in spec.md SPEC_FULL §6.1 — the same "read the raw
/// optional value, then apply a default" shape the teacher's `GameConfig`
/// uses for its TOML fields, just sourced from `std::env` instead of a
/// parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub public_addr: String,
    pub shutdown_timeout: Duration,
    pub database_path: String,
    pub container_socket: Option<String>,
    pub container_namespace: String,
    pub container_stop_timeout: Duration,
    pub max_file_edit_bytes: u64,
    pub max_upload_bytes: u64,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Loads an optional `.env` file (for local development, following
    /// `rosshhun-docktail/crates/cluster`'s use of `dotenvy`), then reads
    /// every variable from the process environment, applying defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            tracing::debug!("no .env file loaded: {err}");
        }

        let listen_host = env_string("LISTEN_HOST", "127.0.0.1");
        let listen_port = env_parsed("LISTEN_PORT", 8080u16);
        let public_addr = std::env::var("PUBLIC_ADDR")
            .unwrap_or_else(|_| format!("http://{listen_host}:{listen_port}"));

        AppConfig {
            public_addr,
            listen_host,
            listen_port,
            shutdown_timeout: Duration::from_secs(env_parsed("SHUTDOWN_TIMEOUT_SECS", 30u64)),
            database_path: env_string("DATABASE_PATH", "./data/gameservers.db"),
            container_socket: std::env::var("CONTAINER_SOCKET").ok(),
            container_namespace: env_string("CONTAINER_NAMESPACE", "gsctl"),
            container_stop_timeout: Duration::from_secs(env_parsed(
                "CONTAINER_STOP_TIMEOUT_SECS",
                30u64,
            )),
            max_file_edit_bytes: env_parsed("MAX_FILE_EDIT_BYTES", 10 * 1024 * 1024u64),
            max_upload_bytes: env_parsed("MAX_UPLOAD_BYTES", 100 * 1024 * 1024u64),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 8080,
            public_addr: "http://127.0.0.1:8080".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            database_path: "./data/gameservers.db".to_string(),
            container_socket: None,
            container_namespace: "gsctl".to_string(),
            container_stop_timeout: Duration::from_secs(30),
            max_file_edit_bytes: 10 * 1024 * 1024,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}
