//! Path sandbox shared by every file-manager operation (spec §4.2, §6,
//! §8 property 5). Every entry point must resolve within `/data/server`;
//! backup read/list/delete additionally allow `/data/backups`. Neither
//! root directory can itself be deleted.

pub const SERVER_ROOT: &str = "/data/server";
pub const BACKUPS_ROOT: &str = "/data/backups";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxScope {
    /// Only `/data/server` is allowed (file edit/write/create/rename ops).
    ServerOnly,
    /// Both `/data/server` and `/data/backups` are allowed (list/download/
    /// delete).
    ServerAndBackups,
}

/// Validates that `path` is a well-formed absolute path confined to the
/// allowed root(s) for `scope`, rejecting `..` components and any path
/// that merely has the right string prefix without being a real
/// subdirectory (e.g. `/data/server-evil`). Returns the normalized path on
/// success.
pub fn validate_path(path: &str, scope: SandboxScope) -> Result<String, String> {
    if path.contains("..") {
        return Err(format!("path '{path}' contains a '..' component"));
    }
    if !path.starts_with('/') {
        return Err(format!("path '{path}' must be absolute"));
    }

    let roots: &[&str] = match scope {
        SandboxScope::ServerOnly => &[SERVER_ROOT],
        SandboxScope::ServerAndBackups => &[SERVER_ROOT, BACKUPS_ROOT],
    };

    let normalized = normalize(path);

    for root in roots {
        if normalized == *root || normalized.starts_with(&format!("{root}/")) {
            return Ok(normalized);
        }
    }

    Err(format!(
        "path '{path}' is outside the allowed sandbox root(s)"
    ))
}

/// Forbids deleting a sandbox root directory itself.
pub fn validate_deletable(path: &str) -> Result<(), String> {
    if path == SERVER_ROOT || path == BACKUPS_ROOT {
        return Err(format!("'{path}' is a sandbox root and cannot be deleted"));
    }
    Ok(())
}

fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_paths_under_server_root() {
        assert!(validate_path("/data/server/world/level.dat", SandboxScope::ServerOnly).is_ok());
    }

    #[test]
    fn rejects_dotdot() {
        assert!(validate_path("/data/server/../../etc/passwd", SandboxScope::ServerOnly).is_err());
    }

    #[test]
    fn rejects_relative_escape_without_dotdot_literal_match() {
        assert!(validate_path("../../etc/passwd", SandboxScope::ServerOnly).is_err());
    }

    #[test]
    fn rejects_lookalike_prefix() {
        assert!(validate_path("/data/server-evil/x", SandboxScope::ServerOnly).is_err());
    }

    #[test]
    fn backups_root_only_allowed_with_scope() {
        assert!(validate_path("/data/backups/backup-1.tar.gz", SandboxScope::ServerOnly).is_err());
        assert!(
            validate_path("/data/backups/backup-1.tar.gz", SandboxScope::ServerAndBackups).is_ok()
        );
    }

    #[test]
    fn roots_are_not_individually_deletable() {
        assert!(validate_deletable(SERVER_ROOT).is_err());
        assert!(validate_deletable(BACKUPS_ROOT).is_err());
        assert!(validate_deletable("/data/server/save1").is_ok());
    }

    #[test]
    fn etc_passwd_is_rejected_outright() {
        assert!(validate_path("/etc/passwd", SandboxScope::ServerAndBackups).is_err());
    }
}
