use chrono::Utc;
use rusqlite::{params, Row};

use crate::error::StoreError;
use crate::models::{Gameserver, GameserverStatus};

use super::{fmt_ts, parse_ts, Store};

fn row_to_gameserver(row: &Row) -> rusqlite::Result<Gameserver> {
    let port_mappings: String = row.get("port_mappings")?;
    let environment: String = row.get("environment")?;
    let volumes: String = row.get("volumes")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Gameserver {
        id: row.get("id")?,
        name: row.get("name")?,
        game_id: row.get("game_id")?,
        container_id: row.get("container_id")?,
        status: GameserverStatus::parse(&status),
        port_mappings: serde_json::from_str(&port_mappings).unwrap_or_default(),
        memory_mb: row.get("memory_mb")?,
        cpu_cores: row.get("cpu_cores")?,
        max_backups: row.get("max_backups")?,
        environment: serde_json::from_str(&environment).unwrap_or_default(),
        volumes: serde_json::from_str(&volumes).unwrap_or_default(),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        game_type: String::new(),
        image: String::new(),
        memory_gb: 0.0,
        volume_info: None,
    })
}

impl Store {
    pub fn create_gameserver(&self, gs: Gameserver) -> Result<Gameserver, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO gameservers
                (id, name, game_id, container_id, status, port_mappings, memory_mb, cpu_cores,
                 max_backups, environment, volumes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                gs.id,
                gs.name,
                gs.game_id,
                gs.container_id,
                gs.status.as_str(),
                serde_json::to_string(&gs.port_mappings)?,
                gs.memory_mb,
                gs.cpu_cores,
                gs.max_backups,
                serde_json::to_string(&gs.environment)?,
                serde_json::to_string(&gs.volumes)?,
                fmt_ts(&gs.created_at),
                fmt_ts(&gs.updated_at),
            ],
        )?;
        Ok(gs)
    }

    pub fn get_gameserver(&self, id: &str) -> Result<Gameserver, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM gameservers WHERE id = ?1",
            params![id],
            row_to_gameserver,
        )
        .map_err(StoreError::from)
    }

    pub fn get_gameserver_by_container_id(&self, cid: &str) -> Result<Gameserver, StoreError> {
        if cid.is_empty() {
            return Err(StoreError::NotFound);
        }
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM gameservers WHERE container_id = ?1",
            params![cid],
            row_to_gameserver,
        )
        .map_err(StoreError::from)
    }

    pub fn list_gameservers(&self) -> Result<Vec<Gameserver>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM gameservers ORDER BY created_at DESC")?;
        let servers = stmt
            .query_map([], row_to_gameserver)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(servers)
    }

    pub fn update_gameserver(&self, mut gs: Gameserver) -> Result<Gameserver, StoreError> {
        gs.updated_at = Utc::now();
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE gameservers SET
                name = ?1, game_id = ?2, container_id = ?3, status = ?4, port_mappings = ?5,
                memory_mb = ?6, cpu_cores = ?7, max_backups = ?8, environment = ?9,
                volumes = ?10, updated_at = ?11
             WHERE id = ?12",
            params![
                gs.name,
                gs.game_id,
                gs.container_id,
                gs.status.as_str(),
                serde_json::to_string(&gs.port_mappings)?,
                gs.memory_mb,
                gs.cpu_cores,
                gs.max_backups,
                serde_json::to_string(&gs.environment)?,
                serde_json::to_string(&gs.volumes)?,
                fmt_ts(&gs.updated_at),
                gs.id,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(gs)
    }

    pub fn delete_gameserver(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        // scheduled_tasks has ON DELETE CASCADE on gameserver_id; with
        // foreign_keys pragma on (set at connection open in migrations)
        // this single statement removes the Gameserver's tasks too.
        let affected = conn.execute("DELETE FROM gameservers WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
