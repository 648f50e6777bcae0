use chrono::Utc;
use rusqlite::{params, Row};

use crate::error::StoreError;
use crate::models::Game;

use super::{fmt_ts, parse_ts, Store};

fn row_to_game(row: &Row) -> rusqlite::Result<Game> {
    let port_mappings: String = row.get("port_mappings")?;
    let config_vars: String = row.get("config_vars")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Game {
        id: row.get("id")?,
        name: row.get("name")?,
        image: row.get("image")?,
        min_memory_mb: row.get("min_memory_mb")?,
        rec_memory_mb: row.get("rec_memory_mb")?,
        port_mappings: serde_json::from_str(&port_mappings).unwrap_or_default(),
        config_vars: serde_json::from_str(&config_vars).unwrap_or_default(),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

impl Store {
    pub fn create_game(&self, game: Game) -> Result<Game, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO games (id, name, image, min_memory_mb, rec_memory_mb, port_mappings, config_vars, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                game.id,
                game.name,
                game.image,
                game.min_memory_mb,
                game.rec_memory_mb,
                serde_json::to_string(&game.port_mappings)?,
                serde_json::to_string(&game.config_vars)?,
                fmt_ts(&game.created_at),
                fmt_ts(&game.updated_at),
            ],
        )?;
        Ok(game)
    }

    pub fn get_game(&self, id: &str) -> Result<Game, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM games WHERE id = ?1", params![id], row_to_game)
            .map_err(StoreError::from)
    }

    pub fn list_games(&self) -> Result<Vec<Game>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM games ORDER BY name ASC")?;
        let games = stmt
            .query_map([], row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(games)
    }

    pub fn update_game(&self, mut game: Game) -> Result<Game, StoreError> {
        game.updated_at = Utc::now();
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE games SET name = ?1, image = ?2, min_memory_mb = ?3, rec_memory_mb = ?4,
                port_mappings = ?5, config_vars = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                game.name,
                game.image,
                game.min_memory_mb,
                game.rec_memory_mb,
                serde_json::to_string(&game.port_mappings)?,
                serde_json::to_string(&game.config_vars)?,
                fmt_ts(&game.updated_at),
                game.id,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(game)
    }

    pub fn delete_game(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM games WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
