use rusqlite::Connection;

/// Runs schema creation and idempotent migrations inside a single
/// transaction. Each statement here is safe to re-run: tables are created
/// with `IF NOT EXISTS`, and any future column addition should follow the
/// `add_column_if_absent` pattern below rather than an unconditional
/// `ALTER TABLE` (spec §4.1 — "new columns are added if absent; the code
/// tolerates their prior presence").
pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS games (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL UNIQUE,
            image           TEXT NOT NULL,
            min_memory_mb   INTEGER NOT NULL,
            rec_memory_mb   INTEGER NOT NULL,
            port_mappings   TEXT NOT NULL,
            config_vars     TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gameservers (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL UNIQUE,
            game_id         TEXT NOT NULL REFERENCES games(id),
            container_id    TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL DEFAULT 'stopped',
            port_mappings   TEXT NOT NULL,
            memory_mb       INTEGER NOT NULL,
            cpu_cores       REAL NOT NULL DEFAULT 0,
            max_backups     INTEGER NOT NULL DEFAULT 0,
            environment     TEXT NOT NULL,
            volumes         TEXT NOT NULL DEFAULT '[]',
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id              TEXT PRIMARY KEY,
            gameserver_id   TEXT NOT NULL REFERENCES gameservers(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            task_type       TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'active',
            cron_schedule   TEXT NOT NULL,
            last_run        TEXT,
            next_run        TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_gameserver
            ON scheduled_tasks(gameserver_id);
        ",
    )?;

    // Placeholder for future idempotent column additions, e.g.:
    // add_column_if_absent(conn, "gameservers", "cpu_cores", "REAL NOT NULL DEFAULT 0")?;
    // The teacher's history carried several of these for columns already
    // present at HEAD; spec.md §9 calls those a no-op artifact not worth
    // reproducing, so this list starts empty.

    Ok(())
}

#[allow(dead_code)]
fn add_column_if_absent(
    conn: &Connection,
    table: &str,
    column: &str,
    ddl: &str,
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .collect();

    if !existing.iter().any(|c| c == column) {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl}"), [])?;
    }
    Ok(())
}
