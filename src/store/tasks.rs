use chrono::Utc;
use rusqlite::{params, Row};

use crate::error::StoreError;
use crate::models::{ScheduledTask, TaskStatus, TaskType};

use super::{fmt_ts, parse_ts, Store};

fn row_to_task(row: &Row) -> rusqlite::Result<ScheduledTask> {
    let task_type: String = row.get("task_type")?;
    let status: String = row.get("status")?;
    let last_run: Option<String> = row.get("last_run")?;
    let next_run: Option<String> = row.get("next_run")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(ScheduledTask {
        id: row.get("id")?,
        gameserver_id: row.get("gameserver_id")?,
        name: row.get("name")?,
        task_type: TaskType::parse(&task_type).unwrap_or(TaskType::Backup),
        status: if status == "disabled" {
            TaskStatus::Disabled
        } else {
            TaskStatus::Active
        },
        cron_schedule: row.get("cron_schedule")?,
        last_run: last_run.map(|s| parse_ts(&s)),
        next_run: next_run.map(|s| parse_ts(&s)),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

impl Store {
    pub fn create_scheduled_task(&self, task: ScheduledTask) -> Result<ScheduledTask, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scheduled_tasks
                (id, gameserver_id, name, task_type, status, cron_schedule, last_run, next_run,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.id,
                task.gameserver_id,
                task.name,
                task.task_type.as_str(),
                task.status.as_str(),
                task.cron_schedule,
                task.last_run.as_ref().map(fmt_ts),
                task.next_run.as_ref().map(fmt_ts),
                fmt_ts(&task.created_at),
                fmt_ts(&task.updated_at),
            ],
        )?;
        Ok(task)
    }

    pub fn get_scheduled_task(&self, id: &str) -> Result<ScheduledTask, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM scheduled_tasks WHERE id = ?1",
            params![id],
            row_to_task,
        )
        .map_err(StoreError::from)
    }

    pub fn update_scheduled_task(&self, mut task: ScheduledTask) -> Result<ScheduledTask, StoreError> {
        task.updated_at = Utc::now();
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE scheduled_tasks SET
                name = ?1, task_type = ?2, status = ?3, cron_schedule = ?4, last_run = ?5,
                next_run = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                task.name,
                task.task_type.as_str(),
                task.status.as_str(),
                task.cron_schedule,
                task.last_run.as_ref().map(fmt_ts),
                task.next_run.as_ref().map(fmt_ts),
                fmt_ts(&task.updated_at),
                task.id,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(task)
    }

    pub fn delete_scheduled_task(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn list_scheduled_tasks_for_gameserver(
        &self,
        gameserver_id: &str,
    ) -> Result<Vec<ScheduledTask>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM scheduled_tasks WHERE gameserver_id = ?1 ORDER BY created_at ASC",
        )?;
        let tasks = stmt
            .query_map(params![gameserver_id], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn list_active_scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM scheduled_tasks WHERE status = 'active'
             ORDER BY next_run ASC",
        )?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }
}
