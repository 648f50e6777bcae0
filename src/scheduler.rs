//! Cron-driven periodic executor (spec §4.5). Restarts and backups are
//! driven off a tiny, fully-specified 5-field grammar (`minute hour day
//! month weekday`, 0-indexed weekday with Sunday = 0) rather than a
//! general-purpose cron crate — see SPEC_FULL.md §4.5 for why the
//! teacher's `cron_clock` dependency was dropped for this piece.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio_util::sync::CancellationToken;

use crate::models::{GameserverStatus, TaskType};
use crate::service::GameserverService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Wildcard,
    Exact(u32),
    Step(u32),
}

impl Field {
    fn parse(raw: &str) -> Option<Field> {
        if raw == "*" {
            return Some(Field::Wildcard);
        }
        if let Some(step) = raw.strip_prefix("*/") {
            return step.parse().ok().filter(|n| *n > 0).map(Field::Step);
        }
        raw.parse().ok().map(Field::Exact)
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Wildcard => true,
            Field::Exact(n) => *n == value,
            Field::Step(n) => value % n == 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CronExpr {
    minute: Field,
    hour: Field,
    day: Field,
    month: Field,
    weekday: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronParseError;

impl CronExpr {
    /// Parses a five-field `minute hour day month weekday` expression.
    /// Each field is `*`, a non-negative integer, or `*/N`.
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError);
        }

        let parsed: Vec<Field> = fields
            .iter()
            .map(|f| Field::parse(f))
            .collect::<Option<Vec<_>>>()
            .ok_or(CronParseError)?;

        Ok(CronExpr {
            minute: parsed[0],
            hour: parsed[1],
            day: parsed[2],
            month: parsed[3],
            weekday: parsed[4],
        })
    }
}

/// True iff every field of `expr` matches the corresponding component of
/// `t` (minute-resolution; seconds are ignored).
pub fn cron_matches(expr: &CronExpr, t: &DateTime<Utc>) -> bool {
    expr.minute.matches(t.minute())
        && expr.hour.matches(t.hour())
        && expr.day.matches(t.day())
        && expr.month.matches(t.month())
        && expr.weekday.matches(t.weekday().num_days_from_sunday())
}

const MAX_SEARCH_MINUTES: i64 = 7 * 24 * 60;

/// Searches minute-by-minute starting at `from` truncated up to the next
/// minute boundary, for up to 7 days, returning the first instant matching
/// `expr`. Returns `None` (the spec's "zero-time") if nothing matches
/// within the search window.
pub fn calculate_next_run(expr: &CronExpr, from: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut candidate = truncate_up_to_next_minute(from);

    for _ in 0..MAX_SEARCH_MINUTES {
        if cron_matches(expr, &candidate) {
            return Some(candidate);
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}

fn truncate_up_to_next_minute(t: &DateTime<Utc>) -> DateTime<Utc> {
    let truncated = t
        .date_naive()
        .and_hms_opt(t.hour(), t.minute(), 0)
        .unwrap()
        .and_utc();
    if truncated == *t {
        truncated
    } else {
        truncated + chrono::Duration::minutes(1)
    }
}

/// Background tick loop. One instance runs for the lifetime of the
/// process; `run` only returns once `cancel` is triggered, completing
/// whatever task executions are already in flight (spec §4.5 "Shutdown").
pub struct Scheduler {
    service: Arc<GameserverService>,
}

impl Scheduler {
    pub fn new(service: Arc<GameserverService>) -> Self {
        Scheduler { service }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(err) = self.backfill_next_runs().await {
            tracing::error!("scheduler startup backfill failed: {err}");
        }

        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn backfill_next_runs(&self) -> Result<(), crate::error::ServiceError> {
        let tasks = self.service.store().list_active_scheduled_tasks()?;
        for mut task in tasks {
            if task.next_run.is_some() {
                continue;
            }
            let Ok(expr) = CronExpr::parse(&task.cron_schedule) else {
                tracing::warn!("task {} has an unparsable cron schedule", task.id);
                continue;
            };
            task.next_run = calculate_next_run(&expr, &Utc::now());
            if let Err(err) = self.service.store().update_scheduled_task(task) {
                tracing::error!("failed to backfill next_run: {err}");
            }
        }
        Ok(())
    }

    /// One scheduler tick: exposed `pub` (rather than private) so
    /// integration tests can drive the real restart-gating/retry logic
    /// directly instead of re-implementing it against the service.
    pub async fn tick(&self) {
        let now = Utc::now();
        let tasks = match self.service.store().list_active_scheduled_tasks() {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!("scheduler failed to list active tasks: {err}");
                return;
            }
        };

        for mut task in tasks {
            let Some(next_run) = task.next_run else {
                // Edge case covered below once we have an expr; here there
                // simply is none yet, same handling as "was just edited".
                if let Ok(expr) = CronExpr::parse(&task.cron_schedule) {
                    task.next_run = calculate_next_run(&expr, &now);
                    let _ = self.service.store().update_scheduled_task(task);
                }
                continue;
            };

            if now <= next_run {
                continue;
            }

            let Ok(expr) = CronExpr::parse(&task.cron_schedule) else {
                tracing::warn!("task {} has an unparsable cron schedule", task.id);
                continue;
            };

            // Hydrated, not a raw store read: the gate below needs the
            // reconciled status, since `start_gameserver` only ever persists
            // `Starting` and nothing else in this process calls `hydrate`
            // for a server nobody has read through the service since.
            let gs = match self.service.get_gameserver(&task.gameserver_id).await {
                Ok(gs) => gs,
                Err(_) => {
                    tracing::info!(
                        "scheduled task {} targets a gameserver that no longer exists, skipping",
                        task.id
                    );
                    continue;
                }
            };

            let outcome = match task.task_type {
                TaskType::Restart => {
                    if gs.status != GameserverStatus::Running {
                        tracing::info!(
                            "skipping scheduled restart for {} (not running)",
                            gs.name
                        );
                        Ok(())
                    } else {
                        self.service.restart_gameserver(&gs.id).await.map(|_| ())
                    }
                }
                TaskType::Backup => self.service.create_gameserver_backup(&gs.id).await.map(|_| ()),
            };

            match outcome {
                Ok(()) => {
                    task.last_run = Some(now);
                    task.next_run = calculate_next_run(&expr, &now);
                    if let Err(err) = self.service.store().update_scheduled_task(task) {
                        tracing::error!("failed to persist task run: {err}");
                    }
                }
                Err(err) => {
                    tracing::error!("scheduled task {} failed, will retry next tick: {err}", task.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn s4_every_15_minutes() {
        let expr = CronExpr::parse("*/15 * * * *").unwrap();
        let from = dt(2024, 1, 1, 12, 7);
        assert_eq!(calculate_next_run(&expr, &from), Some(dt(2024, 1, 1, 12, 15)));
    }

    #[test]
    fn s4_daily_at_0230_matches() {
        let expr = CronExpr::parse("30 2 * * *").unwrap();
        assert!(cron_matches(&expr, &dt(2024, 1, 1, 2, 30)));
        assert!(!cron_matches(&expr, &dt(2024, 1, 1, 3, 30)));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronExpr::parse("* * *").is_err());
    }

    #[test]
    fn weekday_is_zero_indexed_from_sunday() {
        // 2024-01-07 is a Sunday.
        let expr = CronExpr::parse("0 0 * * 0").unwrap();
        assert!(cron_matches(&expr, &dt(2024, 1, 7, 0, 0)));
        assert!(!cron_matches(&expr, &dt(2024, 1, 8, 0, 0)));
    }

    #[test]
    fn no_match_within_window_returns_none() {
        // Feb 30 never exists; day=30 and month=2 can never both match.
        let expr = CronExpr::parse("0 0 30 2 *").unwrap();
        assert_eq!(calculate_next_run(&expr, &dt(2024, 1, 1, 0, 0)), None);
    }

    #[test]
    fn property_next_run_matches_and_is_minimal() {
        let cases = [
            ("*/15 * * * *", dt(2024, 3, 5, 9, 1)),
            ("0 * * * *", dt(2024, 6, 30, 23, 59)),
            ("*/5 */2 * * *", dt(2024, 12, 31, 22, 0)),
        ];

        for (expr_str, from) in cases {
            let expr = CronExpr::parse(expr_str).unwrap();
            if let Some(next) = calculate_next_run(&expr, &from) {
                assert!(cron_matches(&expr, &next), "{expr_str} should match its own next_run");
                let mut probe = from + chrono::Duration::minutes(1);
                while probe < next {
                    assert!(
                        !cron_matches(&expr, &probe),
                        "{expr_str} should not match any instant strictly between from and next_run"
                    );
                    probe += chrono::Duration::minutes(1);
                }
            }
        }
    }
}
