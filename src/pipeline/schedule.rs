// src/pipeline/schedule.rs
//! Cron triggers and the local scheduler loop.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use log::{error, info, warn};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::models::PredictionVector;
use crate::pipeline::asset::AssetKey;
use crate::pipeline::executor::{Executor, RunReport};
use crate::utils::error::PipelineError;

/// Five-field cron expression (minute hour day-of-month month day-of-week),
/// evaluated in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

fn parse_field(field: &str, name: &str, min: u32, max: u32) -> Result<u64, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidCron(format!("{} field '{}': {}", name, field, reason));
    let number = |s: &str| -> Result<u32, PipelineError> {
        let value: u32 = s
            .parse()
            .map_err(|_| invalid(format!("'{}' is not a number", s)))?;
        if value < min || value > max {
            return Err(invalid(format!("{} is outside {}-{}", value, min, max)));
        }
        Ok(value)
    };

    let mut mask = 0u64;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("bad step '{}'", step)))?;
                if step == 0 {
                    return Err(invalid("step must be positive".to_string()));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (a, b) = (number(a)?, number(b)?);
            if a > b {
                return Err(invalid(format!("range {}-{} is reversed", a, b)));
            }
            (a, b)
        } else {
            let a = number(range)?;
            // `5/15` means every 15 starting at 5.
            if step.is_some() {
                (a, max)
            } else {
                (a, a)
            }
        };

        for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
            mask |= 1 << value;
        }
    }
    Ok(mask)
}

fn has(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, PipelineError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(PipelineError::InvalidCron(format!(
                "expected 5 fields in '{}', found {}",
                expression,
                fields.len()
            )));
        }

        let mut days_of_week = parse_field(fields[4], "day-of-week", 0, 7)?;
        // 7 is another name for Sunday.
        if has(days_of_week, 7) {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes: parse_field(fields[0], "minute", 0, 59)?,
            hours: parse_field(fields[1], "hour", 0, 23)?,
            days_of_month: parse_field(fields[2], "day-of-month", 1, 31)?,
            months: parse_field(fields[3], "month", 1, 12)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        has(self.minutes, t.minute())
            && has(self.hours, t.hour())
            && has(self.months, t.month())
            && self.day_matches(t.date_naive())
    }

    /// First matching minute strictly after `after`. None when the expression
    /// can never fire (e.g. February 30th).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t: NaiveDateTime = after
            .naive_utc()
            .with_second(0)?
            .with_nanosecond(0)?
            + ChronoDuration::minutes(1);
        // Any satisfiable expression fires within a leap cycle.
        let limit = t + ChronoDuration::days(366 * 5);

        while t <= limit {
            if !has(self.months, t.month()) {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !has(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + ChronoDuration::hours(1);
                continue;
            }
            if !has(self.minutes, t.minute()) {
                t += ChronoDuration::minutes(1);
                continue;
            }
            return Some(Utc.from_utc_datetime(&t));
        }
        None
    }
}

impl FromStr for CronSchedule {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Runs scheduled ops on their cron ticks and manual runs on demand, through
/// one executor. The mutex keeps the two from overlapping.
#[derive(Clone)]
pub struct Scheduler {
    executor: Arc<Mutex<Executor>>,
}

impl Scheduler {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor: Arc::new(Mutex::new(executor)),
        }
    }

    pub fn executor(&self) -> Arc<Mutex<Executor>> {
        Arc::clone(&self.executor)
    }

    pub async fn run_now(&self, selection: &[AssetKey]) -> Result<RunReport> {
        self.executor.lock().await.run_now(selection).await
    }

    pub async fn latest_predictions(&self) -> Option<Arc<PredictionVector>> {
        self.executor.lock().await.store().predictions()
    }

    /// Earliest upcoming tick among all scheduled ops.
    pub async fn next_tick(&self, after: DateTime<Utc>) -> Option<(DateTime<Utc>, &'static str)> {
        let executor = self.executor.lock().await;
        let mut next: Option<(DateTime<Utc>, &'static str)> = None;
        for (op, schedule) in executor.graph().scheduled_ops() {
            if let Some(at) = schedule.next_after(after) {
                if next.map_or(true, |(best, _)| at < best) {
                    next = Some((at, op.name()));
                }
            }
        }
        next
    }

    /// Loops until Ctrl-C.
    pub async fn run_forever(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Sleeps until each tick and runs the op due. A failed scheduled run is
    /// logged and the loop carries on with the next tick.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let Some((at, op)) = self.next_tick(Utc::now()).await else {
                warn!("No scheduled ops in the graph; scheduler has nothing to do");
                return Ok(());
            };
            info!("⏰ Next scheduled run: '{}' at {}", op, at);
            let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    info!("🛑 Scheduler stopping");
                    return Ok(());
                }
            }

            let mut executor = self.executor.lock().await;
            match executor.run_scheduled(op).await {
                Ok(report) => info!(
                    "Scheduled run {} of '{}' materialized {} asset(s)",
                    report.run_id,
                    op,
                    report.materialized.len()
                ),
                Err(e) => error!("Scheduled run of '{}' failed: {:#}", op, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_support::{synthetic_window, InMemorySource};
    use crate::pipeline::asset::AssetStatus;
    use crate::pipeline::build_default_graph;
    use crate::utils::config::FlowConfig;
    use crate::models::WindowOffsets;
    use crate::utils::progress_config::ProgressConfig;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_daily_at_nine() {
        let cron = CronSchedule::parse("0 9 * * *").unwrap();
        assert_eq!(cron.next_after(at(2024, 1, 1, 8, 0)), Some(at(2024, 1, 1, 9, 0)));
        assert_eq!(cron.next_after(at(2024, 1, 1, 9, 0)), Some(at(2024, 1, 2, 9, 0)));
        assert_eq!(cron.next_after(at(2024, 12, 31, 10, 30)), Some(at(2025, 1, 1, 9, 0)));
        assert!(cron.matches(at(2024, 6, 15, 9, 0)));
        assert!(!cron.matches(at(2024, 6, 15, 9, 1)));
    }

    #[test]
    fn test_steps_ranges_and_lists() {
        let cron = CronSchedule::parse("*/15 8-10 * * *").unwrap();
        assert_eq!(cron.next_after(at(2024, 3, 1, 8, 7)), Some(at(2024, 3, 1, 8, 15)));
        assert_eq!(cron.next_after(at(2024, 3, 1, 10, 45)), Some(at(2024, 3, 2, 8, 0)));

        let cron = CronSchedule::parse("5,35 0 1 1,7 *").unwrap();
        assert_eq!(cron.next_after(at(2024, 1, 1, 0, 5)), Some(at(2024, 1, 1, 0, 35)));
        assert_eq!(cron.next_after(at(2024, 1, 1, 0, 35)), Some(at(2024, 7, 1, 0, 5)));
    }

    #[test]
    fn test_day_of_week_and_sunday_alias() {
        // 2024-03-03 is a Sunday.
        let sunday = CronSchedule::parse("0 12 * * 7").unwrap();
        assert_eq!(sunday.next_after(at(2024, 3, 1, 0, 0)), Some(at(2024, 3, 3, 12, 0)));
        assert_eq!(CronSchedule::parse("0 12 * * 0").unwrap().next_after(at(2024, 3, 1, 0, 0)), Some(at(2024, 3, 3, 12, 0)));

        // Restricted day-of-month and day-of-week: either one fires.
        let either = CronSchedule::parse("0 0 15 * 1").unwrap();
        assert_eq!(either.next_after(at(2024, 3, 1, 0, 0)), Some(at(2024, 3, 4, 0, 0)));
        assert_eq!(either.next_after(at(2024, 3, 12, 0, 0)), Some(at(2024, 3, 15, 0, 0)));
    }

    #[test]
    fn test_leap_day_and_impossible_dates() {
        let leap = CronSchedule::parse("0 0 29 2 *").unwrap();
        assert_eq!(leap.next_after(at(2023, 3, 1, 0, 0)), Some(at(2024, 2, 29, 0, 0)));
        assert_eq!(CronSchedule::parse("0 0 30 2 *").unwrap().next_after(at(2024, 1, 1, 0, 0)), None);
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in ["", "0 9 * *", "60 * * * *", "* 24 * * *", "* * 0 * *", "*/0 * * * *", "5-1 * * * *", "a * * * *"] {
            assert!(
                matches!(expr.parse::<CronSchedule>(), Err(PipelineError::InvalidCron(_))),
                "{:?} should be rejected",
                expr
            );
        }
    }

    fn scheduler() -> Scheduler {
        scheduler_with(synthetic_window(1_000))
    }

    fn scheduler_with(source: InMemorySource) -> Scheduler {
        let mut config = FlowConfig::default();
        config.fetch.training_window = WindowOffsets::new(10, 0);
        config.fetch.inference_window = WindowOffsets::new(10, 0);
        config.split.seed = Some(1);
        config.progress = ProgressConfig::disabled();
        let graph = build_default_graph(&config, Arc::new(source)).unwrap();
        Scheduler::new(Executor::new(graph))
    }

    #[tokio::test]
    async fn test_next_tick_is_the_training_op() {
        let scheduler = scheduler();
        let tick = scheduler.next_tick(at(2024, 5, 1, 10, 0)).await;
        assert_eq!(tick, Some((at(2024, 5, 2, 9, 0), "comments_model")));
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let scheduler = scheduler();
        scheduler.run_until(async {}).await.unwrap();
        assert!(scheduler.latest_predictions().await.is_none());
    }

    /// Resolves once `key` reaches a status accepted by `done`, checking
    /// once a minute of (paused) test time.
    async fn status_reached(scheduler: Scheduler, key: AssetKey, done: fn(&AssetStatus) -> bool) {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            if done(&scheduler.executor().lock().await.status(key)) {
                return;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_tick_trains_model() {
        let scheduler = scheduler();
        let shutdown = status_reached(scheduler.clone(), AssetKey::CommentsModel, |status| {
            *status == AssetStatus::Fresh
        });
        scheduler.run_until(shutdown).await.unwrap();

        let executor = scheduler.executor();
        let executor = executor.lock().await;
        assert_eq!(executor.status(AssetKey::HackernewsStories), AssetStatus::Fresh);
        assert_eq!(executor.status(AssetKey::CommentsModel), AssetStatus::Fresh);
        // The tick covers the model and its ancestors, not the downstream assets.
        assert_eq!(
            executor.status(AssetKey::LatestStoryCommentPredictions),
            AssetStatus::Missing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_keeps_scheduler_running() {
        let scheduler = scheduler_with(synthetic_window(1_000).failing_on(995));
        let shutdown = status_reached(scheduler.clone(), AssetKey::HackernewsStories, |status| {
            matches!(status, AssetStatus::Failed(_))
        });
        scheduler.run_until(shutdown).await.unwrap();

        let executor = scheduler.executor();
        let executor = executor.lock().await;
        assert!(matches!(
            executor.status(AssetKey::HackernewsStories),
            AssetStatus::Failed(_)
        ));
        assert_eq!(executor.status(AssetKey::CommentsModel), AssetStatus::Missing);
    }

    #[tokio::test]
    async fn test_manual_run_through_scheduler() {
        let scheduler = scheduler();
        scheduler.run_now(&[]).await.unwrap();
        assert_eq!(scheduler.latest_predictions().await.unwrap().len(), 8);
    }
}
