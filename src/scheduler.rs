//! In-process cron runner for the lifecycle jobs.
//!
//! The same [`run_job`] entry point backs both this loop and the
//! `/api/cron/*` endpoints, so an external crontab hitting the HTTP routes and
//! the built-in scheduler behave identically. Each job is idempotent, which
//! makes an occasional double trigger (both mechanisms enabled) harmless.

use crate::{
    config::SchedulerConfig,
    core::{
        credit_limit::{self, CreditDaysReport, DayLimitReport, LimitResetReport},
        deal_price::{self, DealPriceRunReport},
        local_now,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Local, NaiveDateTime};
use cron::Schedule;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::{fmt, str::FromStr};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument};

/// The lifecycle jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CronJob {
    /// Deal price activation and expiry
    DealPrices,
    /// Credit line expiry reset
    LimitExpiry,
    /// Daily ceiling restore
    DayLimitReset,
    /// Overdue invoice enforcement
    CreditDays,
}

impl CronJob {
    /// Every job, in the order a tick runs them.
    pub const ALL: [Self; 4] = [
        Self::LimitExpiry,
        Self::DayLimitReset,
        Self::CreditDays,
        Self::DealPrices,
    ];

    /// Name used in logs and URLs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DealPrices => "deal-prices",
            Self::LimitExpiry => "limit-expiry",
            Self::DayLimitReset => "day-limit-reset",
            Self::CreditDays => "credit-days",
        }
    }

    fn expression(self, config: &SchedulerConfig) -> &str {
        match self {
            Self::DealPrices => &config.deal_prices,
            Self::LimitExpiry => &config.limit_expiry,
            Self::DayLimitReset => &config.day_limit_reset,
            Self::CreditDays => &config.credit_days,
        }
    }
}

impl fmt::Display for CronJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a job run changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobReport {
    /// Deal price run
    DealPrices(DealPriceRunReport),
    /// Limit expiry run
    LimitExpiry(LimitResetReport),
    /// Day limit run
    DayLimitReset(DayLimitReport),
    /// Credit days run
    CreditDays(CreditDaysReport),
}

/// Runs one job as of `now`.
#[instrument(skip(db))]
pub async fn run_job(
    db: &DatabaseConnection,
    job: CronJob,
    now: NaiveDateTime,
) -> Result<JobReport> {
    Ok(match job {
        CronJob::DealPrices => {
            JobReport::DealPrices(deal_price::run_deal_price_scheduler(db, now).await?)
        }
        CronJob::LimitExpiry => {
            JobReport::LimitExpiry(credit_limit::reset_expired_limits(db, now).await?)
        }
        CronJob::DayLimitReset => {
            JobReport::DayLimitReset(credit_limit::restore_day_limits(db, now).await?)
        }
        CronJob::CreditDays => {
            JobReport::CreditDays(credit_limit::enforce_credit_days(db, now).await?)
        }
    })
}

struct ScheduledJob {
    job: CronJob,
    schedule: Schedule,
    next_run: Option<DateTime<Local>>,
}

/// Tracks when each job is next due.
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    tick: Duration,
}

impl Scheduler {
    /// Parses every job's cron expression. Jobs become due at their first
    /// occurrence after `start`.
    ///
    /// # Errors
    /// `Config` when an expression does not parse.
    pub fn from_config(config: &SchedulerConfig, start: DateTime<Local>) -> Result<Self> {
        let jobs = CronJob::ALL
            .into_iter()
            .map(|job| {
                let expression = job.expression(config);
                let schedule = Schedule::from_str(expression).map_err(|e| Error::Config {
                    message: format!("Invalid cron expression for {job} '{expression}': {e}"),
                })?;
                let next_run = schedule.after(&start).next();
                Ok(ScheduledJob {
                    job,
                    schedule,
                    next_run,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            jobs,
            tick: Duration::from_secs(config.tick_seconds.max(1)),
        })
    }

    /// Jobs due at `now`, advancing each to its next occurrence. A job that
    /// missed several occurrences (a long tick, a stalled run) fires once.
    pub fn due_jobs(&mut self, now: DateTime<Local>) -> Vec<CronJob> {
        let mut due = Vec::new();
        for scheduled in &mut self.jobs {
            if scheduled.next_run.is_some_and(|next| next <= now) {
                due.push(scheduled.job);
                scheduled.next_run = scheduled.schedule.after(&now).next();
            }
        }
        due
    }

    /// When `job` runs next.
    #[must_use]
    pub fn next_run(&self, job: CronJob) -> Option<DateTime<Local>> {
        self.jobs
            .iter()
            .find(|scheduled| scheduled.job == job)
            .and_then(|scheduled| scheduled.next_run)
    }

    /// Ticks forever, running due jobs one after another. Job failures are
    /// logged and retried at the next occurrence.
    pub async fn run(mut self, db: DatabaseConnection) {
        info!("Scheduler started, ticking every {:?}", self.tick);
        for scheduled in &self.jobs {
            debug!("{} next due at {:?}", scheduled.job, scheduled.next_run);
        }

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            for job in self.due_jobs(Local::now()) {
                match run_job(&db, job, local_now()).await {
                    Ok(report) => debug!("{} finished: {:?}", job, report),
                    Err(e) => error!("{} failed: {}", job, e),
                }
            }
        }
    }
}
