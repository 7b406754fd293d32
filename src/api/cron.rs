//! `/api/cron/:job` - lets an external crontab drive the lifecycle jobs.

use super::{ApiResponse, AppState, ok};
use crate::{
    config::AppConfig,
    core::local_now,
    errors::{Error, Result},
    scheduler::{CronJob, JobReport, run_job},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, header},
};
use serde::Serialize;
use tracing::{info, warn};

/// Body of a cron run response.
#[derive(Debug, Serialize)]
pub struct CronRun {
    /// Job name
    pub job: &'static str,
    /// What the run changed
    pub report: JobReport,
}

/// Looks a job up by its URL name.
#[must_use]
pub fn job_by_name(name: &str) -> Option<CronJob> {
    CronJob::ALL.into_iter().find(|job| job.name() == name)
}

/// Checks `Authorization: Bearer <secret>` when a cron secret is configured.
pub fn authorize(config: &AppConfig, headers: &HeaderMap) -> Result<()> {
    let Some(secret) = config.cron_secret.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if provided == Some(secret) {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

/// Runs one job now.
pub async fn run(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<CronRun>>> {
    let job = job_by_name(&name).ok_or_else(|| Error::UnknownCronJob { name: name.clone() })?;
    if let Err(e) = authorize(&state.config, &headers) {
        warn!("Rejected unauthenticated cron call for {}", job);
        return Err(e);
    }

    info!("Cron endpoint triggered {}", job);
    let report = run_job(&state.db, job, local_now()).await?;
    Ok(ok(CronRun {
        job: job.name(),
        report,
    }))
}
