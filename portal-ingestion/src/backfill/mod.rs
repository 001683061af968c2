//! Day-by-day historical import.
//!
//! The walk starts at a given day and moves backward until the portal returns
//! an empty day, the day limit is hit, or the run is cancelled. Days already in
//! the store are skipped, so a walk can always be re-run.

mod orchestrator;

use std::time::Duration;

use meter_client::{
    db::ReadingRepository,
    domain::{AccountKey, MeterReading},
};
use serde::Serialize;
use time::Date;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    portal::{PortalError, PortalSession},
    transform::{self, ValidationError},
};

pub use orchestrator::BackfillOrchestrator;

/// Anything that can hand over one day of readings.
#[async_trait::async_trait]
pub trait DailyReadingsSource: Send + Sync {
    async fn fetch_day(&self, date: Date) -> Result<Vec<MeterReading>, PortalError>;
}

#[async_trait::async_trait]
impl DailyReadingsSource for PortalSession {
    async fn fetch_day(&self, date: Date) -> Result<Vec<MeterReading>, PortalError> {
        self.fetch_daily_readings(date).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillSettings {
    /// Most days a single run will look at.
    pub max_days: u32,
    /// Pause after each remote fetch.
    pub request_delay: Duration,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            max_days: 3650,
            request_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Running,
    /// The portal had no readings for `cursor`: start of history reached.
    Exhausted,
    /// Walked `max_days` days without reaching the start of history.
    LimitReached,
    Cancelled,
    /// The portal session expired; a new login is needed to go on.
    Expired,
    /// The run's task died before reporting a final state.
    Failed,
}

impl ImportState {
    pub fn is_finished(self) -> bool {
        self != Self::Running
    }
}

/// Pollable progress of one backfill run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRun {
    pub state: ImportState,
    pub started_from: Date,
    /// Day being looked at, or the day the run stopped on.
    pub cursor: Date,
    pub days_imported: u32,
    pub days_skipped: u32,
    pub day_errors: u32,
    pub readings_imported: u64,
}

impl ImportRun {
    pub fn started(from: Date) -> Self {
        Self {
            state: ImportState::Running,
            started_from: from,
            cursor: from,
            days_imported: 0,
            days_skipped: 0,
            day_errors: 0,
            readings_imported: 0,
        }
    }
}

/// Why a single day could not be imported.
#[derive(thiserror::Error, Debug)]
pub enum DayError {
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] meter_client::db::StoreError),
}

enum DayOutcome {
    Skipped,
    Imported(u64),
    Empty,
}

async fn import_day(
    source: &dyn DailyReadingsSource,
    repository: &ReadingRepository,
    key: &AccountKey,
    date: Date,
) -> Result<DayOutcome, DayError> {
    if repository.has_readings_for_date(key, date).await? {
        return Ok(DayOutcome::Skipped);
    }

    let readings = source.fetch_day(date).await?;
    if readings.is_empty() {
        return Ok(DayOutcome::Empty);
    }

    let readings = transform::validate_day(date, readings)?;
    let inserted = repository.add_readings(key, &readings).await?;
    Ok(DayOutcome::Imported(inserted))
}

/// Sleep for `delay`, returning `false` if cancelled first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Walk backward from `start`, importing each missing day.
///
/// Per-day failures are logged and counted, then the walk moves on. Only an
/// expired session ends the run early, since every later fetch would fail too.
pub async fn run_backfill(
    source: &dyn DailyReadingsSource,
    repository: &ReadingRepository,
    key: &AccountKey,
    start: Date,
    settings: &BackfillSettings,
    cancel: &CancellationToken,
    progress: &watch::Sender<ImportRun>,
) -> ImportRun {
    let mut run = ImportRun::started(start);
    let mut day = Some(start);
    let mut state = ImportState::LimitReached;

    tracing::info!(account = %key, from = %start, max_days = settings.max_days, "backfill started");

    for _ in 0..settings.max_days {
        let Some(date) = day else {
            break;
        };

        if cancel.is_cancelled() {
            state = ImportState::Cancelled;
            break;
        }

        run.cursor = date;
        progress.send_replace(run.clone());

        let fetched = match import_day(source, repository, key, date).await {
            Ok(DayOutcome::Skipped) => {
                tracing::debug!(account = %key, %date, "day already stored, skipping");
                metrics::counter!("backfill_days_skipped_total").increment(1);
                run.days_skipped += 1;
                false
            }
            Ok(DayOutcome::Empty) => {
                tracing::info!(account = %key, %date, "no readings, start of history reached");
                state = ImportState::Exhausted;
                break;
            }
            Ok(DayOutcome::Imported(inserted)) => {
                tracing::info!(account = %key, %date, inserted, "day imported");
                metrics::counter!("backfill_days_imported_total").increment(1);
                metrics::counter!("backfill_readings_inserted_total").increment(inserted);
                run.days_imported += 1;
                run.readings_imported += inserted;
                true
            }
            Err(DayError::Portal(PortalError::SessionExpired)) => {
                tracing::warn!(account = %key, %date, "portal session expired, stopping backfill");
                state = ImportState::Expired;
                break;
            }
            Err(e) => {
                tracing::error!(account = %key, %date, error = %e, "failed to import day");
                metrics::counter!("backfill_day_errors_total").increment(1);
                run.day_errors += 1;
                true
            }
        };

        if fetched && !pause(settings.request_delay, cancel).await {
            state = ImportState::Cancelled;
            break;
        }

        day = date.previous_day();
    }

    run.state = state;
    tracing::info!(
        account = %key,
        state = ?run.state,
        cursor = %run.cursor,
        days_imported = run.days_imported,
        days_skipped = run.days_skipped,
        day_errors = run.day_errors,
        readings = run.readings_imported,
        "backfill finished"
    );
    progress.send_replace(run.clone());
    run
}

/// Import every missing day in `first..=last`, oldest first.
///
/// Unlike [`run_backfill`], an empty day does not stop the walk. Returns the
/// number of readings inserted.
pub async fn import_range(
    source: &dyn DailyReadingsSource,
    repository: &ReadingRepository,
    key: &AccountKey,
    first: Date,
    last: Date,
    settings: &BackfillSettings,
) -> Result<u64, PortalError> {
    let mut inserted_total = 0;
    let mut day = Some(first);

    while let Some(date) = day.filter(|d| *d <= last) {
        match import_day(source, repository, key, date).await {
            Ok(DayOutcome::Imported(inserted)) => {
                tracing::info!(account = %key, %date, inserted, "day imported");
                inserted_total += inserted;
            }
            Ok(DayOutcome::Skipped) => {}
            Ok(DayOutcome::Empty) => {
                tracing::info!(account = %key, %date, "no readings for day");
            }
            Err(DayError::Portal(PortalError::SessionExpired)) => return Err(PortalError::SessionExpired),
            Err(e) => {
                tracing::error!(account = %key, %date, error = %e, "failed to import day");
                metrics::counter!("backfill_day_errors_total").increment(1);
            }
        }

        if date < last && !settings.request_delay.is_zero() {
            tokio::time::sleep(settings.request_delay).await;
        }
        day = date.next_day();
    }

    Ok(inserted_total)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use time::macros::date;

    fn settings() -> BackfillSettings {
        BackfillSettings {
            max_days: 3650,
            request_delay: Duration::ZERO,
        }
    }

    fn key() -> AccountKey {
        AccountKey::new("020012345678").unwrap()
    }

    async fn walk(
        source: &ScriptedSource,
        repository: &ReadingRepository,
        start: Date,
        settings: &BackfillSettings,
        cancel: &CancellationToken,
    ) -> ImportRun {
        let (tx, _rx) = watch::channel(ImportRun::started(start));
        run_backfill(source, repository, &key(), start, settings, cancel, &tx).await
    }

    #[tokio::test]
    async fn stops_at_first_empty_day() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let source = ScriptedSource::with_data([date!(2026-02-19), date!(2026-02-18), date!(2026-02-16)]);

        let run = walk(&source, &repo, date!(2026-02-19), &settings(), &CancellationToken::new()).await;

        assert_eq!(run.state, ImportState::Exhausted);
        assert_eq!(run.cursor, date!(2026-02-17));
        assert_eq!(run.days_imported, 2);
        assert_eq!(run.readings_imported, 192);
        // Nothing older than the empty day is requested.
        assert_eq!(
            source.fetched(),
            vec![date!(2026-02-19), date!(2026-02-18), date!(2026-02-17)]
        );
        assert!(repo.has_readings_for_date(&key(), date!(2026-02-18)).await.unwrap());
        assert!(!repo.has_readings_for_date(&key(), date!(2026-02-16)).await.unwrap());
    }

    #[tokio::test]
    async fn second_walk_inserts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let days = [date!(2026-02-19), date!(2026-02-18), date!(2026-02-17)];

        let first = ScriptedSource::with_data(days);
        let run = walk(&first, &repo, date!(2026-02-19), &settings(), &CancellationToken::new()).await;
        assert_eq!(run.readings_imported, 3 * 96);

        let second = ScriptedSource::with_data(days);
        let run = walk(&second, &repo, date!(2026-02-19), &settings(), &CancellationToken::new()).await;
        assert_eq!(run.readings_imported, 0);
        assert_eq!(run.days_skipped, 3);
        // Only the empty day that ends the walk is fetched again.
        assert_eq!(second.fetched(), vec![date!(2026-02-16)]);
    }

    #[tokio::test]
    async fn broken_day_is_counted_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let mut source = ScriptedSource::with_data([date!(2026-02-19), date!(2026-02-17)]);
        source.script.insert(date!(2026-02-18), Day::Broken);

        let run = walk(&source, &repo, date!(2026-02-19), &settings(), &CancellationToken::new()).await;

        assert_eq!(run.state, ImportState::Exhausted);
        assert_eq!(run.day_errors, 1);
        assert_eq!(run.days_imported, 2);
        assert!(!repo.has_readings_for_date(&key(), date!(2026-02-18)).await.unwrap());
        assert!(repo.has_readings_for_date(&key(), date!(2026-02-17)).await.unwrap());
    }

    #[tokio::test]
    async fn unstorable_day_is_counted_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let mut source = ScriptedSource::with_data([date!(2026-02-19), date!(2026-02-17)]);
        source.script.insert(date!(2026-02-18), Day::Oversized);

        let run = walk(&source, &repo, date!(2026-02-19), &settings(), &CancellationToken::new()).await;

        assert_eq!(run.state, ImportState::Exhausted);
        assert_eq!(run.day_errors, 1);
        assert_eq!(run.days_imported, 2);
        assert!(!repo.has_readings_for_date(&key(), date!(2026-02-18)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_session_ends_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let mut source = ScriptedSource::with_data([date!(2026-02-19), date!(2026-02-17)]);
        source.script.insert(date!(2026-02-18), Day::Expired);

        let run = walk(&source, &repo, date!(2026-02-19), &settings(), &CancellationToken::new()).await;

        assert_eq!(run.state, ImportState::Expired);
        assert_eq!(run.cursor, date!(2026-02-18));
        assert_eq!(source.fetched().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_keeps_imported_days() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let cancel = CancellationToken::new();
        let mut source =
            ScriptedSource::with_data([date!(2026-02-19), date!(2026-02-18), date!(2026-02-17), date!(2026-02-16)]);
        source.cancel_after = Some((2, cancel.clone()));

        let run = walk(&source, &repo, date!(2026-02-19), &settings(), &cancel).await;

        assert_eq!(run.state, ImportState::Cancelled);
        assert_eq!(run.days_imported, 2);
        assert_eq!(source.fetched().len(), 2);
        assert!(repo.has_readings_for_date(&key(), date!(2026-02-19)).await.unwrap());
        assert!(repo.has_readings_for_date(&key(), date!(2026-02-18)).await.unwrap());
        assert!(!repo.has_readings_for_date(&key(), date!(2026-02-17)).await.unwrap());
    }

    #[tokio::test]
    async fn day_limit_bounds_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let source = ScriptedSource::with_data([date!(2026-02-19), date!(2026-02-18), date!(2026-02-17)]);
        let limited = BackfillSettings {
            max_days: 2,
            ..settings()
        };

        let run = walk(&source, &repo, date!(2026-02-19), &limited, &CancellationToken::new()).await;

        assert_eq!(run.state, ImportState::LimitReached);
        assert_eq!(run.days_imported, 2);
        assert_eq!(source.fetched().len(), 2);
    }

    #[tokio::test]
    async fn range_import_walks_forward_past_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, date!(2026-02-20));
        let source = ScriptedSource::with_data([date!(2026-02-10), date!(2026-02-12)]);

        let inserted = import_range(&source, &repo, &key(), date!(2026-02-10), date!(2026-02-12), &settings())
            .await
            .unwrap();

        assert_eq!(inserted, 192);
        assert_eq!(
            source.fetched(),
            vec![date!(2026-02-10), date!(2026-02-11), date!(2026-02-12)]
        );
    }
}
