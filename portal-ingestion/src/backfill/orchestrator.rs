use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use meter_client::{db::ReadingRepository, domain::AccountKey};
use time::Date;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{run_backfill, BackfillSettings, DailyReadingsSource, ImportRun, ImportState};

struct ActiveRun {
    cancel: CancellationToken,
    progress: watch::Receiver<ImportRun>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        !self.progress.borrow().state.is_finished()
    }
}

/// Runs at most one background backfill per account.
///
/// Finished runs stay registered so their final snapshot can still be read;
/// a new trigger replaces them.
pub struct BackfillOrchestrator {
    repository: ReadingRepository,
    settings: BackfillSettings,
    runs: Mutex<HashMap<AccountKey, ActiveRun>>,
}

impl BackfillOrchestrator {
    pub fn new(repository: ReadingRepository, settings: BackfillSettings) -> Self {
        Self {
            repository,
            settings,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &BackfillSettings {
        &self.settings
    }

    fn lock_runs(&self) -> std::sync::MutexGuard<'_, HashMap<AccountKey, ActiveRun>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a backfill from yesterday. Returns `false` if one is already running.
    pub fn trigger(&self, key: &AccountKey, source: Arc<dyn DailyReadingsSource>) -> bool {
        let Some(yesterday) = self.repository.today().previous_day() else {
            return false;
        };
        self.trigger_from(key, source, yesterday)
    }

    /// Start a backfill walking backward from `start`.
    pub fn trigger_from(&self, key: &AccountKey, source: Arc<dyn DailyReadingsSource>, start: Date) -> bool {
        let mut runs = self.lock_runs();
        if runs.get(key).is_some_and(ActiveRun::is_running) {
            tracing::warn!(account = %key, "backfill already running, ignoring trigger");
            return false;
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(ImportRun::started(start));
        let tx = Arc::new(tx);
        runs.insert(
            key.clone(),
            ActiveRun {
                cancel: cancel.clone(),
                progress: rx,
            },
        );
        drop(runs);

        let repository = self.repository.clone();
        let settings = self.settings.clone();
        let worker_key = key.clone();
        let worker_tx = tx.clone();
        let worker = tokio::spawn(async move {
            run_backfill(source.as_ref(), &repository, &worker_key, start, &settings, &cancel, &worker_tx).await;
        });

        // A run whose task dies still ends in a finished state.
        let key = key.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                tracing::error!(account = %key, error = %e, "backfill task died");
                metrics::counter!("backfill_runs_failed_total").increment(1);
                tx.send_modify(|run| run.state = ImportState::Failed);
            }
        });

        true
    }

    /// Ask the account's run to stop after its current day.
    pub fn cancel(&self, key: &AccountKey) -> bool {
        let runs = self.lock_runs();
        match runs.get(key) {
            Some(run) if run.is_running() => {
                tracing::info!(account = %key, "cancelling backfill");
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) {
        for run in self.lock_runs().values() {
            run.cancel.cancel();
        }
    }

    pub fn is_running(&self, key: &AccountKey) -> bool {
        self.lock_runs().get(key).is_some_and(ActiveRun::is_running)
    }

    /// Latest progress of the account's run, if one was ever triggered.
    pub fn snapshot(&self, key: &AccountKey) -> Option<ImportRun> {
        self.lock_runs().get(key).map(|run| run.progress.borrow().clone())
    }

    /// Wait until the account's run has finished and return its final state.
    pub async fn wait(&self, key: &AccountKey) -> Option<ImportRun> {
        let mut progress = self.lock_runs().get(key)?.progress.clone();

        if progress.wait_for(|run| run.state.is_finished()).await.is_err() {
            tracing::warn!(account = %key, "backfill task ended without a final report");
        }
        let finished = progress.borrow().clone();
        Some(finished)
    }

    /// Forget a finished run. Running runs are left alone.
    pub fn forget(&self, key: &AccountKey) {
        let mut runs = self.lock_runs();
        if runs.get(key).is_some_and(|run| !run.is_running()) {
            runs.remove(key);
        }
    }
}
