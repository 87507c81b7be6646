//! Fixed-cadence polling of every tracked ticker.
//!
//! One *tick* fetches a reading for each ticker in configured order, stamps
//! it, derives the momentum columns and appends it to the daily store. The
//! scheduler measures how long the whole pass took and sleeps for whatever is
//! left of the interval; a pass that overruns is followed immediately by the
//! next one (no catch-up, no skipped ticks).
//!
//! A failure for one ticker (network, page content, or disk) is logged and
//! only that ticker misses the tick.

use std::{sync::Arc, time::Duration};

use chrono::{Local, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use indexmap::IndexMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::FlowConfig,
    models::{
        snapshot::{DerivedSnapshot, Snapshot, derive},
        ticker::Ticker,
    },
    source::SnapshotSource,
    store::DailyStore,
};

/// Wall-clock used to stamp snapshots and choose the storage day.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Current time, truncated to whole seconds, in `tz` or the host's zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    tz: Option<Tz>,
}

impl SystemClock {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = match self.tz {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        };
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// How long to wait after a pass that took `elapsed`, or `None` to start the
/// next pass right away.
pub fn pause_after(elapsed: Duration, interval: Duration) -> Option<Duration> {
    interval
        .checked_sub(elapsed)
        .filter(|pause| !pause.is_zero())
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Stored(DerivedSnapshot),
    SourceFailed { parse: bool, message: String },
    StoreFailed { message: String },
}

/// Per-ticker results of one pass, in tracked order.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub outcomes: IndexMap<Ticker, TickOutcome>,
    pub elapsed: Duration,
}

impl TickReport {
    pub fn stored(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, TickOutcome::Stored(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.stored()
    }
}

pub struct PollScheduler {
    tickers: Vec<Ticker>,
    interval: Duration,
    source: Arc<dyn SnapshotSource>,
    store: DailyStore,
    clock: Arc<dyn Clock>,
}

impl PollScheduler {
    pub fn new(
        config: &FlowConfig,
        source: Arc<dyn SnapshotSource>,
        store: DailyStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tickers: config.tracked_tickers.clone(),
            interval: config.poll_interval(),
            source,
            store,
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls until `cancel` fires. Cancellation is observed between passes
    /// and during the pause, never in the middle of an append. Returns the
    /// number of completed passes.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        info!(
            tickers = ?self.tickers.iter().map(Ticker::as_str).collect::<Vec<_>>(),
            interval_secs = self.interval.as_secs_f64(),
            "poll scheduler started"
        );

        let mut passes = 0u64;
        while !cancel.is_cancelled() {
            let report = self.tick().await;
            passes += 1;
            info!(
                pass = passes,
                stored = report.stored(),
                failed = report.failed(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "poll pass complete"
            );

            match pause_after(report.elapsed, self.interval) {
                Some(pause) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                None => warn!(
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    interval_ms = self.interval.as_millis() as u64,
                    "poll pass overran the interval; starting next pass immediately"
                ),
            }
        }

        info!(passes, "poll scheduler stopped");
        passes
    }

    /// Runs one pass over every tracked ticker.
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let mut outcomes = IndexMap::with_capacity(self.tickers.len());
        for ticker in &self.tickers {
            let outcome = self.poll_one(ticker).await;
            outcomes.insert(ticker.clone(), outcome);
        }
        TickReport {
            outcomes,
            elapsed: started.elapsed(),
        }
    }

    async fn poll_one(&self, ticker: &Ticker) -> TickOutcome {
        let reading = match self.source.fetch(ticker).await {
            Ok(reading) => reading,
            Err(error) => {
                if error.is_parse() {
                    warn!(
                        %ticker,
                        %error,
                        "page content not understood; skipping ticker this pass"
                    );
                } else {
                    warn!(%ticker, %error, "fetch failed; skipping ticker this pass");
                }
                return TickOutcome::SourceFailed {
                    parse: error.is_parse(),
                    message: error.to_string(),
                };
            }
        };

        let row = derive(Snapshot::stamp(self.clock.now(), reading));
        let store = self.store.clone();
        let owned = ticker.clone();
        let appended =
            tokio::task::spawn_blocking(move || store.append(&owned, row.day(), &row)).await;

        match appended {
            Ok(Ok(())) => TickOutcome::Stored(row),
            Ok(Err(error)) => {
                error!(%ticker, %error, "append failed; will retry next pass");
                TickOutcome::StoreFailed {
                    message: error.to_string(),
                }
            }
            Err(error) => {
                error!(%ticker, %error, "append task aborted");
                TickOutcome::StoreFailed {
                    message: error.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::Path,
        sync::{
            Mutex,
            atomic::{AtomicI64, Ordering},
        },
    };

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        models::snapshot::Reading,
        source::{MissingFieldSnafu, SourceError},
    };

    /// Each call returns 09:30:00 plus one more second.
    struct SteppingClock(AtomicI64);

    impl Clock for SteppingClock {
        fn now(&self) -> NaiveDateTime {
            let step = self.0.fetch_add(1, Ordering::SeqCst);
            NaiveDate::from_ymd_opt(2024, 3, 8)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
                + chrono::Duration::seconds(step)
        }
    }

    /// Takes `latency` per fetch, fails for tickers in `broken`, and records
    /// when each fetch started.
    struct ScriptedSource {
        latency: Duration,
        broken: Vec<&'static str>,
        starts: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedSource {
        fn new(latency: Duration, broken: Vec<&'static str>) -> Self {
            Self {
                latency,
                broken,
                starts: Mutex::new(Vec::new()),
            }
        }

        fn starts_for(&self, ticker: &str) -> Vec<Instant> {
            self.starts
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == ticker)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch(&self, ticker: &Ticker) -> Result<Reading, SourceError> {
            self.starts
                .lock()
                .unwrap()
                .push((ticker.to_string(), Instant::now()));
            tokio::time::sleep(self.latency).await;
            if self.broken.iter().any(|b| *b == ticker.as_str()) {
                return MissingFieldSnafu { field: "price" }.fail();
            }
            Ok(Reading {
                price: 100.0,
                net_delta_calls: 5,
                net_delta_puts: -3,
                net_premium_calls: 40,
                net_premium_puts: 10,
            })
        }
    }

    fn scheduler(
        dir: &TempDir,
        tickers: &[&str],
        source: Arc<ScriptedSource>,
    ) -> (PollScheduler, DailyStore) {
        scheduler_at(dir.path(), tickers, source)
    }

    fn scheduler_at(
        root: &Path,
        tickers: &[&str],
        source: Arc<ScriptedSource>,
    ) -> (PollScheduler, DailyStore) {
        let config = FlowConfig {
            storage_root: root.to_path_buf(),
            tracked_tickers: tickers.iter().map(|t| Ticker::new(t).unwrap()).collect(),
            poll_interval_seconds: 30,
            ..FlowConfig::default()
        };
        let store = DailyStore::new(&config.storage_root);
        let clock = Arc::new(SteppingClock(AtomicI64::new(0)));
        (
            PollScheduler::new(&config, source, store.clone(), clock),
            store,
        )
    }

    #[test]
    fn pause_fills_the_rest_of_the_interval() {
        let interval = Duration::from_secs(30);
        assert_eq!(
            pause_after(Duration::from_secs(5), interval),
            Some(Duration::from_secs(25))
        );
        assert_eq!(pause_after(Duration::from_secs(35), interval), None);
        assert_eq!(pause_after(interval, interval), None);
        assert_eq!(
            pause_after(Duration::ZERO, interval),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn failing_ticker_does_not_block_the_others() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new(Duration::ZERO, vec!["SPX"]));
        let (scheduler, store) = scheduler(&dir, &["SPX", "SPY"], source);

        let report = scheduler.tick().await;
        assert_eq!(report.stored(), 1);
        assert_eq!(report.failed(), 1);

        let spx = Ticker::new("SPX").unwrap();
        let spy = Ticker::new("SPY").unwrap();
        assert!(matches!(
            report.outcomes[&spx],
            TickOutcome::SourceFailed { parse: true, .. }
        ));
        let TickOutcome::Stored(row) = &report.outcomes[&spy] else {
            panic!("SPY should have been stored");
        };
        assert_eq!(row.delta_momentum, 2);
        assert_eq!(row.premium_momentum, 30);

        let day = row.day();
        assert!(store.load(&spx, day).unwrap().is_none());
        assert_eq!(store.load(&spy, day).unwrap().unwrap().rows, vec![*row]);
    }

    #[tokio::test]
    async fn store_failure_is_reported_and_retried_next_pass() {
        let dir = TempDir::new().unwrap();
        // A regular file where the storage directory should be.
        let root = dir.path().join("optionsdata");
        fs::write(&root, b"not a directory").unwrap();
        let source = Arc::new(ScriptedSource::new(Duration::ZERO, vec![]));
        let (scheduler, store) = scheduler_at(&root, &["SPY"], source);
        let spy = Ticker::new("SPY").unwrap();

        let report = scheduler.tick().await;
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.outcomes[&spy], TickOutcome::StoreFailed { .. }));

        fs::remove_file(&root).unwrap();
        let report = scheduler.tick().await;
        let TickOutcome::Stored(row) = &report.outcomes[&spy] else {
            panic!("SPY should be stored once the directory can be created");
        };
        assert_eq!(store.load(&spy, row.day()).unwrap().unwrap().rows, vec![*row]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_polling_after_a_store_failure() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("optionsdata");
        fs::write(&root, b"not a directory").unwrap();
        let source = Arc::new(ScriptedSource::new(Duration::ZERO, vec![]));
        let (scheduler, store) = scheduler_at(&root, &["SPY"], Arc::clone(&source));

        let cancel = CancellationToken::new();
        let runner = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        // Passes at 0s and 30s hit the blocker; the one at 60s succeeds.
        tokio::time::sleep(Duration::from_secs(45)).await;
        fs::remove_file(&root).unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        assert_eq!(runner.await.unwrap(), 3);

        assert_eq!(source.starts_for("SPY").len(), 3);
        let day = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let stored = store.load(&Ticker::new("SPY").unwrap(), day).unwrap().unwrap();
        assert_eq!(stored.rows.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn short_pass_sleeps_for_the_remainder() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new(Duration::from_secs(5), vec![]));
        let (scheduler, _store) = scheduler(&dir, &["SPY"], Arc::clone(&source));

        let cancel = CancellationToken::new();
        let runner = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(70)).await;
        cancel.cancel();
        let passes = runner.await.unwrap();
        assert_eq!(passes, 3);

        let starts = source.starts_for("SPY");
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(30));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_pass_starts_next_immediately() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new(Duration::from_secs(35), vec![]));
        let (scheduler, _store) = scheduler(&dir, &["SPY"], Arc::clone(&source));

        let cancel = CancellationToken::new();
        let runner = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(80)).await;
        cancel.cancel();
        runner.await.unwrap();

        let starts = source.starts_for("SPY");
        assert!(starts.len() >= 3);
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(35));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_pause() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new(Duration::ZERO, vec![]));
        let (scheduler, _store) = scheduler(&dir, &["SPY"], source);

        let cancel = CancellationToken::new();
        let runner = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = Instant::now();
        cancel.cancel();
        assert_eq!(runner.await.unwrap(), 1);
        assert!(Instant::now() - before < Duration::from_secs(29));
    }
}
