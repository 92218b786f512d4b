//! Running several coupon attempts against one page, one after another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use clipp_core::{AppConfig, StoreConfig};
use futures::stream::{self, Stream, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::BatchError;
use crate::executor::{run_attempt, ExecutorSettings, Mode, TestError, TestResult};
use crate::observe::SettleTiming;
use crate::page::Page;
use crate::prober::Prober;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub executor: ExecutorSettings,
    /// Pause between consecutive attempts in a batch.
    pub test_delay: Duration,
    /// Codes not started within this long after the batch began are
    /// reported as timed out.
    pub batch_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            executor: ExecutorSettings::default(),
            test_delay: Duration::from_secs(2),
            batch_timeout: None,
        }
    }
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            executor: ExecutorSettings {
                settle: SettleTiming {
                    timeout: config.settle_timeout(),
                    ..SettleTiming::default()
                },
                ..ExecutorSettings::default()
            },
            test_delay: config.test_delay(),
            batch_timeout: config.batch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub results: Vec<TestResult>,
    pub best_result: Option<TestResult>,
    pub tested_count: usize,
    pub success_count: usize,
}

/// Progress of a batch run. `current` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEvent {
    Testing {
        current: usize,
        total: usize,
        code: String,
    },
    Tested {
        current: usize,
        total: usize,
        result: TestResult,
    },
    Complete {
        summary: BatchSummary,
    },
}

/// Clears the in-flight flag when the batch ends or its stream is dropped.
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One page plus the state of coupon work done against it.
///
/// At most one batch runs per session; single attempts wait for the page
/// while a batch holds it.
pub struct PageSession<P> {
    page: Arc<Mutex<P>>,
    in_flight: Arc<AtomicBool>,
    settings: SessionSettings,
    last_summary: Arc<StdMutex<Option<BatchSummary>>>,
}

impl<P> Clone for PageSession<P> {
    fn clone(&self) -> Self {
        Self {
            page: Arc::clone(&self.page),
            in_flight: Arc::clone(&self.in_flight),
            settings: self.settings.clone(),
            last_summary: Arc::clone(&self.last_summary),
        }
    }
}

impl<P: Page + 'static> PageSession<P> {
    #[must_use]
    pub fn new(page: P, settings: SessionSettings) -> Self {
        Self {
            page: Arc::new(Mutex::new(page)),
            in_flight: Arc::new(AtomicBool::new(false)),
            settings,
            last_summary: Arc::new(StdMutex::new(None)),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// `true` while a batch is running.
    #[must_use]
    pub fn is_testing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Summary of the most recently completed batch.
    #[must_use]
    pub fn last_summary(&self) -> Option<BatchSummary> {
        self.last_summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs `f` against the page once no batch holds it.
    pub async fn with_page<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        let page = self.page.lock().await;
        f(&page)
    }

    /// Tries `code` and reports what happened; the code stays in the field
    /// only if it worked.
    pub async fn test_coupon(&self, code: &str, store: &StoreConfig) -> TestResult {
        self.single(code, store, Mode::Test).await
    }

    /// Enters `code` and submits it when an apply control exists.
    pub async fn apply_coupon(&self, code: &str, store: &StoreConfig) -> TestResult {
        self.single(code, store, Mode::Apply).await
    }

    async fn single(&self, code: &str, store: &StoreConfig, mode: Mode) -> TestResult {
        let prober = Prober::new(store);
        let mut page = self.page.lock().await;
        run_attempt(&mut *page, &prober, code, mode, &self.settings.executor).await
    }

    /// Starts a batch and returns its progress as a stream ending with
    /// [`BatchEvent::Complete`].
    ///
    /// The session counts as busy from this call until the stream completes
    /// or is dropped.
    ///
    /// # Errors
    ///
    /// [`BatchError::AlreadyInProgress`] if another batch is running.
    pub fn events(
        &self,
        codes: Vec<String>,
        store: &StoreConfig,
    ) -> Result<impl Stream<Item = BatchEvent> + Send + 'static, BatchError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BatchError::AlreadyInProgress)?;
        let guard = FlightGuard(Arc::clone(&self.in_flight));

        info!(store = %store.store_id, count = codes.len(), "starting coupon batch");
        let run = BatchRun {
            guard: Some(guard),
            page: Arc::clone(&self.page),
            lock: None,
            prober: Prober::new(store),
            deadline: self.settings.batch_timeout.map(|t| Instant::now() + t),
            settings: self.settings.clone(),
            codes,
            results: Vec::new(),
            best: None,
            last_summary: Arc::clone(&self.last_summary),
        };

        Ok(stream::unfold((run, Step::Announce(0)), |(mut run, step)| async move {
            match step {
                Step::Announce(i) if i < run.codes.len() => {
                    if i > 0 && !run.past_deadline() {
                        tokio::time::sleep(run.settings.test_delay).await;
                    }
                    let event = BatchEvent::Testing {
                        current: i + 1,
                        total: run.codes.len(),
                        code: run.codes[i].clone(),
                    };
                    Some((event, (run, Step::Run(i))))
                }
                Step::Run(i) => {
                    let result = run.attempt(i).await;
                    run.record(&result);
                    let event = BatchEvent::Tested {
                        current: i + 1,
                        total: run.codes.len(),
                        result,
                    };
                    Some((event, (run, Step::Announce(i + 1))))
                }
                Step::Announce(_) => {
                    let summary = run.finish();
                    Some((BatchEvent::Complete { summary }, (run, Step::Done)))
                }
                Step::Done => None,
            }
        }))
    }

    /// Tries each code in order, reporting progress to `on_progress`.
    ///
    /// # Errors
    ///
    /// [`BatchError::AlreadyInProgress`] if another batch is running.
    pub async fn test_all(
        &self,
        codes: Vec<String>,
        store: &StoreConfig,
        mut on_progress: impl FnMut(&BatchEvent),
    ) -> Result<BatchSummary, BatchError> {
        let events = self.events(codes, store)?;
        let mut events = std::pin::pin!(events);
        let mut summary = BatchSummary::default();
        while let Some(event) = events.next().await {
            on_progress(&event);
            if let BatchEvent::Complete { summary: done } = event {
                summary = done;
            }
        }
        Ok(summary)
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Announce(usize),
    Run(usize),
    Done,
}

struct BatchRun<P> {
    guard: Option<FlightGuard>,
    page: Arc<Mutex<P>>,
    lock: Option<OwnedMutexGuard<P>>,
    prober: Prober,
    settings: SessionSettings,
    deadline: Option<Instant>,
    codes: Vec<String>,
    results: Vec<TestResult>,
    best: Option<usize>,
    last_summary: Arc<StdMutex<Option<BatchSummary>>>,
}

impl<P: Page + 'static> BatchRun<P> {
    fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    async fn attempt(&mut self, i: usize) -> TestResult {
        let code = &self.codes[i];
        if self.past_deadline() {
            warn!(code, "batch deadline passed, skipping code");
            return TestResult::failed(code, TestError::TimedOut);
        }
        let mut page = match self.lock.take() {
            Some(page) => page,
            None => Arc::clone(&self.page).lock_owned().await,
        };
        let result = run_attempt(
            &mut *page,
            &self.prober,
            code,
            Mode::Test,
            &self.settings.executor,
        )
        .await;
        self.lock = Some(page);
        result
    }

    fn record(&mut self, result: &TestResult) {
        self.results.push(result.clone());
        if !result.success {
            return;
        }
        let beats_best = match self.best {
            None => true,
            Some(best) => result.savings > self.results[best].savings,
        };
        if beats_best {
            self.best = Some(self.results.len() - 1);
        }
    }

    fn finish(&mut self) -> BatchSummary {
        self.lock = None;
        let results = std::mem::take(&mut self.results);
        let summary = BatchSummary {
            best_result: self.best.take().map(|i| results[i].clone()),
            tested_count: results.len(),
            success_count: results.iter().filter(|r| r.success).count(),
            results,
        };
        info!(
            tested = summary.tested_count,
            succeeded = summary.success_count,
            best_savings = %summary.best_result.as_ref().map_or(Decimal::ZERO, |r| r.savings),
            "coupon batch complete"
        );
        *self
            .last_summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
        self.guard = None;
        summary
    }
}
