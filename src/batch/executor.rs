//! Batch executor: one task per planned batch, barrier join, first error wins.

use super::planner::{BatchPlan, BatchRange, Planner, PlannerConfig, SizingMode};
use super::stats::{BatchTiming, RunStats};
use super::unit::BatchUnit;
use crate::error::BatchError;
use crate::{Error, ErrorContext, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Where an executor is in its single-use lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Constructed,
    Running,
    Completed,
    Failed,
    Aggregated,
}

/// Collects construction options for an [`Executor`].
pub struct ExecutorBuilder<C: ?Sized> {
    id: String,
    total_count: usize,
    collection: Arc<C>,
    sizing: SizingMode,
    planner: PlannerConfig,
    cancel: Option<CancellationToken>,
}

impl<C> ExecutorBuilder<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    /// Override dynamic sizing with a fixed batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.sizing = SizingMode::Fixed(batch_size);
        self
    }

    pub fn with_sizing(mut self, sizing: SizingMode) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_planner(mut self, config: PlannerConfig) -> Self {
        self.planner = config;
        self
    }

    /// Parent scope. Cancelling it cancels every batch scope of the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Plan the batches and call `factory` once per batch, in index order, so
    /// every batch owns a fresh unit.
    pub fn build<U, F>(self, mut factory: F) -> Result<Executor<C, U>>
    where
        U: BatchUnit<C>,
        F: FnMut() -> U,
    {
        let planner = Planner::new(self.planner)?;
        let plan = planner.plan(self.total_count, self.sizing)?;
        let batches = (0..plan.batch_count)
            .map(|_| Some(factory()))
            .collect();

        let id = if self.id.is_empty() {
            uuid::Uuid::new_v4().simple().to_string()
        } else {
            self.id
        };

        info!(
            executor = %id,
            total_count = plan.total_count,
            batch_count = plan.batch_count,
            batch_size = plan.batch_size,
            "batch executor created"
        );

        Ok(Executor {
            id,
            collection: self.collection,
            plan,
            batches,
            parent: self.cancel.unwrap_or_else(CancellationToken::new),
            state: ExecutorState::Constructed,
            started_at: None,
            run_duration: None,
            elapsed: None,
            timings: Vec::new(),
        })
    }
}

/// Runs a user-supplied [`BatchUnit`] over contiguous, disjoint slices of a shared
/// collection and folds the partial results.
///
/// An executor is single use: `run` once, then `aggregate` once.
///
/// ```rust
/// use batchproc::batch::{BatchRange, Executor, FnUnit};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> batchproc::Result<()> {
/// let data: Arc<Vec<u64>> = Arc::new((1..=2000).collect());
/// let mut executor = Executor::new("sum", data.len(), data, || {
///     FnUnit::new(|r: BatchRange, d: &Vec<u64>| Ok(d[r.as_range()].iter().sum::<u64>()))
/// })?;
/// assert_eq!(executor.batch_count(), 16);
///
/// executor.run().await?;
/// let total = executor.aggregate(|parts| parts.into_iter().sum::<u64>())?;
/// assert_eq!(total, 2_001_000);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Executor<C: ?Sized, U> {
    id: String,
    collection: Arc<C>,
    plan: BatchPlan,
    batches: Vec<Option<U>>,
    parent: CancellationToken,
    state: ExecutorState,
    started_at: Option<Instant>,
    run_duration: Option<Duration>,
    elapsed: Option<Duration>,
    timings: Vec<BatchTiming>,
}

struct Finished<U> {
    range: BatchRange,
    duration: Duration,
    outcome: std::result::Result<(U, anyhow::Result<()>), Box<dyn Any + Send>>,
}

impl<C> Executor<C, ()>
where
    C: ?Sized + Send + Sync + 'static,
{
    /// Start configuring an executor over `collection`, of which the first
    /// `total_count` items are processed. An empty `id` gets a random one.
    pub fn builder(
        id: impl Into<String>,
        total_count: usize,
        collection: Arc<C>,
    ) -> ExecutorBuilder<C> {
        ExecutorBuilder {
            id: id.into(),
            total_count,
            collection,
            sizing: SizingMode::Dynamic,
            planner: PlannerConfig::default(),
            cancel: None,
        }
    }
}

impl<C, U> Executor<C, U>
where
    C: ?Sized + Send + Sync + 'static,
    U: BatchUnit<C>,
{
    /// Dynamic sizing with the default tier table and no parent scope.
    pub fn new<F>(
        id: impl Into<String>,
        total_count: usize,
        collection: Arc<C>,
        factory: F,
    ) -> Result<Self>
    where
        F: FnMut() -> U,
    {
        Executor::builder(id, total_count, collection).build(factory)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn batch_count(&self) -> usize {
        self.plan.batch_count
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Time from the start of `run` to the end of `aggregate`; set by `aggregate`.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Diagnostic name of batch `index`.
    pub fn task_id(&self, index: usize) -> String {
        format!("{}-batch-{}", self.id, index)
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            id: self.id.clone(),
            total_count: self.plan.total_count,
            batch_count: self.plan.batch_count,
            batch_size: self.plan.batch_size,
            run_duration: self.run_duration,
            elapsed: self.elapsed,
            batches: self.timings.clone(),
        }
    }

    /// Compute every batch concurrently and wait for all of them.
    ///
    /// When a batch fails, the shared scope is cancelled, the remaining batches are
    /// still awaited, and the first failure observed is returned. Later failures are
    /// logged and dropped.
    pub async fn run(&mut self) -> Result<()> {
        if self.state != ExecutorState::Constructed {
            return Err(Error::lifecycle_with_context(
                "run may only be called once",
                ErrorContext::new()
                    .with_details(format!("state is {:?}", self.state))
                    .with_source("executor"),
            ));
        }
        if self.parent.is_cancelled() {
            warn!(executor = %self.id, "parent scope cancelled before run");
            self.state = ExecutorState::Failed;
            return Err(Error::Cancelled {
                id: self.id.clone(),
            });
        }

        self.state = ExecutorState::Running;
        let started = Instant::now();
        self.started_at = Some(started);
        info!(executor = %self.id, batch_count = self.plan.batch_count, "batch run starting");

        let scope = self.parent.child_token();
        let mut tasks = JoinSet::new();
        for index in 0..self.plan.batch_count {
            let Some(mut unit) = self.batches[index].take() else {
                continue;
            };
            let range = self.plan.range(index);
            let collection = Arc::clone(&self.collection);
            let scope = scope.clone();
            let span = info_span!("batch", task = %self.task_id(index));

            tasks.spawn(
                async move {
                    let begun = Instant::now();
                    let outcome = AssertUnwindSafe(async move {
                        let result = unit.compute(range, &*collection, &scope).await;
                        (unit, result)
                    })
                    .catch_unwind()
                    .await;
                    Finished {
                        range,
                        duration: begun.elapsed(),
                        outcome,
                    }
                }
                .instrument(span),
            );
        }

        let mut first_error: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(finished) => self.settle(finished),
                Err(join_err) => Some(Error::runtime_with_context(
                    "batch task did not complete",
                    ErrorContext::new()
                        .with_details(join_err.to_string())
                        .with_source("executor"),
                )),
            };
            let Some(err) = failure else { continue };
            if first_error.is_none() {
                warn!(
                    executor = %self.id,
                    error = %err,
                    "batch failed, cancelling remaining batches"
                );
                scope.cancel();
                first_error = Some(err);
            } else {
                debug!(executor = %self.id, error = %err, "dropping subsequent batch failure");
            }
        }

        self.timings.sort_by_key(|t| t.index);
        let run_duration = started.elapsed();
        self.run_duration = Some(run_duration);

        match first_error {
            Some(err) => {
                self.state = ExecutorState::Failed;
                Err(err)
            }
            None => {
                self.state = ExecutorState::Completed;
                info!(
                    executor = %self.id,
                    duration_ms = run_duration.as_millis() as u64,
                    "batch run completed"
                );
                Ok(())
            }
        }
    }

    /// Put the unit back in its slot and turn a failed outcome into an error.
    fn settle(&mut self, finished: Finished<U>) -> Option<Error> {
        let Finished {
            range,
            duration,
            outcome,
        } = finished;
        let task_id = self.task_id(range.index);

        match outcome {
            Ok((unit, result)) => {
                self.batches[range.index] = Some(unit);
                self.timings.push(BatchTiming {
                    index: range.index,
                    task_id: task_id.clone(),
                    start: range.start,
                    end: range.end,
                    duration,
                });
                match result {
                    Ok(()) => {
                        debug!(
                            task = %task_id,
                            start = range.start,
                            end = range.end,
                            duration_us = duration.as_micros() as u64,
                            "batch finished"
                        );
                        None
                    }
                    Err(cause) => Some(Error::Batch(BatchError {
                        task_id,
                        index: range.index,
                        start: range.start,
                        end: range.end,
                        cause,
                    })),
                }
            }
            Err(payload) => Some(Error::runtime_with_context(
                format!("batch {} panicked", task_id),
                ErrorContext::new()
                    .with_details(panic_message(payload.as_ref()))
                    .with_source("executor"),
            )),
        }
    }

    /// Fold the partial results, in ascending batch order, with `combine`.
    ///
    /// Only valid once after a successful `run`. Records the elapsed time of the
    /// whole run plus aggregation.
    pub fn aggregate<A, F>(&mut self, combine: F) -> Result<A>
    where
        F: FnOnce(Vec<U::Output>) -> A,
    {
        if self.state != ExecutorState::Completed {
            return Err(Error::lifecycle_with_context(
                "aggregate requires a successfully completed run",
                ErrorContext::new()
                    .with_details(format!("state is {:?}", self.state))
                    .with_source("executor"),
            ));
        }

        let results = self
            .batches
            .iter()
            .map(|slot| slot.as_ref().map(|unit| unit.result()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                Error::runtime_with_context(
                    "batch unit missing after run",
                    ErrorContext::new().with_source("executor"),
                )
            })?;

        let value = combine(results);

        let elapsed = self
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.elapsed = Some(elapsed);
        self.state = ExecutorState::Aggregated;
        info!(
            executor = %self.id,
            elapsed_ns = elapsed.as_nanos() as u64,
            "batch results aggregated"
        );
        Ok(value)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
