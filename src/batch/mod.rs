//! # Batch Processing Module
//!
//! Splits an indexable collection into a bounded number of contiguous batches,
//! computes every batch concurrently, then folds the partial results.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Planner`] | Chooses batch count and size from a tier table or a fixed size |
//! | [`PlannerConfig`] | Tier table, scale-down factor and fan-out cap |
//! | [`BatchUnit`] | Caller-defined computation over one batch |
//! | [`FnUnit`] | Adapts a synchronous closure into a [`BatchUnit`] |
//! | [`Executor`] | Spawns one task per batch, joins them, and aggregates |
//! | [`RunStats`] | Per-batch and whole-run timings |
//!
//! ## Sizing
//!
//! | Items | Batches |
//! |-------|---------|
//! | ≤ 100 | 1 |
//! | ≤ 500 | 4 |
//! | ≤ 1000 | 8 |
//! | ≤ 2000 | 16 |
//! | more | 20 |
//!
//! A fixed batch size bypasses the table; the count is then `total / size`,
//! kept within `1..=max_batches`, and the last batch takes the remainder.
//!
//! ## Failure
//!
//! The first failing batch cancels the run's
//! [`CancellationToken`](tokio_util::sync::CancellationToken) scope. `run` still
//! waits for every batch before returning that first error.

mod executor;
mod planner;
mod stats;
mod unit;

pub use executor::{Executor, ExecutorBuilder, ExecutorState};
pub use planner::{
    BatchPlan, BatchRange, Planner, PlannerConfig, SizingMode, Tier, DEFAULT_MAX_BATCHES,
};
pub use stats::{BatchTiming, RunStats};
pub use unit::{BatchUnit, FnUnit};
