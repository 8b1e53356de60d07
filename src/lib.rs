//! # batchproc
//!
//! Concurrent batch processing for large indexable collections.
//!
//! ## Overview
//!
//! A collection is split into at most 20 contiguous, disjoint batches. Each batch
//! is handed to its own instance of a caller-defined [`batch::BatchUnit`], all
//! batches run concurrently on the Tokio runtime, and once every one of them has
//! returned the partial results are folded by a caller-supplied function.
//!
//! ## Core Philosophy
//!
//! - **Bounded fan-out**: the batch count comes from a small tier table and never exceeds 20
//! - **Barrier join**: `run` returns only after every batch has finished
//! - **First error wins**: one failure cancels the shared scope and is the error returned
//! - **No shared mutable state**: every batch owns its unit, the collection is shared read-only
//!
//! ## Quick Start
//!
//! ```rust
//! use batchproc::batch::{BatchRange, BatchUnit, Executor};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Default)]
//! struct Sum(u64);
//!
//! #[async_trait::async_trait]
//! impl BatchUnit<Vec<u64>> for Sum {
//!     type Output = u64;
//!
//!     async fn compute(
//!         &mut self,
//!         range: BatchRange,
//!         data: &Vec<u64>,
//!         _scope: &CancellationToken,
//!     ) -> anyhow::Result<()> {
//!         self.0 += data[range.as_range()].iter().sum::<u64>();
//!         Ok(())
//!     }
//!
//!     fn result(&self) -> u64 {
//!         self.0
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> batchproc::Result<()> {
//!     let data: Arc<Vec<u64>> = Arc::new((1..=2000).collect());
//!     let mut executor = Executor::builder("main", data.len(), data)
//!         .with_batch_size(100)
//!         .build(Sum::default)?;
//!
//!     executor.run().await?;
//!     let total = executor.aggregate(|parts| parts.into_iter().sum::<u64>())?;
//!     assert_eq!(total, 2_001_000);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Planning, the unit contract, execution and statistics |
//! | [`config`] | YAML and environment loading for the planner |
//! | [`error`] | Error types |

pub mod batch;
pub mod config;

/// Error type for the library
pub mod error;
pub use error::{BatchError, Error, ErrorContext};

pub use batch::{BatchRange, BatchUnit, Executor, FnUnit, PlannerConfig};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
