//! Mock batch units shared by the integration tests.

#![allow(dead_code)]

use batchproc::batch::{BatchRange, BatchUnit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `1..=n` as a shared collection.
pub fn sequence(n: i64) -> Arc<Vec<i64>> {
    Arc::new((1..=n).collect())
}

pub fn sum(parts: Vec<i64>) -> i64 {
    parts.into_iter().sum()
}

/// Sums its range.
#[derive(Debug, Default)]
pub struct SumUnit {
    result: i64,
}

#[async_trait::async_trait]
impl BatchUnit<Vec<i64>> for SumUnit {
    type Output = i64;

    async fn compute(
        &mut self,
        range: BatchRange,
        data: &Vec<i64>,
        _scope: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.result += data[range.as_range()].iter().sum::<i64>();
        Ok(())
    }

    fn result(&self) -> i64 {
        self.result
    }
}

/// Always fails.
#[derive(Debug, Default)]
pub struct FailingUnit;

#[async_trait::async_trait]
impl BatchUnit<Vec<i64>> for FailingUnit {
    type Output = i64;

    async fn compute(
        &mut self,
        _range: BatchRange,
        _data: &Vec<i64>,
        _scope: &CancellationToken,
    ) -> anyhow::Result<()> {
        anyhow::bail!("test batch compute error")
    }

    fn result(&self) -> i64 {
        0
    }
}

/// Sums its range, except the batch whose index is `fail_at`, which fails
/// straight away. The others wait for the scope to be cancelled (or `patience`
/// to pass) before finishing, and count how many saw the cancellation.
#[derive(Debug)]
pub struct PatientUnit {
    pub fail_at: usize,
    pub patience: Duration,
    pub saw_cancel: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
    result: i64,
}

impl PatientUnit {
    pub fn new(fail_at: usize, saw_cancel: Arc<AtomicUsize>, finished: Arc<AtomicUsize>) -> Self {
        Self {
            fail_at,
            patience: Duration::from_secs(10),
            saw_cancel,
            finished,
            result: 0,
        }
    }
}

#[async_trait::async_trait]
impl BatchUnit<Vec<i64>> for PatientUnit {
    type Output = i64;

    async fn compute(
        &mut self,
        range: BatchRange,
        data: &Vec<i64>,
        scope: &CancellationToken,
    ) -> anyhow::Result<()> {
        if range.index == self.fail_at {
            self.finished.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("batch {} refused", range.index);
        }
        tokio::select! {
            _ = scope.cancelled() => {
                self.saw_cancel.fetch_add(1, Ordering::SeqCst);
            }
            _ = tokio::time::sleep(self.patience) => {}
        }
        self.result = data[range.as_range()].iter().sum();
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn result(&self) -> i64 {
        self.result
    }
}

/// Records the range it was given, and panics on a chosen batch.
#[derive(Debug)]
pub struct RecordingUnit {
    pub seen: Arc<Mutex<Vec<BatchRange>>>,
    pub panic_at: Option<usize>,
}

#[async_trait::async_trait]
impl BatchUnit<Vec<i64>> for RecordingUnit {
    type Output = usize;

    async fn compute(
        &mut self,
        range: BatchRange,
        _data: &Vec<i64>,
        _scope: &CancellationToken,
    ) -> anyhow::Result<()> {
        if self.panic_at == Some(range.index) {
            panic!("unit exploded on batch {}", range.index);
        }
        self.seen.lock().unwrap().push(range);
        Ok(())
    }

    fn result(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}
