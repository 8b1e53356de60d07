//! The batch unit contract and its factory.

use super::planner::BatchRange;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A caller-defined computation over one batch of a shared collection.
///
/// Each unit receives exactly one `compute` call per run, with a range disjoint
/// from every other unit's. Implementations must only touch `collection` inside
/// `range`, must tolerate an empty range, and should poll `scope` if they expect
/// to run for a long time: it is cancelled once any sibling batch fails.
///
/// On the multi-thread runtime a CPU-heavy unit may wrap its work in
/// [`tokio::task::block_in_place`] so the other batches keep running.
/// `block_in_place` panics on a current-thread runtime; units meant to run
/// there should instead call [`tokio::task::yield_now`] between chunks.
#[async_trait]
pub trait BatchUnit<C: ?Sized + Sync>: Send + 'static {
    /// Partial result handed to the aggregation step.
    type Output: Send;

    async fn compute(
        &mut self,
        range: BatchRange,
        collection: &C,
        scope: &CancellationToken,
    ) -> anyhow::Result<()>;

    /// Stored partial result. Only meaningful after `compute` returned `Ok`.
    fn result(&self) -> Self::Output;
}

/// Adapts a synchronous closure into a [`BatchUnit`].
///
/// The closure's return value becomes the unit's result; before a successful
/// call the result is `R::default()`.
///
/// ```rust
/// use batchproc::batch::{BatchRange, FnUnit};
///
/// let factory = || FnUnit::new(|r: BatchRange, data: &Vec<u64>| {
///     Ok(data[r.as_range()].iter().sum::<u64>())
/// });
/// # let _ = factory;
/// ```
pub struct FnUnit<F, R> {
    func: F,
    output: R,
}

impl<F, R: Default> FnUnit<F, R> {
    pub fn new<C>(func: F) -> Self
    where
        C: ?Sized,
        F: FnMut(BatchRange, &C) -> anyhow::Result<R>,
    {
        Self {
            func,
            output: R::default(),
        }
    }
}

#[async_trait]
impl<C, F, R> BatchUnit<C> for FnUnit<F, R>
where
    C: ?Sized + Sync,
    F: FnMut(BatchRange, &C) -> anyhow::Result<R> + Send + 'static,
    R: Default + Clone + Send + 'static,
{
    type Output = R;

    async fn compute(
        &mut self,
        range: BatchRange,
        collection: &C,
        _scope: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.output = (self.func)(range, collection)?;
        Ok(())
    }

    fn result(&self) -> R {
        self.output.clone()
    }
}
