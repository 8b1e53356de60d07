//! Batch planning: how many batches, and where each one starts and ends.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Upper bound on concurrent batches when no configuration says otherwise.
pub const DEFAULT_MAX_BATCHES: usize = 20;

/// One row of the dynamic sizing table: collections of at most `max_items`
/// items are split into `batch_count` batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub max_items: usize,
    pub batch_count: usize,
}

impl Tier {
    pub const fn new(max_items: usize, batch_count: usize) -> Self {
        Self {
            max_items,
            batch_count,
        }
    }
}

fn default_tiers() -> Vec<Tier> {
    vec![
        Tier::new(100, 1),
        Tier::new(500, 4),
        Tier::new(1000, 8),
        Tier::new(2000, 16),
    ]
}

fn default_scale_down() -> usize {
    1
}

fn default_max_batches() -> usize {
    DEFAULT_MAX_BATCHES
}

/// Planner configuration.
///
/// Collections larger than the last tier get `max_batches` batches, which may
/// lower the fan-out cap but never raise it above [`DEFAULT_MAX_BATCHES`].
/// `scale_down` divides every tier limit, so the whole table can be exercised
/// with small samples (a factor of 100 turns the 100/500/1000/2000 limits into
/// 1/5/10/20).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<Tier>,
    #[serde(default = "default_scale_down")]
    pub scale_down: usize,
    #[serde(default = "default_max_batches")]
    pub max_batches: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            scale_down: default_scale_down(),
            max_batches: default_max_batches(),
        }
    }
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale_down(mut self, factor: usize) -> Self {
        self.scale_down = factor;
        self
    }

    pub fn with_max_batches(mut self, max: usize) -> Self {
        self.max_batches = max;
        self
    }

    pub fn with_tiers(mut self, tiers: Vec<Tier>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Check the table is usable: non-empty, strictly ascending limits, and every
    /// batch count within `1..=max_batches`.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String, field: String| {
            Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(field)
                    .with_source("planner"),
            )
        };

        if self.scale_down == 0 {
            return Err(invalid(
                "scale_down must be at least 1".to_string(),
                "scale_down".to_string(),
            ));
        }
        if self.max_batches == 0 || self.max_batches > DEFAULT_MAX_BATCHES {
            return Err(invalid(
                format!(
                    "max_batches {} outside 1..={}",
                    self.max_batches, DEFAULT_MAX_BATCHES
                ),
                "max_batches".to_string(),
            ));
        }
        if self.tiers.is_empty() {
            return Err(invalid(
                "at least one tier is required".to_string(),
                "tiers".to_string(),
            ));
        }
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.batch_count == 0 || tier.batch_count > self.max_batches {
                return Err(invalid(
                    format!(
                        "batch_count {} outside 1..={}",
                        tier.batch_count, self.max_batches
                    ),
                    format!("tiers[{}].batch_count", i),
                ));
            }
            if i > 0 && tier.max_items <= self.tiers[i - 1].max_items {
                return Err(invalid(
                    format!(
                        "max_items {} is not greater than the previous tier's {}",
                        tier.max_items,
                        self.tiers[i - 1].max_items
                    ),
                    format!("tiers[{}].max_items", i),
                ));
            }
        }
        Ok(())
    }
}

/// How batch sizes are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingMode {
    /// Pick the batch count from the tier table.
    #[default]
    Dynamic,
    /// Use a caller supplied batch size.
    Fixed(usize),
}

/// Half-open index range `[start, end)` owned by one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BatchRange {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl BatchRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<BatchRange> for Range<usize> {
    fn from(r: BatchRange) -> Self {
        r.as_range()
    }
}

/// Immutable result of planning.
///
/// `batch_count * batch_size` may fall short of `total_count`; the last range
/// absorbs the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub batch_count: usize,
    pub batch_size: usize,
    pub total_count: usize,
}

impl BatchPlan {
    /// Range of batch `index`. The last batch always ends at `total_count`.
    pub fn range(&self, index: usize) -> BatchRange {
        let start = (index * self.batch_size).min(self.total_count);
        let end = if index + 1 == self.batch_count {
            self.total_count
        } else {
            (start + self.batch_size).min(self.total_count)
        };
        BatchRange { index, start, end }
    }

    pub fn ranges(&self) -> Vec<BatchRange> {
        (0..self.batch_count).map(|i| self.range(i)).collect()
    }
}

/// Computes a [`BatchPlan`] from a total item count.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn plan(&self, total_count: usize, mode: SizingMode) -> Result<BatchPlan> {
        let plan = match mode {
            SizingMode::Dynamic => self.plan_dynamic(total_count),
            SizingMode::Fixed(batch_size) => self.plan_fixed(total_count, batch_size)?,
        };
        debug!(
            total_count,
            batch_count = plan.batch_count,
            batch_size = plan.batch_size,
            "planned batches"
        );
        Ok(plan)
    }

    /// Number of batches the tier table assigns to `total_count` items.
    pub fn dynamic_batch_count(&self, total_count: usize) -> usize {
        let scale = self.config.scale_down.max(1);
        self.config
            .tiers
            .iter()
            .find(|tier| total_count <= tier.max_items / scale)
            .map(|tier| tier.batch_count)
            .unwrap_or(self.config.max_batches)
    }

    fn plan_dynamic(&self, total_count: usize) -> BatchPlan {
        let batch_count = self.dynamic_batch_count(total_count);
        BatchPlan {
            batch_count,
            batch_size: total_count / batch_count,
            total_count,
        }
    }

    fn plan_fixed(&self, total_count: usize, batch_size: usize) -> Result<BatchPlan> {
        if batch_size == 0 {
            return Err(Error::validation_with_context(
                "fixed batch size must be positive",
                ErrorContext::new()
                    .with_field_path("batch_size")
                    .with_details("got 0")
                    .with_source("planner"),
            ));
        }
        let batch_count = (total_count / batch_size).clamp(1, self.config.max_batches);
        Ok(BatchPlan {
            batch_count,
            batch_size,
            total_count,
        })
    }
}
