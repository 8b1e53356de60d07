//! Timing snapshot of one executor run.

use serde::Serialize;
use std::time::Duration;

/// Wall-clock time spent by a single batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchTiming {
    pub index: usize,
    pub task_id: String,
    pub start: usize,
    pub end: usize,
    pub duration: Duration,
}

/// Snapshot returned by [`Executor::stats`](super::Executor::stats).
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub id: String,
    pub total_count: usize,
    pub batch_count: usize,
    pub batch_size: usize,
    /// Time from the start of `run` until every batch had returned.
    pub run_duration: Option<Duration>,
    /// Time from the start of `run` until aggregation finished.
    pub elapsed: Option<Duration>,
    /// Per-batch timings in ascending index order. Batches that panicked are absent.
    pub batches: Vec<BatchTiming>,
}

impl RunStats {
    /// Slowest batch, if any finished.
    pub fn slowest(&self) -> Option<&BatchTiming> {
        self.batches.iter().max_by_key(|t| t.duration)
    }

    /// Sum of the per-batch durations; exceeds `run_duration` when batches overlapped.
    pub fn busy_time(&self) -> Duration {
        self.batches.iter().map(|t| t.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(index: usize, ms: u64) -> BatchTiming {
        BatchTiming {
            index,
            task_id: format!("t-batch-{}", index),
            start: index * 10,
            end: index * 10 + 10,
            duration: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_slowest_and_busy_time() {
        let stats = RunStats {
            id: "t".to_string(),
            total_count: 30,
            batch_count: 3,
            batch_size: 10,
            run_duration: Some(Duration::from_millis(40)),
            elapsed: None,
            batches: vec![timing(0, 10), timing(1, 40), timing(2, 25)],
        };
        assert_eq!(stats.slowest().map(|t| t.index), Some(1));
        assert_eq!(stats.busy_time(), Duration::from_millis(75));
    }

    #[test]
    fn test_serializes_to_json() {
        let stats = RunStats {
            id: "t".to_string(),
            total_count: 0,
            batch_count: 1,
            batch_size: 0,
            run_duration: None,
            elapsed: None,
            batches: vec![],
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["batch_count"], 1);
        assert!(json["elapsed"].is_null());
        assert!(stats.slowest().is_none());
    }
}
