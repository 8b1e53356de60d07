//! First-error propagation, cancellation of sibling batches, and panics.

mod common;

use batchproc::batch::{Executor, ExecutorState};
use batchproc::Error;
use common::{sequence, FailingUnit, PatientUnit, RecordingUnit, SumUnit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_failing_units_fail_the_run() {
    for count in [10, 300, 2000, 5000] {
        let data = sequence(count);
        let mut executor =
            Executor::new("unit-test", data.len(), data, FailingUnit::default).unwrap();
        let err = executor.run().await.unwrap_err();
        let batch = err.batch().expect("batch error");
        assert!(batch.index < executor.batch_count());
        assert!(err.to_string().contains("test batch compute error"));
        assert_eq!(executor.state(), ExecutorState::Failed);
        assert!(matches!(executor.aggregate(|parts| parts), Err(Error::Lifecycle { .. })));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_any_single_failing_index_fails_the_run() {
    for fail_at in [0usize, 3, 7] {
        let data = sequence(1000);
        let saw_cancel = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (c, f) = (Arc::clone(&saw_cancel), Arc::clone(&finished));
        let mut executor = Executor::new("fail-one", data.len(), data, move || {
            PatientUnit::new(fail_at, Arc::clone(&c), Arc::clone(&f))
        })
        .unwrap();
        assert_eq!(executor.batch_count(), 8);

        let started = Instant::now();
        let err = executor.run().await.unwrap_err();

        // the patient batches were released by cancellation, not by their timeout
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(err.batch().map(|b| b.index), Some(fail_at));
        let expected_task = format!("fail-one-batch-{}", fail_at);
        assert_eq!(
            err.batch().map(|b| b.task_id.as_str()),
            Some(expected_task.as_str())
        );
        // barrier: every batch returned before run did
        assert_eq!(finished.load(Ordering::SeqCst), 8);
        assert_eq!(saw_cancel.load(Ordering::SeqCst), 7);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parent_cancellation_reaches_running_batches() {
    let parent = tokio_util::sync::CancellationToken::new();
    let data = sequence(500);
    let saw_cancel = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (c, f) = (Arc::clone(&saw_cancel), Arc::clone(&finished));
    let mut executor = Executor::builder("external", data.len(), data)
        .with_cancellation(parent.clone())
        .build(move || PatientUnit::new(usize::MAX, Arc::clone(&c), Arc::clone(&f)))
        .unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        parent.cancel();
    });

    // units that observe cancellation still return Ok, so the run succeeds
    executor.run().await.unwrap();
    canceller.await.unwrap();
    assert_eq!(saw_cancel.load(Ordering::SeqCst), 4);
    let total = executor
        .aggregate(|parts: Vec<i64>| parts.into_iter().sum::<i64>())
        .unwrap();
    assert_eq!(total, 125_250);
}

#[tokio::test]
async fn test_panicking_unit_is_reported() {
    let data = sequence(500);
    let mut executor = Executor::new("panicky", data.len(), data, || RecordingUnit {
        seen: Arc::new(Mutex::new(Vec::new())),
        panic_at: Some(2),
    })
    .unwrap();
    let err = executor.run().await.unwrap_err();
    match &err {
        Error::Runtime { message, context } => {
            assert!(message.contains("panicky-batch-2"));
            assert_eq!(
                context.details.as_deref(),
                Some("unit exploded on batch 2")
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(executor.state(), ExecutorState::Failed);
    // the panicking batch has no timing entry
    assert_eq!(executor.stats().batches.len(), 3);
}

#[tokio::test]
async fn test_success_after_failure_needs_new_executor() {
    let data = sequence(300);
    let mut failed =
        Executor::new("retry", data.len(), Arc::clone(&data), FailingUnit::default).unwrap();
    assert!(failed.run().await.is_err());
    assert!(matches!(failed.run().await, Err(Error::Lifecycle { .. })));

    let mut fresh = Executor::new("retry", data.len(), data, SumUnit::default).unwrap();
    fresh.run().await.unwrap();
    assert_eq!(fresh.aggregate(common::sum).unwrap(), 45_150);
}
