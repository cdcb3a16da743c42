//! Cancellation, timeout and worker-failure behaviour of the scheduler.

use std::thread;
use std::time::{Duration, Instant};

use lexalign::{
    AlignConfig, AlignError, CancelToken, Entity, ExecutionError, RunStatus, Scheduler,
};

fn single_labels(prefix: &str, labels: &[&str]) -> Vec<Entity> {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| Entity::new(format!("http://{prefix}#{i}"), [*l]))
        .collect()
}

#[test]
fn cancel_stops_dispatch_and_keeps_finished_chunks() {
    let source = single_labels("a", &["stop", "x", "x", "x", "x", "x", "x", "x"]);
    let target = single_labels("b", &["x"]);

    let token = CancelToken::new();
    let trigger = token.clone();
    let scorer = move |l: &str, r: &str| {
        if l == "stop" || r == "stop" {
            trigger.cancel();
            // Keep the only worker busy until the dispatcher notices.
            thread::sleep(Duration::from_millis(100));
        }
        1.0
    };

    let config = AlignConfig::default()
        .with_parallelism(1)
        .with_chunks_per_worker(8);
    let report = Scheduler::with_scorer(config, scorer)
        .with_cancel_token(token)
        .align(&source, &target)
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(!report.is_complete());
    assert_eq!(report.chunks_total, 8);
    assert_eq!(report.chunks_completed, 1);
    // The in-flight chunk ran to completion.
    assert_eq!(report.matches.len(), 1);
    assert!(report.matches.contains_pair("http://a#0", "http://b#0"));
}

#[test]
fn uncancelled_run_with_many_chunks_completes() {
    let source = single_labels("a", &["heart", "lung", "liver", "skin", "aorta"]);
    let target = single_labels("b", &["Heart", "Lung", "Liver"]);
    let config = AlignConfig::default()
        .with_parallelism(2)
        .with_chunks_per_worker(4);
    let report = Scheduler::new(config).align(&source, &target).unwrap();
    assert_eq!(report.status, RunStatus::Done);
    assert_eq!(report.chunks_total, 8);
    assert_eq!(report.chunks_completed, 8);
    assert_eq!(report.matches.len(), 3);
}

#[test]
fn timeout_fails_the_run_quickly() {
    let source = single_labels("a", &["x"; 40]);
    let target = single_labels("b", &["y"]);
    let slow = |_: &str, _: &str| {
        thread::sleep(Duration::from_millis(20));
        0.0
    };
    let config = AlignConfig::default()
        .with_parallelism(2)
        .with_timeout(Duration::from_millis(50));

    let started = Instant::now();
    let err = Scheduler::with_scorer(config, slow)
        .align(&source, &target)
        .unwrap_err();
    assert!(
        matches!(err, AlignError::Execution(ExecutionError::Timeout { .. })),
        "{err:?}"
    );
    // 20 pairs per chunk at 20ms each would take 400ms without the abort flag.
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[test]
fn failure_wins_over_partial_results() {
    let source = single_labels("a", &["ok", "boom", "ok", "boom"]);
    let target = single_labels("b", &["ok"]);
    let scorer = |l: &str, _: &str| {
        assert!(l != "boom", "bad label");
        1.0
    };
    let err = Scheduler::with_scorer(AlignConfig::default().with_parallelism(4), scorer)
        .align(&source, &target)
        .unwrap_err();
    assert_eq!(err.failed_chunk(), Some(1));
}

#[test]
fn failure_aborts_slow_sibling_chunks() {
    // Chunk 0 panics at once; chunk 1 holds 50 slow pairs.
    let mut labels = vec!["boom", "slow"];
    for _ in 0..49 {
        labels.extend(["idle", "slow"]);
    }
    let source = single_labels("a", &labels);
    let target = single_labels("b", &["y"]);
    let scorer = |l: &str, _: &str| {
        match l {
            "boom" => panic!("scorer failure"),
            "slow" => thread::sleep(Duration::from_millis(20)),
            _ => {}
        }
        0.0
    };

    let started = Instant::now();
    let err = Scheduler::with_scorer(AlignConfig::default().with_parallelism(2), scorer)
        .align(&source, &target)
        .unwrap_err();
    assert_eq!(err.failed_chunk(), Some(0));
    assert!(started.elapsed() < Duration::from_millis(800));
}

#[test]
fn reports_are_independent_between_runs() {
    let source = single_labels("a", &["heart"]);
    let target = single_labels("b", &["heart"]);
    let scheduler = Scheduler::new(AlignConfig::default().with_parallelism(2));
    let first = scheduler.align(&source, &target).unwrap();
    let second = scheduler.align(&source, &target).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.matches, second.matches);
}
