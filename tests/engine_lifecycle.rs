// tests/engine_lifecycle.rs

use std::error::Error;

use futures::StreamExt;
use tokio::sync::Barrier;
use tokio::time::{Duration, timeout};

use crawlflow::engine::{
    Completion, EndOutcome, EventKind, Scope, Session, Task, TaskEvent, TaskResult, first_failure,
    join_runs, task,
};
use crawlflow::errors::CrawlflowError;
use crawlflow::types::ProgressValue;
use crawlflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

/// `(label, owner)` of every event, for order assertions.
fn trace(events: &[TaskEvent]) -> Vec<(&'static str, String)> {
    events
        .iter()
        .map(|e| (e.kind.label(), e.kind.owner().to_string()))
        .collect()
}

fn position(events: &[TaskEvent], pred: impl Fn(&EventKind) -> bool) -> usize {
    events
        .iter()
        .position(|e| pred(&e.kind))
        .expect("expected event not found")
}

fn end_of<'a>(events: &'a [TaskEvent], name: &str) -> &'a EndOutcome {
    events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::TaskEnd { name: n, outcome } if n == name => Some(outcome),
            _ => None,
        })
        .expect("no TaskEnd for task")
}

fn leaf(name: &str, value: u32) -> Task<(), u32> {
    task(name.to_string(), move |mut scope| async move {
        let doubled = scope.work(|_| async move { anyhow::Ok(value * 2) }).await?;
        Ok(Completion::Done(doubled))
    })
}

fn failing(name: &str) -> Task<(), u32> {
    task(name.to_string(), |mut scope| async move {
        scope
            .work_with("Doing the thing", |_| async move {
                Err::<u32, _>(anyhow::anyhow!("upstream said no"))
            })
            .await?;
        Ok(Completion::Done(0))
    })
}

#[tokio::test]
async fn single_task_emits_bracketed_lifecycle() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("report", |mut scope| async move {
        scope
            .work_with("Counting", |w| async move {
                w.progress(ProgressValue::Count(3));
                w.description("Counted");
                anyhow::Ok(())
            })
            .await?;
        Ok(Completion::Done("ok"))
    }));
    let events = run.events();

    let result = timeout(Duration::from_secs(5), run.result()).await?;
    assert!(matches!(result, TaskResult::Ok("ok")));

    let events = timeout(Duration::from_secs(5), events.collect_all()).await?;
    let labels: Vec<_> = trace(&events).into_iter().map(|(l, _)| l).collect();
    assert_eq!(
        labels,
        vec![
            "task_start",
            "work_start",
            "work_progress",
            "work_description",
            "work_end",
            "task_end"
        ]
    );

    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..events.len() as u64).collect::<Vec<_>>());

    match &events[1].kind {
        EventKind::WorkStart { description, .. } => {
            assert_eq!(description.as_deref(), Some("Counting"))
        }
        other => panic!("expected WorkStart, got {other:?}"),
    }
    assert!(matches!(end_of(&events, "report"), EndOutcome::Done));

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn skipped_task_reports_skipped() -> TestResult {
    init_tracing();
    let session = Session::new(());
    let run = session.run_task(task("noop", |_scope| async move {
        Ok(Completion::<()>::Skipped)
    }));
    let events = run.events();

    assert!(run.result().await.is_skipped());
    let events = events.collect_all().await;
    assert!(matches!(end_of(&events, "noop"), EndOutcome::Skipped));
    Ok(())
}

#[tokio::test]
async fn yield_task_records_dependency_before_child_starts() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("parent", |mut scope| async move {
        let child = scope.yield_task(leaf("child", 21)).await?;
        Ok(Completion::Done(child.done().unwrap_or_default()))
    }));
    let events = run.events();

    let result = timeout(Duration::from_secs(5), run.result()).await?;
    assert_eq!(result.ok(), Some(42));

    let events = events.collect_all().await;
    let dep = position(&events, |k| {
        matches!(k, EventKind::TaskDependency { task, depends_on } if task == "parent" && depends_on == "child")
    });
    let child_start =
        position(&events, |k| matches!(k, EventKind::TaskStart { name } if name == "child"));
    let child_end =
        position(&events, |k| matches!(k, EventKind::TaskEnd { name, .. } if name == "child"));
    let parent_end =
        position(&events, |k| matches!(k, EventKind::TaskEnd { name, .. } if name == "parent"));

    assert!(dep < child_start);
    assert!(child_end < parent_end);
    assert_eq!(parent_end, events.len() - 1);
    Ok(())
}

#[tokio::test]
async fn yield_task_failure_shares_the_child_cause() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("parent", |mut scope| async move {
        scope.yield_task(failing("child")).await?;
        Ok(Completion::Done(()))
    }));
    let events = run.events();

    let parent_err = match run.result().await {
        TaskResult::Err(err) => err,
        other => panic!("expected failure, got {other:?}"),
    };
    assert!(parent_err.to_string().contains("upstream said no"));

    let events = events.collect_all().await;
    let child_err = match end_of(&events, "child") {
        EndOutcome::Failed(err) => err.clone(),
        other => panic!("expected child failure, got {other:?}"),
    };
    assert!(parent_err.ptr_eq(&child_err));
    Ok(())
}

#[tokio::test]
async fn spawn_keeps_declaration_order_and_does_not_cancel_siblings() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("fanout", |mut scope| async move {
        let results = scope
            .spawn(vec![leaf("a", 1), failing("b"), leaf("c", 3)])
            .await;
        let failure = first_failure(&results).map(|e| e.to_string());
        let values: Vec<Option<u32>> = results.into_iter().map(TaskResult::ok).collect();
        Ok(Completion::Done((values, failure)))
    }));
    let events = run.events();

    let (values, failure) = run.result().await.ok().expect("parent should succeed");
    assert_eq!(values, vec![Some(2), None, Some(6)]);
    assert!(failure.unwrap_or_default().contains("upstream said no"));

    let events = events.collect_all().await;
    let spawn_start = position(&events, |k| matches!(k, EventKind::SpawnStart { .. }));
    let spawn_end = position(&events, |k| matches!(k, EventKind::SpawnEnd { .. }));
    match &events[spawn_start].kind {
        EventKind::SpawnStart { parent, children } => {
            assert_eq!(parent, "fanout");
            assert_eq!(children, &vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        }
        _ => unreachable!(),
    }
    for child in ["a", "b", "c"] {
        let end =
            position(&events, |k| matches!(k, EventKind::TaskEnd { name, .. } if name == child));
        assert!(spawn_start < end && end < spawn_end, "{child} ended outside the spawn");
    }
    Ok(())
}

fn waiter(name: &str) -> Task<Barrier, ()> {
    task(name.to_string(), |mut scope: Scope<Barrier>| async move {
        scope
            .work(|w| async move {
                w.context().wait().await;
                anyhow::Ok(())
            })
            .await?;
        Ok(Completion::Done(()))
    })
}

#[tokio::test]
async fn spawned_children_run_concurrently() -> TestResult {
    init_tracing();
    // Both children block on a two-party barrier; sequential execution would hang.
    let session = Session::new(Barrier::new(2));

    let run = session.run_task(task("pair", |mut scope| async move {
        let results = scope.spawn(vec![waiter("left"), waiter("right")]).await;
        Ok(Completion::Done(results.iter().all(TaskResult::is_ok)))
    }));

    let result = timeout(Duration::from_secs(5), run.result()).await?;
    assert_eq!(result.ok(), Some(true));
    Ok(())
}

#[tokio::test]
async fn duplicate_child_names_are_rejected() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("parent", |mut scope| async move {
        scope.yield_task(leaf("twin", 1)).await?;
        let second = scope.yield_task(leaf("twin", 2)).await;
        let rejected = matches!(
            second.as_ref().err().and_then(|e| e.downcast_ref::<CrawlflowError>()),
            Some(CrawlflowError::DuplicateTask(name)) if name == "twin"
        );

        let spawned = scope.spawn(vec![leaf("twin", 3), leaf("fresh", 4)]).await;
        let spawn_rejected = matches!(
            spawned[0].err().and_then(|e| e.find::<CrawlflowError>()),
            Some(CrawlflowError::DuplicateTask(_))
        );
        Ok(Completion::Done((rejected, spawn_rejected, spawned[1].as_ref().ok().copied())))
    }));
    let events = run.events();

    let (rejected, spawn_rejected, fresh) = run.result().await.ok().expect("parent should succeed");
    assert!(rejected);
    assert!(spawn_rejected);
    assert_eq!(fresh, Some(8));

    let events = events.collect_all().await;
    let twin_starts = events
        .iter()
        .filter(|e| matches!(&e.kind, EventKind::TaskStart { name } if name == "twin"))
        .count();
    assert_eq!(twin_starts, 1);
    Ok(())
}

#[tokio::test]
async fn names_are_unique_across_runs_of_a_session() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let first = session.run_task(task("parent", |mut scope| async move {
        let value = scope.yield_task(leaf("child", 5)).await?;
        Ok(Completion::Done(value))
    }));
    assert_eq!(first.result().await.ok(), Some(10));

    for name in ["parent", "child"] {
        let again = session.run_task(leaf(name, 1));
        let events = again.events();
        match again.result().await {
            TaskResult::Err(err) => assert!(matches!(
                err.find::<CrawlflowError>(),
                Some(CrawlflowError::DuplicateTask(dup)) if dup == name
            )),
            other => panic!("expected duplicate rejection for '{name}', got {other:?}"),
        }
        assert!(events.collect_all().await.is_empty());
    }

    assert_eq!(session.run_task(leaf("other", 2)).result().await.ok(), Some(4));
    Ok(())
}

#[tokio::test]
async fn body_can_recover_from_a_failed_work_unit() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("retrying", |mut scope| async move {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let attempt = attempts;
            let outcome = scope
                .work_with(format!("Attempt {attempt}"), |_| async move {
                    anyhow::ensure!(attempt >= 3, "attempt {attempt} failed");
                    anyhow::Ok(attempt)
                })
                .await;
            if let Ok(value) = outcome {
                return Ok(Completion::Done(value));
            }
        }
    }));
    let events = run.events();

    assert_eq!(run.result().await.ok(), Some(3));

    let events = events.collect_all().await;
    let failures: Vec<Option<String>> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::WorkEnd { failure, .. } => Some(failure.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 3);
    assert!(failures[0].as_deref().unwrap_or_default().contains("attempt 1 failed"));
    assert!(failures[1].is_some());
    assert!(failures[2].is_none());
    assert!(matches!(end_of(&events, "retrying"), EndOutcome::Done));
    Ok(())
}

#[tokio::test]
async fn panics_become_failures() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let work_panic = session.run_task(task("work-panic", |mut scope| async move {
        let outcome: anyhow::Result<()> = scope
            .work(|_| async move {
                if true {
                    panic!("kaboom");
                }
                anyhow::Ok(())
            })
            .await;
        Ok(Completion::Done(format!("{:#}", outcome.err().expect("work should fail"))))
    }));

    let body_panic = session.run_task(task("body-panic", |_scope| async move {
        if true {
            panic!("body exploded");
        }
        Ok(Completion::Done(String::new()))
    }));
    let body_events = body_panic.events();

    let message = work_panic.result().await.ok().expect("work panic is recoverable");
    assert!(message.contains("work unit panicked: kaboom"), "{message}");

    match body_panic.result().await {
        TaskResult::Err(err) => assert!(err.to_string().contains("task body panicked: body exploded")),
        other => panic!("expected failure, got {other:?}"),
    }
    let events = body_events.collect_all().await;
    assert!(matches!(end_of(&events, "body-panic"), EndOutcome::Failed(_)));

    session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn backwards_progress_counts_are_ignored() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("counting", |mut scope| async move {
        scope
            .work(|w| async move {
                w.progress(ProgressValue::Count(5));
                w.progress(ProgressValue::Count(2));
                w.progress(ProgressValue::Count(7));
                w.progress(ProgressValue::Ratio(1.5));
                anyhow::Ok(())
            })
            .await?;
        Ok(Completion::Done(()))
    }));
    let events = run.events();
    assert!(run.result().await.is_ok());

    let progress: Vec<ProgressValue> = events
        .collect_all()
        .await
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::WorkProgress { value, .. } => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![
            ProgressValue::Count(5),
            ProgressValue::Count(7),
            ProgressValue::Ratio(1.0)
        ]
    );
    Ok(())
}

#[tokio::test]
async fn subscribers_replay_the_whole_stream() -> TestResult {
    init_tracing();
    let session = Session::new(());
    let run = session.run_task(leaf("replayed", 2));

    let early = run.events();
    let late = run.events();

    let first = early.collect_all().await;
    assert!(run.result().await.is_ok());
    let second = late.collect_all().await;

    assert_eq!(trace(&first), trace(&second));
    assert_eq!(first.first().map(|e| e.kind.label()), Some("task_start"));
    assert_eq!(first.last().map(|e| e.kind.label()), Some("task_end"));
    Ok(())
}

#[tokio::test]
async fn settled_stream_drains_without_waiting() -> TestResult {
    init_tracing();
    let session = Session::new(());
    let run = session.run_task(leaf("drained", 4));
    let mut polled = run.events();
    let adapted = run.events();

    assert_eq!(run.result().await.ok(), Some(8));

    let mut buffered = Vec::new();
    while let Some(event) = polled.try_next() {
        buffered.push(event);
    }
    let streamed: Vec<TaskEvent> = adapted.into_stream().collect().await;

    assert_eq!(trace(&buffered), trace(&streamed));
    assert_eq!(buffered.last().map(|e| e.kind.label()), Some("task_end"));
    assert!(polled.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn independent_runs_can_be_joined() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let runs = vec![
        session.run_task(leaf("one", 1)),
        session.run_task(failing("two")),
        session.run_task(leaf("three", 3)),
    ];
    let joined = timeout(Duration::from_secs(5), join_runs(runs)).await?;

    let names: Vec<&str> = joined.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["one", "two", "three"]);
    assert_eq!(joined[0].1.as_ref().ok().copied(), Some(2));
    assert!(joined[1].1.is_err());
    assert_eq!(joined[2].1.as_ref().ok().copied(), Some(6));

    session.shutdown().await;
    Ok(())
}
