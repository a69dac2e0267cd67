// tests/telemetry_board.rs

use std::error::Error;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crawlflow::engine::{
    Completion, EndOutcome, EventKind, Session, Task, TaskError, TaskEvent, task,
};
use crawlflow::errors::{PropertyMismatch, ValidationError};
use crawlflow::telemetry::format::{
    format_duration, format_error, format_error_chain, format_progress, validation_mismatches,
};
use crawlflow::telemetry::{TaskBoard, report, sort_by_dependencies};
use crawlflow::types::{ProgressValue, TaskStatus};
use crawlflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn at_second(seq: u64, second: u32, kind: EventKind) -> TaskEvent {
    TaskEvent {
        seq,
        at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
        kind,
    }
}

fn start(name: &str) -> EventKind {
    EventKind::TaskStart {
        name: name.to_string(),
    }
}

fn dep(task: &str, on: &str) -> EventKind {
    EventKind::TaskDependency {
        task: task.to_string(),
        depends_on: on.to_string(),
    }
}

#[test]
fn board_tracks_work_units_and_outcomes() {
    let events = vec![
        at_second(0, 0, start("fetch")),
        at_second(
            1,
            1,
            EventKind::WorkStart {
                task: "fetch".to_string(),
                description: Some("Fetching page 1".to_string()),
            },
        ),
        at_second(
            2,
            2,
            EventKind::WorkProgress {
                task: "fetch".to_string(),
                value: ProgressValue::Count(4),
            },
        ),
        at_second(
            3,
            3,
            EventKind::WorkEnd {
                task: "fetch".to_string(),
                failure: Some("HTTP 500".to_string()),
            },
        ),
        at_second(
            4,
            4,
            EventKind::WorkStart {
                task: "fetch".to_string(),
                description: None,
            },
        ),
        at_second(
            5,
            5,
            EventKind::WorkDescription {
                task: "fetch".to_string(),
                description: "Fetching page 1 again".to_string(),
            },
        ),
        at_second(
            6,
            6,
            EventKind::WorkEnd {
                task: "fetch".to_string(),
                failure: None,
            },
        ),
        at_second(
            7,
            9,
            EventKind::TaskEnd {
                name: "fetch".to_string(),
                outcome: EndOutcome::Failed(TaskError::msg("gave up")),
            },
        ),
    ];

    let mut board = TaskBoard::new();
    board.apply_all(&events);

    let state = board.get("fetch").expect("task is tracked");
    assert_eq!(state.status, TaskStatus::Error);
    assert_eq!(state.works.len(), 2);
    assert_eq!(state.works[0].status, TaskStatus::Error);
    assert_eq!(state.works[0].failure.as_deref(), Some("HTTP 500"));
    assert_eq!(state.works[0].progress, Some(ProgressValue::Count(4)));
    assert_eq!(
        state.current_work().and_then(|w| w.description.as_deref()),
        Some("Fetching page 1 again")
    );
    assert_eq!(state.elapsed(), Some(chrono::Duration::seconds(9)));
    assert_eq!(state.error.as_ref().map(|e| e.to_string()).as_deref(), Some("gave up"));

    let summary = board.summary();
    assert_eq!(summary.error, 1);
    assert_eq!(summary.total(), 1);
}

#[test]
fn sort_puts_dependencies_first_and_unstarted_tasks_last() {
    let events = vec![
        at_second(0, 0, start("publish")),
        at_second(1, 1, dep("publish", "build")),
        at_second(2, 2, start("build")),
        at_second(3, 3, dep("build", "fetch")),
        at_second(4, 4, start("fetch")),
        at_second(
            5,
            5,
            EventKind::SpawnStart {
                parent: "publish".to_string(),
                children: vec!["never-started".to_string()],
            },
        ),
        at_second(6, 6, start("lint")),
        at_second(7, 7, dep("lint", "ghost")),
    ];

    let mut board = TaskBoard::new();
    board.apply_all(&events);

    let order = sort_by_dependencies(&board);
    assert_eq!(order.len(), board.len());
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();

    assert!(pos("fetch") < pos("build"));
    assert!(pos("build") < pos("publish"));
    assert!(pos("publish") < pos("lint"));
    assert_eq!(order.last().map(String::as_str), Some("never-started"));
    assert!(!order.iter().any(|n| n == "ghost"));
}

#[test]
fn durations_render_compactly() {
    assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
    assert_eq!(format_duration(Duration::from_millis(12_400)), "12s");
    assert_eq!(format_duration(Duration::from_millis(12_600)), "13s");
    assert_eq!(format_duration(Duration::from_secs(184)), "3m 4s");
}

#[test]
fn progress_renders_by_kind() {
    assert_eq!(format_progress(&ProgressValue::Indefinite), "…");
    assert_eq!(format_progress(&ProgressValue::Count(12)), "12");
    assert_eq!(format_progress(&ProgressValue::ratio(0.426)), "43%");
}

#[test]
fn validation_failures_collapse_to_an_issue_count() {
    let validation = ValidationError {
        target: "[Booth]".to_string(),
        mismatches: vec![
            PropertyMismatch {
                path: "[0]".to_string(),
                messages: vec!["missing field `id`".to_string()],
            },
            PropertyMismatch {
                path: "[3]".to_string(),
                messages: vec!["invalid type: null".to_string()],
            },
        ],
    };
    let err = TaskError::new(anyhow::Error::new(validation).context("loading booths"));

    assert_eq!(format_error(&err), "Validation failed (2 issues)");
    let paths: Vec<&str> = validation_mismatches(&err)
        .unwrap_or_default()
        .iter()
        .map(|m| m.path.as_str())
        .collect();
    assert_eq!(paths, vec!["[0]", "[3]"]);

    let plain = TaskError::new(anyhow::anyhow!("disk full").context("saving checkpoint"));
    assert_eq!(format_error(&plain), "saving checkpoint");
    assert_eq!(
        format_error_chain(&plain),
        "saving checkpoint\n  caused by: disk full"
    );
}

fn child(name: &str, fail: bool) -> Task<(), ()> {
    task(name.to_string(), move |mut scope| async move {
        scope
            .work_with("Working", move |_| async move {
                anyhow::ensure!(!fail, "child broke");
                anyhow::Ok(())
            })
            .await?;
        Ok(Completion::Done(()))
    })
}

#[tokio::test]
async fn reporter_folds_a_live_task_tree() -> TestResult {
    init_tracing();
    let session = Session::new(());

    let run = session.run_task(task("parent", |mut scope| async move {
        let results = scope
            .spawn(vec![child("ok", false), child("broken", true)])
            .await;
        if results.iter().any(|r| r.is_err()) {
            return Ok(Completion::Skipped);
        }
        Ok(Completion::Done(()))
    }));
    let reporter = tokio::spawn(report(run.events()));

    assert!(run.result().await.is_skipped());
    let board = reporter.await?;

    let names: Vec<&str> = board.names().collect();
    assert_eq!(names, vec!["parent", "ok", "broken"]);
    assert_eq!(
        board.get("parent").map(|s| s.children.clone()),
        Some(vec!["ok".to_string(), "broken".to_string()])
    );

    let summary = board.summary();
    assert_eq!((summary.done, summary.skipped, summary.error), (1, 1, 1));

    let broken = board.get("broken").expect("child tracked");
    assert_eq!(broken.works[0].status, TaskStatus::Error);
    assert!(broken.error.is_some());

    session.shutdown().await;
    Ok(())
}
