//! Tests for driving a single generation.

use std::sync::Arc;
use tcore::{
    ContextWindow, DialogTurn, SessionKey, StreamConfig, Usage, UserContent,
    testing::{BrokenSink, RecordingSink, ScriptedBackend, Step},
};
use tokio::sync::Notify;
use turnstile_runtime::{Admission, GenerationTask, SessionRegistry, TaskStatus};

fn config(emit_threshold: usize) -> StreamConfig {
    StreamConfig {
        emit_threshold,
        max_message_len: 4096,
        edit_interval_ms: 0,
    }
}

fn start(registry: &SessionRegistry, key: &SessionKey) -> GenerationTask {
    match registry.try_start(key) {
        Admission::Started(task) => task,
        Admission::Busy => panic!("expected {key} to be free"),
    }
}

fn text(len: usize) -> String {
    "a".repeat(len)
}

#[tokio::test]
async fn completed_run_emits_sparse_updates() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([
        Step::partial(text(40), 9, 10),
        Step::partial(text(90), 9, 22),
        Step::partial(text(130), 9, 31),
        Step::partial(text(205), 9, 50),
    ]);
    let sink = RecordingSink::new();
    let mut window = ContextWindow::new(30);
    let message = UserContent::text("tell me a story");

    let mut task = start(&registry, &key);
    let outcome = task
        .run(&backend, &mut window, &message, &sink, &config(100))
        .await;

    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(outcome.usage, Usage::new(9, 50));
    assert_eq!(outcome.text, text(205));
    assert_eq!(outcome.evicted, 0);
    assert!(outcome.failure.is_none());

    let updates = sink.updates();
    let lengths: Vec<_> = updates.iter().map(|u| u.content.len()).collect();
    assert_eq!(lengths, [130, 205]);
    assert!(!updates[0].is_final);
    assert!(updates[1].is_final);

    assert_eq!(window.len(), 1);
    let turn = &window.snapshot()[0];
    assert_eq!(turn.user, message);
    assert_eq!(turn.bot, text(205));

    drop(task);
    assert!(!registry.is_busy(&key));
}

#[tokio::test]
async fn backend_receives_history() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([Step::partial("ok", 1, 1)]);
    let mut window = ContextWindow::with_turns(30, [DialogTurn::new("earlier", "reply")]);

    let mut task = start(&registry, &key);
    task.run(
        &backend,
        &mut window,
        &UserContent::text("now"),
        &RecordingSink::new(),
        &config(100),
    )
    .await;

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.len(), 1);
    assert_eq!(calls[0].0[0].bot, "reply");
    assert_eq!(calls[0].1, UserContent::text("now"));
    assert_eq!(window.len(), 2);
}

#[tokio::test]
async fn completion_reports_eviction() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([Step::partial("fine", 1, 1)]);
    let mut window = ContextWindow::with_turns(2, [DialogTurn::new("a", "1"), DialogTurn::new("b", "2")]);

    let mut task = start(&registry, &key);
    let outcome = task
        .run(&backend, &mut window, &"c".into(), &RecordingSink::new(), &config(100))
        .await;

    assert_eq!(outcome.evicted, 1);
    let bots: Vec<_> = window.iter().map(|t| t.bot.clone()).collect();
    assert_eq!(bots, ["2", "fine"]);
}

#[tokio::test]
async fn backend_failure_keeps_partial_usage() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([
        Step::partial(text(10), 12, 5),
        Step::partial(text(20), 12, 9),
        Step::Fail("rate limited".into()),
        Step::partial(text(30), 12, 14),
    ]);
    let sink = RecordingSink::new();
    let mut window = ContextWindow::new(30);

    let mut task = start(&registry, &key);
    let outcome = task
        .run(&backend, &mut window, &"hi".into(), &sink, &config(1))
        .await;

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.usage, Usage::new(12, 9));
    let reason = outcome.failure.expect("failure reason");
    assert!(reason.contains("rate limited"), "{reason}");
    assert!(window.is_empty());
    assert!(sink.updates().iter().all(|u| !u.is_final));

    drop(task);
    assert!(!registry.is_busy(&key));
}

#[tokio::test]
async fn transport_failure_fails_task() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([Step::partial(text(10), 1, 3)]);
    let mut window = ContextWindow::new(30);

    let mut task = start(&registry, &key);
    let outcome = task
        .run(&backend, &mut window, &"hi".into(), &BrokenSink, &config(1))
        .await;

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.usage, Usage::new(1, 3));
    assert!(outcome.failure.unwrap().contains("chat not found"));
    assert!(window.is_empty());
}

#[tokio::test]
async fn cancel_observed_between_chunks() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([
        Step::partial(text(30), 12, 47),
        Step::partial(text(60), 12, 80),
    ]);
    let sink = RecordingSink::gated();

    let generation = {
        let (registry, key, backend, sink) = (registry.clone(), key.clone(), backend.clone(), sink.clone());
        tokio::spawn(async move {
            let mut task = start(&registry, &key);
            let mut window = ContextWindow::new(30);
            let outcome = task
                .run(&backend, &mut window, &"hi".into(), &sink, &config(1))
                .await;
            (outcome, window)
        })
    };

    sink.delivered().await;
    assert_eq!(registry.cancel(&key), turnstile_runtime::CancelOutcome::Cancelled);
    sink.open();

    let (outcome, window) = generation.await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Cancelled);
    assert_eq!(outcome.usage, Usage::new(12, 47));
    assert_eq!(outcome.text, text(30));
    assert!(window.is_empty());
    assert_eq!(sink.updates().len(), 1);

    // the slot is free again once the task is gone
    assert!(!registry.try_start(&key).is_busy());
}

#[tokio::test]
async fn aborted_generation_releases_slot() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let never = Arc::new(Notify::new());
    let backend = ScriptedBackend::new([Step::partial("a", 1, 1), Step::Pause(never)]);

    let generation = {
        let (registry, key, backend) = (registry.clone(), key.clone(), backend.clone());
        tokio::spawn(async move {
            let mut task = start(&registry, &key);
            let mut window = ContextWindow::new(30);
            task.run(&backend, &mut window, &"hi".into(), &RecordingSink::new(), &config(100))
                .await
        })
    };

    while !registry.is_busy(&key) {
        tokio::task::yield_now().await;
    }
    let handle = registry.active(&key).unwrap();

    generation.abort();
    assert!(generation.await.unwrap_err().is_cancelled());
    assert_eq!(handle.status(), TaskStatus::Cancelled);
    assert!(!registry.is_busy(&key));
}

#[tokio::test]
async fn reset_task_does_not_consume_output() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([Step::partial("never shown", 4, 4)]);
    let sink = RecordingSink::new();
    let mut window = ContextWindow::new(30);

    let mut task = start(&registry, &key);
    registry.reset(&key);
    let outcome = task
        .run(&backend, &mut window, &"hi".into(), &sink, &config(1))
        .await;

    assert_eq!(outcome.status, TaskStatus::Cancelled);
    assert_eq!(outcome.usage, Usage::default());
    assert!(sink.updates().is_empty());
}

#[tokio::test]
async fn finished_task_does_not_run_again() {
    let registry = SessionRegistry::new();
    let key = SessionKey::dm("u1");
    let backend = ScriptedBackend::new([Step::partial("once", 2, 2)]);
    let mut window = ContextWindow::new(30);

    let mut task = start(&registry, &key);
    let first = task
        .run(&backend, &mut window, &"hi".into(), &RecordingSink::new(), &config(1))
        .await;
    let second = task
        .run(&backend, &mut window, &"hi".into(), &RecordingSink::new(), &config(1))
        .await;

    assert_eq!(first.status, TaskStatus::Completed);
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.usage, Usage::new(2, 2));
    assert_eq!(backend.calls().len(), 1);
    assert_eq!(window.len(), 1);
}
