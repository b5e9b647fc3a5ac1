//! Tests for the bounded context window.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use turnstile_core::{ContextWindow, DialogTurn, EmptyWindow};

fn turn(n: usize) -> DialogTurn {
    DialogTurn::new(format!("question {n}"), format!("answer {n}"))
}

#[test]
fn append_within_budget_evicts_nothing() {
    let mut window = ContextWindow::new(3);
    assert_eq!(window.append(turn(0)), 0);
    assert_eq!(window.append(turn(1)), 0);
    assert_eq!(window.len(), 2);
}

#[test]
fn append_at_full_budget_evicts_oldest() {
    let mut window = ContextWindow::new(2);
    window.append(turn(0));
    window.append(turn(1));

    assert_eq!(window.append(turn(2)), 1);
    let bots: Vec<_> = window.iter().map(|t| t.bot.as_str()).collect();
    assert_eq!(bots, ["answer 1", "answer 2"]);
}

#[test]
fn forty_appends_keep_last_thirty() {
    let mut window = ContextWindow::new(30);
    let evicted: usize = (0..40).map(|n| window.append(turn(n))).sum();

    assert_eq!(evicted, 10);
    assert_eq!(window.len(), 30);
    let expected: Vec<_> = (10..40).map(|n| format!("answer {n}")).collect();
    let actual: Vec<_> = window.snapshot().into_iter().map(|t| t.bot).collect();
    assert_eq!(actual, expected);
}

#[test]
fn zero_budget_evicts_every_turn() {
    let mut window = ContextWindow::new(0);
    assert_eq!(window.append(turn(0)), 1);
    assert!(window.is_empty());
}

#[test]
fn drop_last_on_empty_window() {
    let mut window = ContextWindow::new(5);
    assert_eq!(window.drop_last(), Err(EmptyWindow));
    assert!(window.is_empty());
    assert_eq!(window.budget(), 5);
}

#[test]
fn drop_last_returns_newest() {
    let mut window = ContextWindow::new(5);
    window.append(turn(0));
    window.append(turn(1));

    let last = window.drop_last().unwrap();
    assert_eq!(last.bot, "answer 1");
    assert_eq!(window.len(), 1);
}

#[test]
fn replace_last_swaps_in_place() {
    let mut window = ContextWindow::new(5);
    assert_eq!(window.replace_last(turn(9)), Err(EmptyWindow));

    window.append(turn(0));
    window.append(turn(1));
    let old = window.replace_last(turn(7)).unwrap();
    assert_eq!(old.bot, "answer 1");
    assert_eq!(window.snapshot()[1].bot, "answer 7");
    assert_eq!(window.len(), 2);
}

#[test]
fn restored_snapshot_is_cut_to_budget() {
    let window = ContextWindow::with_turns(2, (0..5).map(turn));
    let bots: Vec<_> = window.iter().map(|t| t.bot.clone()).collect();
    assert_eq!(bots, ["answer 3", "answer 4"]);
}

#[test]
fn idle_time_comes_from_last_turn() {
    let now = Utc::now();
    let mut window = ContextWindow::new(5);
    assert!(window.idle_for(now).is_none());
    assert!(!window.is_idle(now, Duration::ZERO));

    window.append(DialogTurn::at("old", "reply", now - ChronoDuration::seconds(120)));
    assert_eq!(window.idle_for(now), Some(Duration::from_secs(120)));
    assert!(window.is_idle(now, Duration::from_secs(60)));
    assert!(!window.is_idle(now, Duration::from_secs(600)));
}

#[test]
fn future_timestamp_is_not_idle() {
    let now = Utc::now();
    let mut window = ContextWindow::new(5);
    window.append(DialogTurn::at("q", "a", now + ChronoDuration::seconds(30)));
    assert_eq!(window.idle_for(now), Some(Duration::ZERO));
}

#[test]
fn window_serializes_for_stores() {
    let mut window = ContextWindow::new(3);
    window.append(turn(0));
    let json = serde_json::to_string(&window).unwrap();
    let restored: ContextWindow = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, window);
}
