//! End-to-end tests of the `aisum` binary against a snapshot file.

mod common;

use common::cli::{AisumWorkspace, run_aisum};
use common::fixtures::record;
use common::{init_test_logging, key};
use predicates::prelude::*;

fn workspace() -> AisumWorkspace {
    init_test_logging();
    AisumWorkspace::new(&[
        record("A-1", "Epic").title("Search revamp").labeled().build(),
        record("A-2", "Story")
            .title("Index titles")
            .labeled()
            .epic("A-1")
            .build(),
        record("A-3", "Task").title("Unrelated chore").build(),
    ])
}

#[test]
fn summarize_posts_and_records_summaries() {
    let ws = workspace();
    let run = run_aisum(&ws, ["summarize", "A-1", "--json"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);

    let out = run.json();
    assert_eq!(out["key"], "A-1");
    assert_eq!(out["llm_calls"], 2);
    assert_eq!(out["posted"], serde_json::json!(["A-2", "A-1"]));
    assert!(
        out["text"]
            .as_str()
            .unwrap()
            .starts_with("Summary of A-1 - Search revamp")
    );

    // Written back to the snapshot file
    let snapshot = ws.snapshot();
    let epic = snapshot.iter().find(|r| *r.key() == key("A-1")).unwrap();
    assert!(epic.fields.status_summary.contains("=== AI SUMMARY START ==="));
    assert_eq!(epic.changelog.len(), 1);
    assert_eq!(epic.changelog[0].author, common::BOT_NAME);

    // Second run is served from the tracker
    let run = run_aisum(&ws, ["summarize", "A-1", "--json"]);
    assert_eq!(run.json()["llm_calls"], 0);

    let stats = run_aisum(&ws, ["stats", "--json"]).json();
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["fresh"], 2);
    assert_eq!(stats["stale"], 0);
}

#[test]
fn summarize_no_update_leaves_tracker_alone() {
    let ws = workspace();
    let run = run_aisum(&ws, ["summarize", "A-1", "--no-update"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    assert!(run.stdout.contains("=== AI SUMMARY START ==="));
    assert!(ws.snapshot().iter().all(|r| r.changelog.is_empty()));
}

#[test]
fn prompt_only_prints_the_prompt() {
    let ws = workspace();
    let run = run_aisum(&ws, ["summarize", "A-2", "--prompt-only"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    assert!(run.stdout.contains("Title: A-2 - Index titles"));
    assert!(run.stdout.contains("is a child of the Epic issue A-1: Search revamp"));
    assert!(ws.snapshot().iter().all(|r| r.changelog.is_empty()));
}

#[test]
fn enqueue_then_refresh_drains_backlog() {
    let ws = workspace();
    let run = run_aisum(&ws, ["enqueue", "A-3", "a-2", "--json"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    let out = run.json();
    assert_eq!(out[0]["key"], "A-3");
    assert_eq!(out[0]["outcome"], "marked");
    assert_eq!(out[1]["key"], "A-2");

    let stats = run_aisum(&ws, ["stats", "--json"]).json();
    assert_eq!(stats["stale"], 2);
    assert_eq!(stats["pending"], 2);

    let run = run_aisum(&ws, ["refresh", "--once", "--json"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    // A-2's refresh pushes staleness to A-1, which the next pass picks up
    assert_eq!(
        run.json()["refreshed"],
        serde_json::json!(["A-2", "A-3", "A-1"])
    );

    let stats = run_aisum(&ws, ["stats", "--json"]).json();
    assert_eq!(stats["stale"], 0);
    assert_eq!(stats["fresh"], 3);
}

#[test]
fn poll_once_summarizes_labeled_issues() {
    let ws = workspace();
    let run = run_aisum(&ws, ["poll", "--once", "--json"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    let out: serde_json::Value = serde_json::from_str(run.stdout.trim()).unwrap();
    assert_eq!(out["stats"]["selected"], 2);
    assert_eq!(out["stats"]["processed"], 2);

    let stats = run_aisum(&ws, ["stats", "--json"]).json();
    assert_eq!(stats["fresh"], 2);
    assert!(stats["watermark"].is_string());
}

#[test]
fn config_set_get_and_unset() {
    let ws = workspace();
    let run = run_aisum(&ws, ["config", "--set", "max_depth=3"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);

    let run = run_aisum(&ws, ["config", "--get", "max-depth"]);
    assert_eq!(run.stdout.trim(), "3");

    let run = run_aisum(&ws, ["config", "--list", "--json"]);
    let out = run.json();
    assert_eq!(out["max-depth"], "3");
    assert_eq!(out["allowed-projects"], "A");

    let run = run_aisum(&ws, ["config", "--unset", "max-depth", "--json"]);
    assert_eq!(run.json()["removed"], true);
    let run = run_aisum(&ws, ["config", "--get", "max-depth"]);
    assert_eq!(run.stdout.trim(), "1");
}

#[test]
fn config_rejects_startup_keys_and_bad_values() {
    let ws = workspace();
    let run = run_aisum(&ws, ["config", "--set", "db=/tmp/other.db"]);
    assert_eq!(run.status.code(), Some(5));
    assert!(run.stderr.contains("VALIDATION_FAILED"));

    let run = run_aisum(&ws, ["config", "--set", "max-depth=deep"]);
    assert_eq!(run.status.code(), Some(5));
    assert!(run.stderr.contains("CONFIG_ERROR"));
}

#[test]
fn invalid_key_exits_with_issue_error() {
    let ws = workspace();
    let run = run_aisum(&ws, ["summarize", "not a key"]);
    assert_eq!(run.status.code(), Some(3));
    assert!(run.stderr.contains("\"code\": \"INVALID_KEY\""));
}

#[test]
fn unknown_issue_exits_with_issue_error() {
    let ws = workspace();
    let run = run_aisum(&ws, ["summarize", "A-99"]);
    assert_eq!(run.status.code(), Some(3));
    assert!(run.stderr.contains("ISSUE_NOT_FOUND"));
}

#[test]
fn estimate_prints_csv() {
    let ws = workspace();
    let run = run_aisum(&ws, ["estimate", "--since", "2000-01-01", "--csv"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    let mut lines = run.stdout.lines();
    assert_eq!(
        lines.next(),
        Some("key,issue_type,updated,child_count,comment_count,tokens")
    );
    assert_eq!(lines.count(), 3);
}

#[test]
fn rollup_renders_text() {
    let ws = workspace();
    let run = run_aisum(&ws, ["rollup", "A-1", "--inactive-days", "100000"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    assert!(run.stdout.starts_with("Executive Summary: A-1 - Search revamp"));
    assert!(run.stdout.contains("== A-2: Index titles (Open/Unresolved) =="));
}

#[test]
fn invalidate_once_records_watermark() {
    let ws = workspace();
    let run = run_aisum(&ws, ["invalidate", "--once", "--window-secs", "5", "--json"]);
    assert!(run.status.success(), "stderr: {}", run.stderr);
    let out: serde_json::Value = serde_json::from_str(run.stdout.trim()).unwrap();
    assert_eq!(out["found"], 0);

    let run = run_aisum(&ws, ["invalidate", "--once", "--window-secs", "0"]);
    assert_eq!(run.status.code(), Some(5));
}

#[test]
fn help_lists_commands() {
    let ws = workspace();
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("aisum"));
    cmd.current_dir(&ws.root)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("summarize").and(predicate::str::contains("refresh")));
}

#[test]
fn oversized_durations_are_rejected_not_fatal() {
    let ws = workspace();
    let run = run_aisum(&ws, ["estimate", "--since", "-99999999999999w"]);
    assert_eq!(run.status.code(), Some(5));
    assert!(run.stderr.contains("VALIDATION_FAILED"));

    let run = run_aisum(&ws, ["poll", "--once", "--clear-cache", "99999999999999w"]);
    assert_eq!(run.status.code(), Some(5));
}
