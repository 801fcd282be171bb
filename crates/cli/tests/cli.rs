//! Command-level tests for the `digestflow` binary.

use std::path::PathBuf;
use std::process::Command;

use clap::Parser;

use digestflow_cli::{Cli, run};

fn run_args(args: &[&str]) -> anyhow::Result<String> {
    let cli = Cli::try_parse_from(std::iter::once("digestflow").chain(args.iter().copied()))?;
    let mut out = Vec::new();
    run(&cli, &mut out)?;
    Ok(String::from_utf8(out)?)
}

/// Write a descriptor into a per-test file under the system temp dir.
fn descriptor(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("digestflow-{}-{name}.toml", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn synth_prints_the_graph_as_json() {
    let output = run_args(&["synth"]).unwrap();
    let graph: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(graph["stack_name"], "SlackAnalyzerStack");
    let resources = graph["resources"].as_object().unwrap();
    assert_eq!(resources.len(), 6);
    assert_eq!(resources["SlackReportTopic"]["type"], "topic");
    assert_eq!(
        resources["DailySlackAnalysisRule"]["properties"]["spec"]["hour"],
        "18"
    );
}

#[test]
fn plan_against_an_empty_platform_creates_everything() {
    let output = run_args(&["plan"]).unwrap();
    assert!(output.starts_with("stack SlackAnalyzerStack"));
    assert!(output.contains("6 to create, 0 to update, 0 to replace, 0 to delete"));
}

#[test]
fn simulate_runs_once_per_day() {
    let output = run_args(&["simulate", "--days", "2", "--start", "2025-01-15T00:00:00Z"]).unwrap();

    assert!(output.contains("2025-01-15T18:00:00Z SlackAnalyzerFunction"));
    assert!(output.contains("2025-01-16T18:00:00Z SlackAnalyzerFunction"));
    assert_eq!(output.matches(" published ").count(), 2);
    assert!(output.contains("ops@example.com: 2 report(s)"));
}

#[test]
fn unconfirmed_subscribers_receive_nothing() {
    let output = run_args(&[
        "simulate",
        "--start",
        "2025-01-15T00:00:00Z",
        "--unconfirmed",
    ])
    .unwrap();
    assert!(output.contains(" published "));
    assert!(output.contains("ops@example.com: 0 report(s)"));
}

#[test]
fn descriptor_file_drives_the_stack() {
    let path = descriptor(
        "custom",
        r#"
        stack_name = "DigestStack"
        model_id = "model-a"

        [schedule]
        kind = "cron"
        expression = "cron(0 6 * * ? *)"
        "#,
    );
    let output = run_args(&["--config", path.to_str().unwrap(), "plan"]).unwrap();
    assert!(output.starts_with("stack DigestStack"));
    std::fs::remove_file(path).ok();
}

#[test]
fn invalid_schedule_is_an_error() {
    let path = descriptor(
        "bad-cron",
        r#"
        [schedule]
        kind = "cron"
        expression = "cron(0 25 * * ? *)"
        "#,
    );
    let result = run_args(&["--config", path.to_str().unwrap(), "synth"]);
    assert!(result.is_err());
    std::fs::remove_file(path).ok();
}

#[test]
fn zero_days_is_rejected_by_the_parser() {
    assert!(Cli::try_parse_from(["digestflow", "simulate", "--days", "0"]).is_err());
}

#[test]
fn binary_exits_non_zero_on_validation_failure() {
    let path = descriptor(
        "bad-grant",
        r#"
        model_scope = "any"
        "#,
    );
    let output = Command::new(env!("CARGO_BIN_EXE_digestflow"))
        .args(["--config", path.to_str().unwrap(), "synth"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run digestflow");
    std::fs::remove_file(path).ok();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
