use std::fs;
use std::process::{Command, Output};

fn tablebridge(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tablebridge"))
        .args(args)
        .output()
        .expect("failed to run tablebridge")
}

fn stdout_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("row is not JSON"))
        .collect()
}

// ---------------------------------------------------------------------------
// query
// ---------------------------------------------------------------------------

#[test]
fn query_prints_rows_as_json_lines() {
    let output = tablebridge(&["query", "SELECT value, value * 2 AS twice FROM generate_series(1, 3)"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let rows = stdout_lines(&output);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], serde_json::json!({"value": 1, "twice": 2}));
    assert_eq!(rows[2], serde_json::json!({"value": 3, "twice": 6}));
}

#[test]
fn query_runs_statements_in_order_against_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("people.db");
    let db = db.to_str().unwrap();

    let output = tablebridge(&[
        "query",
        "--db",
        db,
        r#"CREATE VIRTUAL TABLE people USING records(columns='name, age', data='[["ann", 31], ["bob", null]]')"#,
        "SELECT name, age FROM people WHERE rowid = 1",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        stdout_lines(&output),
        vec![serde_json::json!({"name": "ann", "age": 31})]
    );

    let output = tablebridge(&["query", "--db", db, "SELECT count(*) AS n FROM people"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_lines(&output), vec![serde_json::json!({"n": 2})]);
}

#[test]
fn query_renders_every_value_type() {
    let output = tablebridge(&[
        "query",
        "SELECT NULL AS n, 1.5 AS r, 'x' AS t, x'00ff' AS b",
    ]);
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        vec![serde_json::json!({"n": null, "r": 1.5, "t": "x", "b": "00ff"})]
    );
}

#[test]
fn query_with_config_and_extra_provider() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("providers.yml");
    fs::write(
        &config,
        "version: \"1.0\"\nproviders:\n  - name: seq\n    kind: series\n    eponymous_only: true\n",
    )
    .unwrap();

    let output = tablebridge(&[
        "query",
        "--config",
        config.to_str().unwrap(),
        "--provider",
        "steps=series",
        "SELECT (SELECT count(*) FROM seq(1, 4)) + (SELECT count(*) FROM steps(1, 2)) AS total",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_lines(&output), vec![serde_json::json!({"total": 6})]);

    // Only the configured providers are installed.
    let output = tablebridge(&[
        "query",
        "--config",
        config.to_str().unwrap(),
        "SELECT * FROM generate_series(1, 2)",
    ]);
    assert!(!output.status.success());
}

#[test]
fn query_reports_sql_errors() {
    let output = tablebridge(&["query", "SELECT value FROM generate_series"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "{stderr}");
    assert!(stderr.contains("no query solution"), "{stderr}");
}

#[test]
fn query_rejects_unknown_provider_kind() {
    let output = tablebridge(&["query", "--provider", "x=csv", "SELECT 1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown provider kind 'csv'"));
}

#[test]
fn query_rejects_missing_config() {
    let output = tablebridge(&["query", "--config", "/nonexistent/providers.yml", "SELECT 1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load config"));
}

#[test]
fn debug_logging_goes_to_stderr() {
    let output = tablebridge(&[
        "--log-level",
        "debug",
        "query",
        "SELECT value FROM generate_series(1, 1)",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec![serde_json::json!({"value": 1})]);
    assert!(String::from_utf8_lossy(&output.stderr).contains("module registered"));
}

// ---------------------------------------------------------------------------
// providers / init-config
// ---------------------------------------------------------------------------

#[test]
fn providers_lists_defaults() {
    let output = tablebridge(&["providers"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec![
            "generate_series\tseries\teponymous-only",
            "records\trecords\tcreatable",
        ]
    );
}

#[test]
fn init_config_writes_loadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("providers.yml");
    let path = path.to_str().unwrap();

    let output = tablebridge(&["init-config", path]);
    assert!(output.status.success());

    let output = tablebridge(&["providers", "--config", path]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 2);

    let output = tablebridge(&["init-config", path]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));

    let output = tablebridge(&["init-config", "--force", path]);
    assert!(output.status.success());
}
