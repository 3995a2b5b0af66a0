#![cfg(all(not(target_family = "wasm"), feature = "cli"))]

use insta_cmd::assert_cmd_snapshot;
use insta_cmd::get_cargo_bin;
use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const PLAN: &str = r#"
levels:
  - queries:
      - id: q0
        select:
          - alias: q0_0
            formula:
              FuncCall:
                name: upper
                args:
                  - {Field: region}
            avatar_ids: [ava]
          - alias: q0_1
            formula: {Field: amount}
            avatar_ids: [ava]
  - level_type: compeng
    queries:
      - id: q1
        level_type: compeng
        select:
          - alias: q1_0
            formula: {Field: q0_0}
            avatar_ids: [q0]
        joined_from:
          root_from_id: f0
          froms:
            - Subquery:
                id: f0
                alias: t0
                query_id: q0
                columns:
                  - {id: q0_0, name: q0_0}
                  - {id: q0_1, name: q0_1}
"#;

#[test]
fn dialects() {
    assert_cmd_snapshot!(formulac_command().arg("dialects"), @r"
    success: true
    exit_code: 0
    ----- stdout -----
    SQLITE
    POSTGRESQL_9_3
    POSTGRESQL_9_4
    COMPENG
    MYSQL_5_6
    MYSQL_5_7
    MYSQL_8_0_12
    CLICKHOUSE_21_8
    CLICKHOUSE_22_10
    MSSQLSRV
    ORACLE
    POSTGRESQL = POSTGRESQL_9_3 | POSTGRESQL_9_4
    MYSQL = MYSQL_5_6 | MYSQL_5_7 | MYSQL_8_0_12
    CLICKHOUSE = CLICKHOUSE_21_8 | CLICKHOUSE_22_10
    ANY = SQLITE | POSTGRESQL_9_3 | POSTGRESQL_9_4 | COMPENG | MYSQL_5_6 | MYSQL_5_7 | MYSQL_8_0_12 | CLICKHOUSE_21_8 | CLICKHOUSE_22_10 | MSSQLSRV | ORACLE

    ----- stderr -----
    ");
}

#[test]
fn graph() {
    assert_cmd_snapshot!(formulac_command()
        .arg("graph")
        .pass_stdin(PLAN), @r"
    success: true
    exit_code: 0
    ----- stdout -----
    0: q0
    1: q1 <- q0

    ----- stderr -----
    ");
}

#[test]
fn translate() {
    assert_cmd_snapshot!(formulac_command()
        .args(["translate", "--dialect", "MYSQL_8_0_12", "--format", "json"])
        .pass_stdin(PLAN), @r#"
    success: true
    exit_code: 0
    ----- stdout -----
    [
      {
        "id": "q0",
        "level": 0,
        "level_type": "source_db",
        "dialect": "MYSQL_8_0_12",
        "select": [
          {
            "alias": "q0_0",
            "sql": "UPPER(`region`)"
          },
          {
            "alias": "q0_1",
            "sql": "`amount`"
          }
        ]
      },
      {
        "id": "q1",
        "level": 1,
        "level_type": "compeng",
        "dialect": "COMPENG",
        "select": [
          {
            "alias": "q1_0",
            "sql": "\"q0_0\""
          }
        ]
      }
    ]

    ----- stderr -----
    "#);
}

#[test]
fn translate_unknown_dialect() {
    assert_cmd_snapshot!(formulac_command()
        .args(["translate", "--dialect", "postgres"])
        .pass_stdin(PLAN), @r#"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    Error: dialect `"postgres"` not found
    ↳ Hint: available dialects: SQLITE, POSTGRESQL_9_3, POSTGRESQL_9_4, COMPENG, MYSQL_5_6, MYSQL_5_7, MYSQL_8_0_12, CLICKHOUSE_21_8, CLICKHOUSE_22_10, MSSQLSRV, ORACLE
    "#);
}

#[test]
fn compile_prunes_unused_columns() {
    let output = run_with_stdin(formulac_command().args(["compile", "--format", "json"]), PLAN);
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let aliases: Vec<_> = plan["levels"][0]["queries"][0]["select"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["alias"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(aliases, vec!["q0_0"]);
}

#[test]
fn compile_debug_log() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("log.json");

    let output = run_with_stdin(
        formulac_command().args(["compile", "--debug-log"]).arg(&log_path),
        PLAN,
    );
    assert!(output.status.success());

    let log: serde_json::Value = serde_json::from_str(&fs::read_to_string(&log_path).unwrap()).unwrap();
    let stages: Vec<_> = log["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["stage"].as_str().unwrap())
        .collect();
    assert!(stages.contains(&"Forking"));
    assert!(stages.contains(&"Sanitization"));
}

fn run_with_stdin(cmd: &mut Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn formulac_command() -> Command {
    let mut cmd = Command::new(get_cargo_bin("formulac"));
    normalize_formulac(&mut cmd);
    cmd
}

fn normalize_formulac(cmd: &mut Command) -> &mut Command {
    cmd
        // We set `CLICOLOR_FORCE` in CI to force color output, but we don't want `formulac` to
        // output color for our snapshot tests. And it seems to override the
        // `--color=never` flag.
        .env_remove("CLICOLOR_FORCE")
        .env("NO_COLOR", "1")
        .args(["--color=never"])
        // We don't want the tests to be affected by the user's `RUST_BACKTRACE` setting.
        .env_remove("RUST_BACKTRACE")
        .env_remove("RUST_LOG")
        .env_remove("FORMULAC_DIALECT")
        .env_remove("FORMULAC_DEBUG_LOG")
}
