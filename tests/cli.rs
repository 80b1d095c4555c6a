use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn calla() -> Command {
    Command::cargo_bin("calla").expect("binary exists")
}

#[test]
fn run_hello_demo() {
    let mut cmd = calla();
    cmd.arg("run").arg("demos/hello.ca");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Hello from Calla!"));
}

#[test]
fn run_squares_demo() {
    let mut cmd = calla();
    cmd.arg("run").arg("demos/squares.ca");
    cmd.assert()
        .success()
        .stdout(predicate::str::diff("1\n4\n9\n16\n25\n"));
}

#[test]
fn run_circle_demo() {
    let mut cmd = calla();
    cmd.arg("run").arg("demos/circle.ca");
    cmd.assert()
        .success()
        .stdout(predicate::str::diff("28\n"));
}

#[test]
fn run_grades_demo() {
    let mut cmd = calla();
    cmd.arg("run").arg("demos/grades.ca");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("amy: A"))
        .stdout(predicate::str::contains("lookup failed:"));
}

#[test]
fn eval_prints_through_the_output_hook() {
    let mut cmd = calla();
    cmd.arg("eval").arg("say 2 + 3");
    cmd.assert().success().stdout(predicate::str::diff("5\n"));
}

#[test]
fn eval_reports_runtime_errors() {
    let mut cmd = calla();
    cmd.arg("eval").arg("say missing");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Undefined variable 'missing'"));
}

#[test]
fn run_reports_syntax_errors_with_the_file_name() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("broken.ca");
    fs::write(&script, "set x == 1\n").expect("write script");

    let mut cmd = calla();
    cmd.arg("run").arg(&script);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Expected ="))
        .stderr(predicate::str::contains("broken.ca"));
}

#[test]
fn max_steps_flag_limits_execution() {
    let mut cmd = calla();
    cmd.arg("eval")
        .arg("loop true {\nset x = 1\n}")
        .arg("--max-steps")
        .arg("10");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Execution step limit exceeded"));
}

#[test]
fn trace_flag_reports_calls_on_stderr() {
    let mut cmd = calla();
    cmd.arg("eval")
        .arg("fn id(x) {\nreturn x\n}\nsay id(7)")
        .arg("--trace");
    cmd.assert()
        .success()
        .stdout(predicate::str::diff("7\n"))
        .stderr(predicate::str::contains("trace: call id"));
}
