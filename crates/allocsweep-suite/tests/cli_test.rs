//! Integration test: the `allocsweep` binary end to end.
//!
//! Validates:
//! 1. A clean run prints only the summary line and exits 0.
//! 2. Test bodies use the directory of argv[0] for scratch files.
//! 3. The exit status equals the number of failed tests.
//! 4. `--log` writes a valid JSONL log.
//!
//! Run: cargo test -p allocsweep-suite --test cli_test

use std::process::{Command, Output};

use allocsweep_harness::structured_log::validate_log_file;

fn allocsweep() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_allocsweep"));
    for var in ["ALLOCSWEEP_REPLAY", "ALLOCSWEEP_FILTER", "ALLOCSWEEP_LOG"] {
        command.env_remove(var);
    }
    command
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn clean_run_prints_only_the_summary() {
    let output = allocsweep().output().expect("allocsweep should execute");
    let lines = stdout_lines(&output);

    assert_eq!(output.status.code(), Some(0), "{lines:#?}");
    assert_eq!(lines.len(), 1, "{lines:#?}");
    assert!(lines[0].starts_with("Success: "), "{}", lines[0]);
    assert!(lines[0].contains(" tests passed, cost "), "{}", lines[0]);
}

#[test]
fn no_replay_runs_each_selected_test_once() {
    let output = allocsweep()
        .args(["--filter", "parse_refused", "--no-replay"])
        .output()
        .expect("allocsweep should execute");
    let lines = stdout_lines(&output);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(lines.len(), 1);
    assert!(
        lines[0].starts_with("Success: 2 tests passed, cost "),
        "{}",
        lines[0]
    );
}

#[cfg(unix)]
#[test]
fn scratch_dir_comes_from_argv0_and_failures_set_the_exit_code() {
    use std::os::unix::process::CommandExt;

    let dir = tempfile::tempdir().unwrap();
    // The scratch directory derived from this argv[0] does not exist, so
    // every test that writes a scratch file fails.
    let argv0 = dir.path().join("missing").join("allocsweep");
    let output = allocsweep()
        .arg0(&argv0)
        .args(["--filter", "load"])
        .output()
        .expect("allocsweep should execute");
    let lines = stdout_lines(&output);

    assert_eq!(output.status.code(), Some(2), "{lines:#?}");
    assert_eq!(lines.len(), 3, "{lines:#?}");
    assert!(lines[0].starts_with("Test save_and_load failed: "), "{}", lines[0]);
    assert!(
        lines[1].starts_with("Test load_refused_at_every_step failed: "),
        "{}",
        lines[1]
    );
    assert!(
        lines[2].starts_with("FAILURE: 2 out of 3 tests failed, cost "),
        "{}",
        lines[2]
    );
    assert!(!dir.path().join("missing").exists());
}

#[test]
fn log_flag_writes_valid_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let output = allocsweep()
        .args(["--filter", "document", "--log"])
        .arg(&path)
        .output()
        .expect("allocsweep should execute");
    assert_eq!(output.status.code(), Some(0));

    let (lines, errors) = validate_log_file(&path).unwrap();
    assert!(errors.is_empty(), "{errors:?}");
    // suite_start, one result per sub-test, suite_end.
    assert!(lines >= 3, "{lines}");

    let content = std::fs::read_to_string(&path).unwrap();
    let last: serde_json::Value =
        serde_json::from_str(content.lines().last().unwrap()).unwrap();
    assert_eq!(last["event"], "suite_end");
    assert_eq!(last["details"]["failed"], 0);
}
