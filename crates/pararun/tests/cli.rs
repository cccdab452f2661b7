//! End-to-end tests for the pararun binary.
//!
//! These drive the compiled executable with piped stdin, the way a shell
//! pipeline would.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn pararun(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_pararun"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start pararun");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_flag_prints_usage() {
    let out = pararun(&["-h"], "");
    assert!(out.status.success());
    assert!(stdout(&out).contains("pararun - parallel run"));
}

#[test]
fn test_quiet_output_matches_sequential_order() {
    let dir = tempfile::tempdir().unwrap();
    let sh = dir.path().join("job.sh");
    std::fs::write(&sh, "sleep \"$1\"\necho \"$2\"\n").unwrap();
    let input = format!(
        "sh {p} 0.3 first\nsh {p} 0 second\nsh {p} 0.1 third\n",
        p = sh.display()
    );

    let out = pararun(&["-j3", "-q"], &input);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "first\nsecond\nthird\n");
}

#[test]
fn test_prefix_arguments() {
    let out = pararun(&["-q", "echo"], "one two\nthree\n");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "one two\nthree\n");
}

#[test]
fn test_exit_code_is_maximum_of_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let sh = dir.path().join("job.sh");
    std::fs::write(&sh, "exit \"$1\"\n").unwrap();
    let input = format!(
        "sh {p} 0\nsh {p} 3\nsh {p} 0\nsh {p} 7\nsh {p} 0\n",
        p = sh.display()
    );

    let out = pararun(&["-q"], &input);
    assert_eq!(out.status.code(), Some(7));
}

#[test]
fn test_quiet_suppresses_all_escape_bytes() {
    let out = pararun(&["-q", "echo"], "hello\nworld\n");
    assert!(!out.stdout.contains(&0x1b));
    assert_eq!(stdout(&out), "hello\nworld\n");
}

#[test]
fn test_default_mode_echoes_commands_in_yellow() {
    let out = pararun(&["echo"], "hello\n");
    let text = stdout(&out);
    let banner = text.find("\x1b[33mecho hello \x1b[0m").expect("no banner");
    let payload = text.find("hello\n").expect("no payload");
    assert!(banner < payload);
}

#[test]
fn test_missing_newline_is_fatal() {
    let out = pararun(&["-q", "echo"], "complete\nincomplete");
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("missing newline"), "stderr was: {err}");
}

#[test]
fn test_bad_jobs_flag_is_usage_error() {
    let out = pararun(&["-j0"], "echo hi\n");
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("bad argument to -j"));
    // Nothing may have been launched.
    assert!(out.stdout.is_empty());
}

#[test]
fn test_failed_job_does_not_stop_the_run() {
    let input = "no-such-program-zzz\necho survived\n";
    let out = pararun(&["-q", "-j1"], input);
    assert_eq!(out.status.code(), Some(127));
    assert!(stdout(&out).ends_with("survived\n"));
}
