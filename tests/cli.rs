//! End-to-end CLI scenarios (spec §8).

use assert_cmd::Command;
use predicates::prelude::*;

fn minibash() -> Command {
    Command::cargo_bin("minibash").unwrap()
}

#[test]
fn echo_hello_world() {
    minibash()
        .arg(write_script("echo hello world"))
        .assert()
        .success()
        .stdout("hello world\n");
}

#[test]
fn variable_expansion_in_double_quotes() {
    minibash()
        .arg(write_script("A=one; B=two; echo \"$A-$B\""))
        .assert()
        .success()
        .stdout("one-two\n");
}

#[test]
fn dollar_question_reflects_prior_status() {
    minibash()
        .arg(write_script("true; echo \"s=$?\""))
        .assert()
        .success()
        .stdout("s=0\n");
}

#[test]
fn pipeline_word_count() {
    minibash()
        .arg(write_script("echo a b c | wc -w"))
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn or_rescues_after_failure() {
    minibash()
        .arg(write_script("false || echo rescued"))
        .assert()
        .success()
        .stdout("rescued\n");
}

#[test]
fn redirection_then_cat() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("mb.out");
    let script = format!(
        "echo hi > {path}; cat {path}",
        path = out_path.to_str().unwrap()
    );
    minibash()
        .arg(write_script(&script))
        .assert()
        .success()
        .stdout("hi\n");
}

#[test]
fn command_substitution_with_date() {
    minibash()
        .arg(write_script("echo \"now=$(date +%Y)\""))
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^now=\d{4}\n$").unwrap());
}

#[test]
fn empty_string_argument_preserved() {
    minibash()
        .arg(write_script("echo \"\" x"))
        .assert()
        .success()
        .stdout(" x\n");
}

#[test]
fn nonexistent_command_exits_127() {
    minibash()
        .arg(write_script("definitely-not-a-real-command-xyz"))
        .assert()
        .code(127);
}

fn write_script(contents: &str) -> std::path::PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.sh");
    std::fs::write(&path, contents).unwrap();
    // Leak the tempdir so the file outlives this function; tests run in a
    // fresh process per invocation so this does not accumulate.
    std::mem::forget(dir);
    path
}
