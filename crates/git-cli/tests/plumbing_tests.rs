//! Integration tests for plumbing commands.
//!
//! These tests create temporary git repositories using C git, then run our
//! `gitr` binary against them and verify the output matches C git's output.

mod common;
use common::*;

use std::process::Command;

/// Create a test repo with some content.
fn setup_test_repo(dir: &std::path::Path) {
    git(dir, &["init"]);
    git(dir, &["config", "user.name", "Test Author"]);
    git(dir, &["config", "user.email", "test@example.com"]);

    std::fs::write(dir.join("hello.txt"), "hello world\n").unwrap();
    std::fs::write(dir.join("foo.txt"), "foo content\n").unwrap();

    git(dir, &["add", "hello.txt", "foo.txt"]);
    git(dir, &["commit", "-m", "initial commit"]);
}

// ============== hash-object tests ==============

#[test]
fn hash_object_stdin() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let c_git_output = Command::new("git")
        .args(["hash-object", "--stdin"])
        .current_dir(dir.path())
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            use std::io::Write;
            child.stdin.take().unwrap().write_all(b"hello\n").unwrap();
            child.wait_with_output()
        })
        .unwrap();
    let expected = String::from_utf8_lossy(&c_git_output.stdout).trim().to_string();

    let gitr_output = Command::new(gitr_bin())
        .args(["hash-object", "--stdin"])
        .current_dir(dir.path())
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            use std::io::Write;
            child.stdin.take().unwrap().write_all(b"hello\n").unwrap();
            child.wait_with_output()
        })
        .unwrap();
    let actual = String::from_utf8_lossy(&gitr_output.stdout).trim().to_string();

    assert_eq!(actual, expected, "hash-object --stdin mismatch");
}

#[test]
fn hash_object_file() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let expected = git(dir.path(), &["hash-object", "hello.txt"]);
    let result = gitr(dir.path(), &["hash-object", "hello.txt"]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "hash-object file mismatch");
}

// ============== cat-file tests ==============

#[test]
fn cat_file_type() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let oid = git(dir.path(), &["rev-parse", "HEAD"]).stdout.trim().to_string();

    let expected = git(dir.path(), &["cat-file", "-t", &oid]);
    let result = gitr(dir.path(), &["cat-file", "-t", &oid]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "cat-file -t mismatch");
}

#[test]
fn cat_file_size() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let oid = git(dir.path(), &["rev-parse", "HEAD"]).stdout.trim().to_string();

    let expected = git(dir.path(), &["cat-file", "-s", &oid]);
    let result = gitr(dir.path(), &["cat-file", "-s", &oid]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "cat-file -s mismatch");
}

#[test]
fn cat_file_pretty_blob() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let oid = git(dir.path(), &["hash-object", "hello.txt"]).stdout.trim().to_string();

    let expected = git(dir.path(), &["cat-file", "-p", &oid]);
    let result = gitr(dir.path(), &["cat-file", "-p", &oid]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, expected.stdout, "cat-file -p blob mismatch");
}

// ============== rev-parse tests ==============

#[test]
fn rev_parse_head() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let expected = git(dir.path(), &["rev-parse", "HEAD"]);
    let result = gitr(dir.path(), &["rev-parse", "HEAD"]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "rev-parse HEAD mismatch");
}

#[test]
fn rev_parse_git_dir() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let expected = git(dir.path(), &["rev-parse", "--git-dir"]);
    let result = gitr(dir.path(), &["rev-parse", "--git-dir"]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "rev-parse --git-dir mismatch");
}

#[test]
fn rev_parse_is_bare() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let expected = git(dir.path(), &["rev-parse", "--is-bare-repository"]);
    let result = gitr(dir.path(), &["rev-parse", "--is-bare-repository"]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "rev-parse --is-bare-repository mismatch");
}

// ============== symbolic-ref tests ==============

#[test]
fn symbolic_ref_read_head() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let expected = git(dir.path(), &["symbolic-ref", "HEAD"]);
    let result = gitr(dir.path(), &["symbolic-ref", "HEAD"]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "symbolic-ref HEAD mismatch");
}

// ============== for-each-ref tests ==============

#[test]
fn for_each_ref_basic() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let expected = git(dir.path(), &["for-each-ref"]);
    let result = gitr(dir.path(), &["for-each-ref"]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "for-each-ref mismatch");
}

// ============== rev-list tests ==============

#[test]
fn rev_list_head() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let expected = git(dir.path(), &["rev-list", "HEAD"]);
    let result = gitr(dir.path(), &["rev-list", "HEAD"]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "rev-list HEAD mismatch");
}

// ============== merge-base tests ==============

#[test]
fn merge_base_self() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let oid = git(dir.path(), &["rev-parse", "HEAD"]).stdout.trim().to_string();

    let expected = git(dir.path(), &["merge-base", &oid, &oid]);
    let result = gitr(dir.path(), &["merge-base", &oid, &oid]);

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), expected.stdout.trim(), "merge-base self mismatch");
}

// ============== update-ref / for-each-ref round-trip ==============

#[test]
fn update_ref_create_and_list() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let oid = git(dir.path(), &["rev-parse", "HEAD"]).stdout.trim().to_string();

    // Create a new ref with gitr
    let result = gitr(dir.path(), &["update-ref", "refs/heads/test-branch", &oid]);
    assert_eq!(result.exit_code, 0);

    // Verify it exists
    let out = gitr(dir.path(), &["for-each-ref", "refs/heads/test-branch"]);
    assert_eq!(out.exit_code, 0);
    assert!(out.stdout.contains(&oid), "for-each-ref should contain the OID");
}

#[test]
fn update_ref_delete() {
    let dir = tempfile::tempdir().unwrap();
    setup_test_repo(dir.path());

    let oid = git(dir.path(), &["rev-parse", "HEAD"]).stdout.trim().to_string();

    gitr(dir.path(), &["update-ref", "refs/heads/to-delete", &oid]);
    let result = gitr(dir.path(), &["update-ref", "-d", "refs/heads/to-delete"]);
    assert_eq!(result.exit_code, 0);

    let out = gitr(dir.path(), &["for-each-ref", "refs/heads/to-delete"]);
    assert_eq!(out.exit_code, 0);
    assert!(out.stdout.trim().is_empty(), "ref should be gone after delete");
}
