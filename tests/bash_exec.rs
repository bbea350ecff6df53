//! Bash execution through the confined filesystem, and the bash↔Python
//! shared-workspace contract.

mod common;

use common::default_sandbox;
use tempfile::TempDir;

/// Creating an escaping symlink from bash must fail, and nothing readable
/// through it may leak.
#[tokio::test(flavor = "multi_thread")]
async fn bash_symlink_escape_blocked() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    let outcome = sandbox
        .execute_bash("ln -s /etc/passwd leak && cat leak", None)
        .await
        .unwrap();
    assert_ne!(outcome.exit_code, 0);
    assert!(
        !outcome.stdout.contains("root:"),
        "leaked /etc/passwd: {}",
        outcome.stdout
    );
    assert!(dir.path().join("leak").symlink_metadata().is_err());
}

/// Round trip across engines: bash writes, Python reads the same bytes.
#[tokio::test(flavor = "multi_thread")]
async fn bash_writes_python_reads() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    let outcome = sandbox
        .execute_bash("echo hi > shared.txt", None)
        .await
        .unwrap();
    assert_eq!(outcome.exit_code, 0, "stderr: {}", outcome.stderr);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("shared.txt")).unwrap(),
        "hi\n"
    );

    let outcome = sandbox
        .execute_python("print(open('shared.txt').read())", &[])
        .await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert!(outcome.stdout.contains("hi"), "stdout: {}", outcome.stdout);
}

/// And the reverse: Python writes, bash reads.
#[tokio::test(flavor = "multi_thread")]
async fn python_writes_bash_reads() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    let outcome = sandbox
        .execute_python("open('fromhigh.txt', 'w').write('python bytes')", &[])
        .await;
    assert!(outcome.success, "error: {:?}", outcome.error);

    let outcome = sandbox.execute_bash("cat fromhigh.txt", None).await.unwrap();
    assert_eq!(outcome.exit_code, 0, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "python bytes");
}

#[tokio::test(flavor = "multi_thread")]
async fn bash_reads_tool_written_files() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    sandbox.write_file("config.ini", "[core]\n").await.unwrap();
    let outcome = sandbox.execute_bash("cat config.ini", None).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.stdout, "[core]\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn nonzero_exit_is_a_result_not_an_error() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    let outcome = sandbox.execute_bash("cat missing.txt", None).await.unwrap();
    assert_ne!(outcome.exit_code, 0);
    assert!(!outcome.stderr.is_empty());

    let outcome = sandbox.execute_bash("definitely-not-a-command", None).await.unwrap();
    assert_eq!(outcome.exit_code, 127);
}

#[tokio::test(flavor = "multi_thread")]
async fn cwd_scopes_relative_paths() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    sandbox.write_file("proj/notes.txt", "scoped").await.unwrap();
    let outcome = sandbox
        .execute_bash("cat notes.txt", Some("proj"))
        .await
        .unwrap();
    assert_eq!(outcome.exit_code, 0, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "scoped");
}

/// A confined symlink created by bash behaves like a normal file for both
/// engines.
#[tokio::test(flavor = "multi_thread")]
async fn confined_symlink_usable() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    sandbox.write_file("real.txt", "aliased").await.unwrap();
    let outcome = sandbox
        .execute_bash("ln -s real.txt alias && cat alias", None)
        .await
        .unwrap();
    assert_eq!(outcome.exit_code, 0, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "aliased");
}

#[tokio::test(flavor = "multi_thread")]
async fn bash_mkdir_and_rm() {
    let dir = TempDir::new().unwrap();
    let sandbox = default_sandbox(dir.path()).await;

    let outcome = sandbox
        .execute_bash("mkdir -p deep/nested && echo marker > deep/nested/m.txt", None)
        .await
        .unwrap();
    assert_eq!(outcome.exit_code, 0, "stderr: {}", outcome.stderr);
    assert!(dir.path().join("deep/nested/m.txt").exists());

    let outcome = sandbox.execute_bash("rm -r deep", None).await.unwrap();
    assert_eq!(outcome.exit_code, 0, "stderr: {}", outcome.stderr);
    assert!(!dir.path().join("deep").exists());
}
