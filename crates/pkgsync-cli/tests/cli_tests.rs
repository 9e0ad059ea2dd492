//! End-to-end tests driving the `pkgsync` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FINGERPRINT_A: &str = "79A79C692BB55298B1BAAB01CD9A418A4BBF0D310AEA11693BB766D75D94B7C0";
const FINGERPRINT_B: &str = "1788824B11C0ED8DCFC7E7FD3AF0BEA2FA96681CC4A2F578FB6C55B3E454A188";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../pkgsync-core/tests/fixtures")
        .join(name)
}

/// A throwaway pkgsync home
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join(".pkgsync");
        Self { temp_dir, home }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pkgsync"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("PKGSYNC_HOME", &self.home);
        cmd.env("NO_COLOR", "1");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.cmd().args(args).output().expect("failed to run pkgsync")
    }

    /// A `file://` repository directory serving `jar` as its v1 index.
    fn local_repo(&self, name: &str, jar: &str) -> String {
        let dir = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::copy(fixture(jar), dir.join("index-v1.jar")).unwrap();
        format!("file://{}", dir.display())
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    assert!(ctx.run(&["--version"]).status.success());
}

#[test]
fn test_repo_list_creates_state_db() {
    let ctx = TestContext::new();
    let output = ctx.run(&["repo", "list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No repositories"));
    assert!(ctx.home.join("state.db").exists());
}

#[test]
fn test_repo_add_list_remove() {
    let ctx = TestContext::new();

    let output = ctx.run(&[
        "repo",
        "add",
        "https://repo.example.org/fdroid/repo",
        "--fingerprint",
        FINGERPRINT_A,
    ]);
    assert!(output.status.success(), "{output:?}");

    let output = ctx.run(&["repo", "add", "https://other.example.org/repo", "--format", "xml"]);
    assert!(output.status.success(), "{output:?}");

    // Same address twice is refused
    let output = ctx.run(&["repo", "add", "https://repo.example.org/fdroid/repo/"]);
    assert!(!output.status.success());

    let listing = stdout(&ctx.run(&["repo", "list"]));
    assert!(listing.contains("https://repo.example.org/fdroid/repo"));
    assert!(listing.contains("https://other.example.org/repo"));
    assert!(listing.contains(&format!("pinned {}", &FINGERPRINT_A[..16])));
    assert!(listing.contains("xml"));

    assert!(ctx.run(&["repo", "remove", "1"]).status.success());
    let listing = stdout(&ctx.run(&["repo", "list"]));
    assert!(!listing.contains("https://repo.example.org/fdroid/repo"));
    assert!(!ctx.run(&["repo", "remove", "1"]).status.success());
}

#[test]
fn test_repo_add_rejects_bad_input() {
    let ctx = TestContext::new();
    assert!(!ctx.run(&["repo", "add", "ftp://repo.example.org"]).status.success());
    assert!(
        !ctx
            .run(&["repo", "add", "https://repo.example.org", "--fingerprint", "abcd"])
            .status
            .success()
    );
    assert!(
        !ctx
            .run(&["repo", "add", "https://repo.example.org", "--format", "v2"])
            .status
            .success()
    );
}

#[test]
fn test_fingerprint_of_certificate_and_archive() {
    let ctx = TestContext::new();

    let output = ctx.run(&["fingerprint", fixture("repo-a.der").to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim().replace(' ', ""), FINGERPRINT_A);

    let output = ctx.run(&["fingerprint", fixture("v1-signed-b.jar").to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim().replace(' ', ""), FINGERPRINT_B);

    let output = ctx.run(&["fingerprint", fixture("legacy-signed-a.jar").to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim().replace(' ', ""), FINGERPRINT_A);

    let output = ctx.run(&["fingerprint", fixture("v1-unsigned.jar").to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_update_local_repo_then_list_apps() {
    let ctx = TestContext::new();
    let address = ctx.local_repo("repo", "v1-signed-a.jar");

    let output = ctx.run(&["repo", "add", &address, "--fingerprint", FINGERPRINT_A]);
    assert!(output.status.success(), "{output:?}");

    let output = ctx.run(&["update"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("1 apps, 1 packages"));

    let apps = stdout(&ctx.run(&["apps"]));
    assert!(apps.contains("org.example.app"));
    assert!(apps.contains("1.0"));

    let filtered = stdout(&ctx.run(&["apps", "nothing-matches"]));
    assert!(filtered.contains("No apps found"));

    // Second run sees the same archive and changes nothing
    let output = ctx.run(&["update"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("up to date"));

    let listing = stdout(&ctx.run(&["repo", "list"]));
    assert!(listing.contains(&format!("signer {}", &FINGERPRINT_A[..16])));
}

#[test]
fn test_update_fails_on_wrong_signer() {
    let ctx = TestContext::new();
    let address = ctx.local_repo("repo", "v1-signed-b.jar");

    let output = ctx.run(&["repo", "add", &address, "--fingerprint", FINGERPRINT_A]);
    assert!(output.status.success(), "{output:?}");

    let output = ctx.run(&["update"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("1 of 1 repositories failed"));

    let apps = stdout(&ctx.run(&["apps"]));
    assert!(apps.contains("No apps found"));
}

#[test]
fn test_configured_repos_are_seeded() {
    let ctx = TestContext::new();
    std::fs::create_dir_all(&ctx.home).unwrap();
    std::fs::write(
        ctx.home.join("config.toml"),
        "[[repo]]\naddress = \"https://seeded.example.org/repo\"\n",
    )
    .unwrap();

    let listing = stdout(&ctx.run(&["repo", "list"]));
    assert!(listing.contains("https://seeded.example.org/repo"));
}
