//! Integration tests for the `record` binary.
//!
//! Each test points every writable location (config roots, job table,
//! target) into a temp directory via an explicit `--config` file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().expect("should create temp dir");
        let root = dir.path();
        let config = root.join("porla.toml");
        let contents = format!(
            r#"
[general]
log_level = "warn"
log_format = "json"

[rotation]
system_config_dir = "{system}"
user_config_dir = "{user}"

[scheduler]
daemon = "porla-test-missing-crond"
job_table = "{table}"
crontab = "porla-test-missing-crontab"
command_timeout_ms = 500
retry_delay_ms = 1
reload_after_register = false

[ingest]
flush_interval_ms = 10
"#,
            system = root.join("logrotate.d").display(),
            user = root.join("user-logrotate.d").display(),
            table = root.join("crontabs").join("root").display(),
        );
        std::fs::write(&config, contents).expect("should write config");
        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn system_root(&self) -> PathBuf {
        self.path("logrotate.d")
    }

    fn job_table(&self) -> PathBuf {
        self.path("crontabs").join("root")
    }

    fn run(&self, args: &[&str], input: &[u8]) -> Output {
        let mut child = Command::new(env!("CARGO_BIN_EXE_record"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env_remove("RUST_LOG")
            .env("HOME", self.dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("should spawn record");
        {
            let mut stdin = child.stdin.take().expect("stdin should be piped");
            // record may exit before reading (validation failure)
            let _ = stdin.write_all(input);
        }
        child.wait_with_output().expect("should wait for record")
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_plain_ingest_appends_lines_byte_for_byte() {
    // Given: No rotation flags
    let sandbox = Sandbox::new();
    let target = sandbox.path("out.txt");
    let input: Vec<u8> = (0..200)
        .flat_map(|n| format!("line {n}\twith tab\n").into_bytes())
        .collect();

    // When
    let output = sandbox.run(&[&arg(&target)], &input);

    // Then: Exact copy, nothing on stdout, no rotation artifacts
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(std::fs::read(&target).expect("target exists"), input);
    assert!(output.stdout.is_empty(), "stdout must stay clean");
    assert!(!sandbox.system_root().exists());
    assert!(!sandbox.job_table().exists());
}

#[test]
fn test_second_run_appends_after_first() {
    let sandbox = Sandbox::new();
    let target = sandbox.path("out.txt");

    sandbox.run(&[&arg(&target)], b"first\n");
    let output = sandbox.run(&[&arg(&target)], b"second\n");

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        std::fs::read_to_string(&target).expect("target exists"),
        "first\nsecond\n"
    );
}

#[test]
fn test_bad_cron_exits_1_and_writes_nothing() {
    // Given
    let sandbox = Sandbox::new();
    let target = sandbox.path("x").join("out.log");

    // When
    let output = sandbox.run(&[&arg(&target), "--rotate-at", "bad"], b"ignored\n");

    // Then
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("minute hour day month weekday"), "stderr: {err}");
    assert!(err.contains("0 0 * * *"), "stderr should include an example");
    assert!(!sandbox.system_root().exists());
    assert!(!sandbox.job_table().exists());
    assert!(!target.exists());
}

#[test]
fn test_unknown_interval_exits_1_with_valid_set() {
    let sandbox = Sandbox::new();
    let target = sandbox.path("out.log");

    let output = sandbox.run(&[&arg(&target), "--rotate-interval", "Daily"], b"");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("hourly|daily|weekly|monthly"));
    assert!(!target.exists());
}

#[test]
fn test_date_format_without_directive_exits_1() {
    let sandbox = Sandbox::new();
    let target = sandbox.path("out.log");

    let output = sandbox.run(
        &[
            &arg(&target),
            "--rotate-interval",
            "daily",
            "--date-format",
            "-today",
        ],
        b"",
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("-%Y%m%d"));
}

#[test]
fn test_zero_rotate_count_exits_1() {
    let sandbox = Sandbox::new();
    let target = sandbox.path("out.log");

    let output = sandbox.run(
        &[&arg(&target), "--rotate-interval", "daily", "--rotate-count", "0"],
        b"",
    );

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_rotation_setup_end_to_end() {
    // Given: A rotation request; the scheduler daemon does not exist
    let sandbox = Sandbox::new();
    let target = sandbox.path("x").join("out.log");
    let args = [
        arg(&target),
        "--rotate-at".to_owned(),
        "0 0 * * *".to_owned(),
        "--rotate-count".to_owned(),
        "10".to_owned(),
        "--date-format".to_owned(),
        "-%Y-%m-%d".to_owned(),
    ];
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    // When: Run twice, as on a sink restart
    let first = sandbox.run(&args, b"one\n");
    let second = sandbox.run(&args, b"two\n");

    // Then: Both runs ingest despite the missing scheduler
    assert_eq!(first.status.code(), Some(0), "stderr: {}", stderr(&first));
    assert_eq!(second.status.code(), Some(0));
    assert!(stderr(&first).contains("porla-test-missing-crond"));
    assert_eq!(
        std::fs::read_to_string(&target).expect("target exists"),
        "one\ntwo\n"
    );

    // Then: Policy at the canonical path
    let config_path = sandbox.system_root().join("porla-out.log");
    let config = std::fs::read_to_string(&config_path).expect("config written");
    assert!(config.contains("rotate 10"));
    assert!(config.contains("dateformat -%Y-%m-%d"));
    assert!(config.contains("extension .log"));

    // Then: Exactly one job entry
    let table = std::fs::read_to_string(sandbox.job_table()).expect("job table written");
    let entries: Vec<&str> = table
        .lines()
        .filter(|l| l.contains(&arg(&config_path)))
        .collect();
    assert_eq!(entries.len(), 1, "table: {table}");
    assert!(entries[0].starts_with("0 0 * * * "));
}

#[test]
fn test_dry_run_json_writes_nothing() {
    let sandbox = Sandbox::new();
    let target = sandbox.path("app.log");

    let output = sandbox.run(
        &[
            &arg(&target),
            "--rotate-interval",
            "weekly",
            "--dry-run",
            "--output",
            "json",
        ],
        b"not ingested\n",
    );

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert!(
        report["job_line"]
            .as_str()
            .is_some_and(|l| l.starts_with("0 0 * * 0 "))
    );
    assert!(!target.exists());
    assert!(!sandbox.system_root().exists());
    assert!(!sandbox.job_table().exists());
}

#[test]
fn test_missing_explicit_config_exits_2() {
    let dir = TempDir::new().expect("should create temp dir");
    let output = Command::new(env!("CARGO_BIN_EXE_record"))
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg(dir.path().join("out.log"))
        .stdin(Stdio::null())
        .output()
        .expect("should run record");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.toml"));
}

#[test]
fn test_conflicting_triggers_are_rejected() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(
        &[
            &arg(&sandbox.path("out.log")),
            "--rotate-at",
            "0 0 * * *",
            "--rotate-interval",
            "daily",
        ],
        b"",
    );

    assert!(!output.status.success());
    assert!(!sandbox.path("out.log").exists());
}
