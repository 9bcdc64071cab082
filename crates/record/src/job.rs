//! 스케줄러 작업 테이블 추상화
//!
//! [`JobStore`]는 cron의 영속 작업 테이블을 `list()` / `atomic_replace()` 두 연산으로
//! 추상화합니다. 싱크는 테이블을 독점한다고 가정하지 않으며, 여러 싱크가 동시에
//! 등록할 때 테이블 손상을 막는 유일한 장치는 원자적 교체(임시 파일 + rename)입니다.
//!
//! - [`FileJobStore`]: crontab 스풀 파일 (`/etc/crontabs/root` 등). 시스템 설정 루트용
//! - [`CrontabJobStore`]: 실행 사용자의 crontab (`crontab -l` / `crontab -`).
//!   사용자 설정 루트로 물러났을 때 사용
//! - [`MemoryJobStore`]: 테스트용 인메모리 구현
//!
//! # 작업 식별
//!
//! 작업의 식별자는 로테이션을 트리거하는 셸 명령(`<archiver> -f <config-path>`)
//! 그 자체입니다. 스케줄이 달라도 명령이 같으면 같은 작업으로 봅니다.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::atomic::atomic_write;
use crate::error::RecordError;
use crate::schedule::CronExpression;

/// cron이 그룹/기타 쓰기 권한이 있는 테이블을 거부하므로 0600을 유지합니다.
const JOB_TABLE_MODE: u32 = 0o600;

/// 작업 테이블의 한 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJob {
    schedule: String,
    command: String,
}

impl ScheduledJob {
    /// 아카이버 실행 명령으로 작업을 만듭니다.
    pub fn rotation(schedule: &CronExpression, archiver: &str, config_path: &Path) -> Self {
        Self {
            schedule: schedule.to_string(),
            command: rotation_command(archiver, config_path),
        }
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// 중복 판별 키
    pub fn command(&self) -> &str {
        &self.command
    }

    /// 작업 테이블에 추가할 한 줄 (`<cron> <command>`)
    pub fn table_line(&self) -> String {
        format!("{} {}", self.schedule, self.command)
    }
}

/// 정규 트리거 명령 `<archiver> -f <config-path>`
///
/// cron은 명령 필드의 `%`를 줄바꿈으로 바꾸므로(따옴표 안에서도) `\%`로 이스케이프합니다.
/// 중복 판별 키도 테이블에 쓰이는 이 이스케이프된 형태입니다.
pub fn rotation_command(archiver: &str, config_path: &Path) -> String {
    let command = format!(
        "{} -f {}",
        shell_quote(archiver),
        shell_quote(&config_path.display().to_string())
    );
    command.replace('%', "\\%")
}

/// 안전한 문자만 있으면 그대로, 아니면 작은따옴표로 감쌉니다.
fn shell_quote(raw: &str) -> String {
    let safe = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'));
    if safe {
        raw.to_owned()
    } else {
        format!("'{}'", raw.replace('\'', "'\\''"))
    }
}

/// 작업 테이블 한 줄에서 명령 부분을 추출합니다.
///
/// 빈 줄, 주석, 환경변수 할당(`MAILTO=...`)은 `None`입니다.
/// `@daily cmd` 형태는 매크로 다음부터, 일반 항목은 5개 필드 다음부터가 명령입니다.
pub fn entry_command(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let skip = if trimmed.starts_with('@') { 1 } else { 5 };

    let mut rest = trimmed;
    for _ in 0..skip {
        let end = rest.find(char::is_whitespace)?;
        let field = &rest[..end];
        if skip == 5 && field.contains('=') {
            return None;
        }
        rest = rest[end..].trim_start();
    }
    if rest.is_empty() { None } else { Some(rest) }
}

/// 테이블에 같은 명령을 가진 항목이 있는지 확인합니다.
pub fn table_contains(table: &str, command: &str) -> bool {
    table
        .lines()
        .filter_map(entry_command)
        .any(|existing| existing == command)
}

/// 기존 테이블 끝에 항목을 추가한 새 테이블을 만듭니다.
///
/// 기존 줄(주석 포함)은 그대로 보존하고, 마지막 줄에 개행이 없으면 보충합니다.
pub fn append_entry(table: &str, job: &ScheduledJob) -> String {
    let mut next = String::with_capacity(table.len() + job.table_line().len() + 2);
    next.push_str(table);
    if !next.is_empty() && !next.ends_with('\n') {
        next.push('\n');
    }
    next.push_str(&job.table_line());
    next.push('\n');
    next
}

/// 영속 작업 테이블
pub trait JobStore: Send + Sync {
    /// 테이블 식별자 (로그/에러 메시지용)
    fn location(&self) -> PathBuf;

    /// 현재 테이블 전체 내용을 읽습니다. 테이블이 아직 없으면 빈 문자열입니다.
    fn list(&self) -> impl Future<Output = Result<String, RecordError>> + Send;

    /// 테이블 전체를 원자적으로 교체합니다. 부분적으로 쓰인 테이블은 절대 보이지 않습니다.
    fn atomic_replace(
        &self,
        contents: String,
    ) -> impl Future<Output = Result<(), RecordError>> + Send;

    /// 교체 후 데몬 재적재가 필요한지 여부.
    ///
    /// 스케줄러 API를 거치지 않고 테이블을 직접 쓰는 구현만 `true`입니다.
    fn needs_reload(&self) -> bool {
        true
    }
}

/// crontab 스풀 파일 기반 작업 테이블
#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn registration_error(&self, reason: impl std::fmt::Display) -> RecordError {
        RecordError::JobRegistration {
            table: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl JobStore for FileJobStore {
    fn location(&self) -> PathBuf {
        self.path.clone()
    }

    async fn list(&self) -> Result<String, RecordError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.registration_error(format!("read failed: {e}"))),
        }
    }

    async fn atomic_replace(&self, contents: String) -> Result<(), RecordError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.registration_error(format!("create {}: {e}", parent.display())))?;
        }
        atomic_write(&self.path, contents.as_bytes(), Some(JOB_TABLE_MODE))
            .await
            .map_err(|e| self.registration_error(format!("write failed: {e}")))
    }
}

/// 실행 사용자의 crontab 기반 작업 테이블
///
/// `crontab -l`로 읽고 `crontab -`로 표준 입력을 통해 교체합니다. 교체는
/// `crontab` 명령이 원자적으로 수행하고 데몬에 변경을 알리므로 재적재가 필요 없습니다.
#[derive(Debug, Clone)]
pub struct CrontabJobStore {
    program: String,
    args: Vec<String>,
    command_timeout: Duration,
}

impl CrontabJobStore {
    pub fn new(program: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            command_timeout,
        }
    }

    pub fn from_core(config: &porla_core::config::SchedulerConfig) -> Self {
        Self::new(
            &config.crontab,
            Duration::from_millis(config.command_timeout_ms),
        )
    }

    /// `-l` / `-` 앞에 붙일 인자 (예: `sh <script>`로 감싼 명령)
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn registration_error(&self, reason: impl std::fmt::Display) -> RecordError {
        RecordError::JobRegistration {
            table: self.location(),
            reason: reason.to_string(),
        }
    }

    /// 명령을 실행하고 출력을 모읍니다. `input`이 있으면 표준 입력으로 전달합니다.
    async fn run(
        &self,
        flag: &str,
        input: Option<&[u8]>,
    ) -> Result<std::process::Output, RecordError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(flag)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.registration_error(format!("failed to spawn {}: {e}", self.program))
            })?;

        let io = async {
            if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
                stdin.write_all(data).await?;
                // drop으로 파이프를 닫아야 crontab이 입력 끝을 봄
            }
            child.wait_with_output().await
        };

        tokio::time::timeout(self.command_timeout, io)
            .await
            .map_err(|_| self.registration_error(format!("{} {flag} timed out", self.program)))?
            .map_err(|e| self.registration_error(format!("{} {flag}: {e}", self.program)))
    }
}

impl JobStore for CrontabJobStore {
    fn location(&self) -> PathBuf {
        PathBuf::from(format!("{} (user crontab)", self.program))
    }

    async fn list(&self) -> Result<String, RecordError> {
        let output = self.run("-l", None).await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lowered = stderr.to_lowercase();
        // cronie/vixie: "no crontab for <user>", busybox: "... No such file or directory"
        if lowered.contains("no crontab") || lowered.contains("no such file") {
            debug!(program = %self.program, "user has no crontab yet");
            return Ok(String::new());
        }
        Err(self.registration_error(format!(
            "{} -l exited with {}: {}",
            self.program,
            output.status,
            stderr.trim()
        )))
    }

    async fn atomic_replace(&self, contents: String) -> Result<(), RecordError> {
        let output = self.run("-", Some(contents.as_bytes())).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(self.registration_error(format!(
                "{} - exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn needs_reload(&self) -> bool {
        false
    }
}

/// 인메모리 작업 테이블 (테스트 대역)
///
/// 복제본은 같은 테이블을 공유합니다. `fail_writes`를 켜면 교체가 실패합니다.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<MemoryTable>>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    contents: String,
    writes: usize,
    fail_writes: bool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 내용을 가진 테이블을 만듭니다.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryTable {
                contents: contents.into(),
                ..MemoryTable::default()
            })),
        }
    }

    pub async fn contents(&self) -> String {
        self.inner.lock().await.contents.clone()
    }

    /// 성공한 교체 횟수
    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.writes
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().await.fail_writes = fail;
    }
}

impl JobStore for MemoryJobStore {
    fn location(&self) -> PathBuf {
        PathBuf::from("memory://jobs")
    }

    async fn list(&self) -> Result<String, RecordError> {
        Ok(self.inner.lock().await.contents.clone())
    }

    async fn atomic_replace(&self, contents: String) -> Result<(), RecordError> {
        let mut table = self.inner.lock().await;
        if table.fail_writes {
            return Err(RecordError::JobRegistration {
                table: self.location(),
                reason: "write rejected".to_owned(),
            });
        }
        table.contents = contents;
        table.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(schedule: &str, config: &str) -> ScheduledJob {
        ScheduledJob::rotation(
            &CronExpression::parse(schedule).unwrap(),
            "/usr/sbin/logrotate",
            Path::new(config),
        )
    }

    #[test]
    fn builds_canonical_command_and_line() {
        let job = job("0 0 * * *", "/etc/logrotate.d/porla-out.log");
        assert_eq!(
            job.command(),
            "/usr/sbin/logrotate -f /etc/logrotate.d/porla-out.log"
        );
        assert_eq!(
            job.table_line(),
            "0 0 * * * /usr/sbin/logrotate -f /etc/logrotate.d/porla-out.log"
        );
    }

    #[test]
    fn quotes_paths_with_unsafe_characters() {
        let job = job("0 * * * *", "/home/a b/.config/porla-it's.log");
        assert_eq!(
            job.command(),
            "/usr/sbin/logrotate -f '/home/a b/.config/porla-it'\\''s.log'"
        );
    }

    #[test]
    fn escapes_percent_for_cron() {
        // Given: `%`가 들어간 설정 경로
        let job = job("0 0 * * *", "/etc/logrotate.d/porla-out%d.log");

        // Then: cron이 줄바꿈으로 바꾸지 않도록 `\%`로 기록
        assert_eq!(
            job.table_line(),
            "0 0 * * * /usr/sbin/logrotate -f '/etc/logrotate.d/porla-out\\%d.log'"
        );
        assert!(!job.command().replace("\\%", "").contains('%'));

        // Then: 이스케이프된 형태로 중복 판별
        let table = append_entry("", &job);
        assert!(table_contains(&table, job.command()));
        assert!(!table_contains(
            &table,
            "/usr/sbin/logrotate -f '/etc/logrotate.d/porla-out%d.log'"
        ));
    }

    #[test]
    fn extracts_entry_commands() {
        assert_eq!(entry_command("0 0 * * * logrotate -f /a"), Some("logrotate -f /a"));
        assert_eq!(
            entry_command("  */5   1 * *  0\tlogrotate  -f /a "),
            Some("logrotate  -f /a")
        );
        assert_eq!(entry_command("@daily logrotate -f /a"), Some("logrotate -f /a"));
        assert_eq!(entry_command("# 0 0 * * * logrotate -f /a"), None);
        assert_eq!(entry_command(""), None);
        assert_eq!(entry_command("MAILTO=root"), None);
        assert_eq!(entry_command("0 0 * *"), None);
    }

    #[test]
    fn table_contains_matches_exact_command_only() {
        let table = "# header\n0 0 * * * /usr/sbin/logrotate -f /etc/logrotate.d/porla-out.log\n";
        assert!(table_contains(
            table,
            "/usr/sbin/logrotate -f /etc/logrotate.d/porla-out.log"
        ));
        assert!(!table_contains(
            table,
            "/usr/sbin/logrotate -f /etc/logrotate.d/porla-out"
        ));
        // 주석 처리된 항목은 등록된 것으로 보지 않음
        assert!(!table_contains(
            "# 0 0 * * * logrotate -f /a\n",
            "logrotate -f /a"
        ));
    }

    #[test]
    fn append_preserves_existing_lines() {
        let job = job("0 0 * * *", "/etc/logrotate.d/porla-out.log");
        let next = append_entry("# keep\n*/5 * * * * run-parts /etc/periodic", &job);
        assert_eq!(
            next,
            "# keep\n*/5 * * * * run-parts /etc/periodic\n0 0 * * * /usr/sbin/logrotate -f /etc/logrotate.d/porla-out.log\n"
        );
        assert_eq!(append_entry("", &job), format!("{}\n", job.table_line()));
    }

    #[tokio::test]
    async fn file_store_missing_table_lists_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::new(dir.path().join("crontabs").join("root"));
        assert_eq!(store.list().await.unwrap(), "");
    }

    #[tokio::test]
    async fn file_store_replace_creates_parent_and_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crontabs").join("root");
        let store = FileJobStore::new(&path);

        store
            .atomic_replace("0 0 * * * true\n".to_owned())
            .await
            .unwrap();

        assert_eq!(store.list().await.unwrap(), "0 0 * * * true\n");
        assert_eq!(store.location(), path);
    }

    #[tokio::test]
    async fn file_store_unwritable_location_is_registration_error() {
        let dir = TempDir::new().unwrap();
        // 부모 경로가 일반 파일이면 디렉토리를 만들 수 없음
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = FileJobStore::new(blocker.join("root"));

        let err = store.atomic_replace("x\n".to_owned()).await.unwrap_err();
        assert!(matches!(err, RecordError::JobRegistration { .. }));
    }

    /// 지정한 파일을 사용자 테이블처럼 다루는 crontab 대역 스크립트
    fn fake_crontab(dir: &TempDir) -> (CrontabJobStore, PathBuf) {
        let table = dir.path().join("user.tab");
        let script = dir.path().join("crontab.sh");
        std::fs::write(
            &script,
            format!(
                "case \"$1\" in\n\
                 -l) [ -f '{t}' ] && exec cat '{t}'; echo 'no crontab for tester' >&2; exit 1 ;;\n\
                 -) exec cat > '{t}' ;;\n\
                 esac\nexit 2\n",
                t = table.display()
            ),
        )
        .unwrap();
        let store = CrontabJobStore::new("sh", Duration::from_secs(5))
            .with_args([script.display().to_string()]);
        (store, table)
    }

    #[tokio::test]
    async fn crontab_store_without_table_lists_empty() {
        // Given: 아직 crontab이 없는 사용자
        let dir = TempDir::new().unwrap();
        let (store, _) = fake_crontab(&dir);

        // When / Then: "no crontab" 실패는 빈 테이블로 취급
        assert_eq!(store.list().await.unwrap(), "");
        assert!(!store.needs_reload());
    }

    #[tokio::test]
    async fn crontab_store_replace_goes_through_stdin() {
        // Given
        let dir = TempDir::new().unwrap();
        let (store, table) = fake_crontab(&dir);

        // When: 표준 입력으로 테이블을 교체
        store
            .atomic_replace("0 0 * * * true\n".to_owned())
            .await
            .unwrap();

        // Then
        assert_eq!(std::fs::read_to_string(&table).unwrap(), "0 0 * * * true\n");
        assert_eq!(store.list().await.unwrap(), "0 0 * * * true\n");
    }

    #[tokio::test]
    async fn crontab_store_other_failures_are_registration_errors() {
        // Given: 알 수 없는 이유로 실패하는 crontab
        let store = CrontabJobStore::new("sh", Duration::from_secs(5))
            .with_args(["-c", "echo 'permission denied' >&2; exit 1", "crontab"]);

        // When / Then
        let err = store.list().await.unwrap_err();
        assert!(matches!(err, RecordError::JobRegistration { .. }));
        assert!(err.to_string().contains("permission denied"));
        assert!(store.atomic_replace("x\n".to_owned()).await.is_err());
    }

    #[tokio::test]
    async fn crontab_store_missing_program_is_registration_error() {
        let store = CrontabJobStore::new("/nonexistent/crontab", Duration::from_secs(5));
        let err = store.list().await.unwrap_err();
        assert!(matches!(err, RecordError::JobRegistration { .. }));
    }

    #[tokio::test]
    async fn memory_store_shares_state_between_clones() {
        let store = MemoryJobStore::with_contents("# seed\n");
        let clone = store.clone();
        clone.atomic_replace("# next\n".to_owned()).await.unwrap();
        assert_eq!(store.contents().await, "# next\n");
        assert_eq!(store.write_count().await, 1);
    }

    #[tokio::test]
    async fn memory_store_can_reject_writes() {
        let store = MemoryJobStore::new();
        store.set_fail_writes(true).await;
        assert!(store.atomic_replace("x\n".to_owned()).await.is_err());
        assert_eq!(store.write_count().await, 0);
    }
}
