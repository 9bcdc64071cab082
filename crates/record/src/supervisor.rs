//! 싱크 생명주기 감독자
//!
//! [`Supervisor`]는 시작 순서를 조율합니다.
//!
//! ```text
//! Starting -> (ValidatingSchedule -> CompilingPolicy -> RegisteringJob) -> Ingesting -> Stopped
//! ```
//!
//! - 트리거가 없으면 괄호 안 단계를 건너뜁니다 (로테이션은 opt-in).
//! - 스케줄/날짜 형식/보관 개수 검증 실패만 치명적이며 `Err`로 반환됩니다.
//!   이때 설정 루트와 작업 테이블에는 아무것도 쓰지 않습니다.
//! - 그 이후의 실패(설정 루트 권한, 설정 파일 쓰기, 스케줄러, 작업 등록)는
//!   [`StartupWarning`]으로 강등되며 싱크는 항상 `Ingesting`에 도달합니다.
//! - 작업은 선택된 설정 루트의 범위에 맞는 테이블([`JobStores`])에 등록됩니다.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use porla_core::config::PorlaConfig;
use porla_core::metrics as m;

use crate::compiler::{ArchiveOwner, PolicyCompiler, RotationConfigDocument};
use crate::config_root::{ConfigRoot, ConfigRootResolver, RootScope};
use crate::error::RecordError;
use crate::job::{JobStore, ScheduledJob};
use crate::policy::{PolicyDefaults, RotationPolicy, RotationRequest};
use crate::registrar::{JobRegistrar, Registration};
use crate::scheduler::SchedulerHandle;

/// 트리거 없이 로테이션 옵션만 지정된 경우의 경고 종류
const ORPHAN_OPTIONS_KIND: &str = "orphan_options";

/// 싱크 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkState {
    Starting,
    ValidatingSchedule,
    CompilingPolicy,
    RegisteringJob,
    Ingesting,
    Stopped,
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::ValidatingSchedule => "validating_schedule",
            Self::CompilingPolicy => "compiling_policy",
            Self::RegisteringJob => "registering_job",
            Self::Ingesting => "ingesting",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// 시작 과정에서 강등된 비치명적 실패
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupWarning {
    /// 메트릭 레이블과 같은 종류 이름
    pub kind: &'static str,
    pub message: String,
}

impl StartupWarning {
    fn from_error(err: &RecordError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// 시작 결과 보고서
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    /// 거쳐 온 상태 (마지막이 현재 상태)
    pub states: Vec<SinkState>,
    /// 대상 파일의 절대 경로
    pub target: PathBuf,
    pub policy: Option<RotationPolicy>,
    /// 기록된 로테이션 설정 경로
    pub config_path: Option<PathBuf>,
    /// 설정 루트 범위 (작업이 등록될 테이블을 결정)
    pub root_scope: Option<RootScope>,
    pub job: Option<ScheduledJob>,
    pub registration: Option<Registration>,
    pub warnings: Vec<StartupWarning>,
}

impl StartupReport {
    fn new(target: PathBuf) -> Self {
        Self {
            states: vec![SinkState::Starting],
            target,
            policy: None,
            config_path: None,
            root_scope: None,
            job: None,
            registration: None,
            warnings: Vec::new(),
        }
    }

    /// 현재 상태
    pub fn state(&self) -> SinkState {
        self.states.last().copied().unwrap_or(SinkState::Starting)
    }

    /// 로테이션 작업이 작업 테이블에 존재하는지 확인합니다.
    pub fn rotation_scheduled(&self) -> bool {
        self.registration.is_some()
    }

    /// 기록이 끝났음을 표시합니다.
    pub fn stop(&mut self) {
        self.enter(SinkState::Stopped);
    }

    fn enter(&mut self, state: SinkState) {
        tracing::debug!(from = %self.state(), to = %state, "sink state transition");
        self.states.push(state);
    }

    fn warn(&mut self, err: &RecordError) {
        self.push_warning(StartupWarning::from_error(err));
    }

    fn push_warning(&mut self, warning: StartupWarning) {
        warn!(kind = warning.kind, "{}", warning.message);
        metrics::counter!(m::RECORD_ROTATION_WARNINGS_TOTAL, m::LABEL_KIND => warning.kind)
            .increment(1);
        self.warnings.push(warning);
    }
}

/// 드라이런 결과 -- 아무것도 쓰지 않고 계산한 산출물
#[derive(Debug, Clone, Serialize)]
pub struct RotationPreview {
    pub target: PathBuf,
    pub policy: Option<RotationPolicy>,
    pub document: Option<RotationConfigDocument>,
    /// 쓰일 예정인 설정 경로 (첫 번째 후보 루트 기준)
    pub config_path: Option<PathBuf>,
    /// 작업 테이블에 추가될 줄
    pub job_line: Option<String>,
    pub warnings: Vec<StartupWarning>,
}

/// 감독자 구성 요소 (설정 파일에서 유래)
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub defaults: PolicyDefaults,
    pub compiler: PolicyCompiler,
    pub resolver: ConfigRootResolver,
    pub archiver: String,
    pub retry_delay: Duration,
    pub reload_after_register: bool,
}

impl SupervisorSettings {
    pub fn from_config(config: &PorlaConfig) -> Self {
        Self {
            defaults: PolicyDefaults::from_core(&config.rotation),
            compiler: PolicyCompiler::from_core(&config.rotation),
            resolver: ConfigRootResolver::from_core(&config.rotation),
            archiver: config.archiver.binary.clone(),
            retry_delay: Duration::from_millis(config.scheduler.retry_delay_ms),
            reload_after_register: config.scheduler.reload_after_register,
        }
    }

    /// 기본값에 설정 루트 후보만 지정한 구성
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            defaults: PolicyDefaults::default(),
            compiler: PolicyCompiler::default().with_owner(ArchiveOwner::current()),
            resolver: ConfigRootResolver::new(roots),
            archiver: "/usr/sbin/logrotate".to_owned(),
            retry_delay: Duration::from_millis(1),
            reload_after_register: true,
        }
    }
}

/// 설정 루트 범위별 작업 테이블
#[derive(Debug, Clone)]
pub struct JobStores<S, U> {
    /// 시스템 설정 루트용 (crontab 스풀 파일)
    pub system: S,
    /// 사용자 설정 루트용 (실행 사용자의 crontab)
    pub user: U,
}

/// 싱크 시작 감독자
pub struct Supervisor<S, U, H> {
    defaults: PolicyDefaults,
    compiler: PolicyCompiler,
    resolver: ConfigRootResolver,
    stores: JobStores<S, U>,
    registrar: JobRegistrar<H>,
}

impl<S: JobStore, U: JobStore, H: SchedulerHandle> Supervisor<S, U, H> {
    pub fn new(settings: SupervisorSettings, stores: JobStores<S, U>, scheduler: H) -> Self {
        let registrar = JobRegistrar::new(scheduler, settings.archiver)
            .with_retry_delay(settings.retry_delay)
            .with_reload_after_register(settings.reload_after_register);
        Self {
            defaults: settings.defaults,
            compiler: settings.compiler,
            resolver: settings.resolver,
            stores,
            registrar,
        }
    }

    /// 로테이션을 준비하고 기록 직전 상태까지 진행합니다.
    ///
    /// # Errors
    ///
    /// 검증 에러([`RecordError::is_validation`])만 반환됩니다. 이 경우 싱크는
    /// 기록하지 않고 `Stopped`로 끝나야 합니다.
    pub async fn start(&self, request: &RotationRequest) -> Result<StartupReport, RecordError> {
        let request = absolutize(request);
        let mut report = StartupReport::new(request.target.clone());

        if let Some(warning) = orphan_options_warning(&request) {
            report.push_warning(warning);
        }

        if !request.has_trigger() {
            info!(path = %request.target.display(), "no rotation trigger, ingesting only");
            metrics::gauge!(m::RECORD_ROTATION_ENABLED).set(0.0);
            report.enter(SinkState::Ingesting);
            return Ok(report);
        }

        report.enter(SinkState::ValidatingSchedule);
        let Some(policy) = RotationPolicy::from_request(&request, &self.defaults)? else {
            report.enter(SinkState::Ingesting);
            return Ok(report);
        };

        report.enter(SinkState::CompilingPolicy);
        let document = self.compiler.compile(&policy);
        report.policy = Some(policy.clone());

        if let Some((root, config_path)) = self.install_document(&document, &mut report).await {
            report.enter(SinkState::RegisteringJob);
            report.root_scope = Some(root.scope);
            self.schedule(&policy, root.scope, &config_path, &mut report).await;
            report.config_path = Some(config_path);
        }

        metrics::gauge!(m::RECORD_ROTATION_ENABLED).set(if report.rotation_scheduled() {
            1.0
        } else {
            0.0
        });
        report.enter(SinkState::Ingesting);
        info!(
            path = %report.target.display(),
            scheduled = report.rotation_scheduled(),
            warnings = report.warnings.len(),
            "sink ready"
        );
        Ok(report)
    }

    /// 아무것도 쓰지 않고 시작 결과를 미리 계산합니다.
    ///
    /// # Errors
    ///
    /// 검증 에러
    pub fn preview(&self, request: &RotationRequest) -> Result<RotationPreview, RecordError> {
        let request = absolutize(request);
        let warnings = orphan_options_warning(&request).into_iter().collect();
        let policy = RotationPolicy::from_request(&request, &self.defaults)?;

        let document = policy.as_ref().map(|p| self.compiler.compile(p));
        let config_path = document.as_ref().and_then(|doc| {
            self.resolver
                .candidates()
                .first()
                .map(|root| doc.config_path(root))
        });
        let job_line = match (&policy, &config_path) {
            (Some(policy), Some(path)) => Some(
                self.registrar
                    .job_for(&policy.cron_expression(), path)
                    .table_line(),
            ),
            _ => None,
        };

        Ok(RotationPreview {
            target: request.target,
            policy,
            document,
            config_path,
            job_line,
            warnings,
        })
    }

    /// 설정 루트를 고르고 문서를 씁니다. 실패하면 경고를 남기고 `None`.
    async fn install_document(
        &self,
        document: &RotationConfigDocument,
        report: &mut StartupReport,
    ) -> Option<(ConfigRoot, PathBuf)> {
        let root = match self.resolver.resolve().await {
            Ok(root) => root,
            Err(e) => {
                report.warn(&e);
                return None;
            }
        };
        match document.write_to(&root.path).await {
            Ok(path) => {
                info!(path = %path.display(), scope = ?root.scope, "rotation config installed");
                Some((root, path))
            }
            Err(e) => {
                report.warn(&e);
                None
            }
        }
    }

    /// 스케줄러를 확인하고 루트 범위에 맞는 테이블에 작업을 등록합니다.
    /// 실패는 경고로 남깁니다.
    async fn schedule(
        &self,
        policy: &RotationPolicy,
        scope: RootScope,
        config_path: &Path,
        report: &mut StartupReport,
    ) {
        let job = self
            .registrar
            .job_for(&policy.cron_expression(), config_path);

        // 데몬이 없어도 테이블 항목은 남겨 두면 데몬이 올라올 때 반영됨
        if let Err(e) = self.registrar.ensure_scheduler(config_path).await {
            report.warn(&e);
        }

        let registered = match scope {
            RootScope::System => {
                self.registrar
                    .register(&self.stores.system, &job, config_path)
                    .await
            }
            RootScope::User => {
                self.registrar
                    .register(&self.stores.user, &job, config_path)
                    .await
            }
        };
        match registered {
            Ok(outcome) => {
                report.registration = Some(outcome.registration);
                if let Some(e) = outcome.reload_warning {
                    report.warn(&e);
                }
            }
            Err(e) => report.warn(&e),
        }
        report.job = Some(job);
    }
}

/// 대상 경로를 절대 경로로 바꿉니다.
///
/// 설정 파일과 작업 명령은 cron 데몬의 작업 디렉토리와 무관해야 합니다.
fn absolutize(request: &RotationRequest) -> RotationRequest {
    let mut request = request.clone();
    if !request.target.as_os_str().is_empty() {
        if let Ok(absolute) = std::path::absolute(&request.target) {
            request.target = absolute;
        }
    }
    request
}

fn orphan_options_warning(request: &RotationRequest) -> Option<StartupWarning> {
    request.has_orphan_options().then(|| StartupWarning {
        kind: ORPHAN_OPTIONS_KIND,
        message: "--rotate-count/--date-format ignored without --rotate-at or --rotate-interval"
            .to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MemoryJobStore;
    use crate::scheduler::FakeScheduler;
    use tempfile::TempDir;

    type TestSupervisor = Supervisor<MemoryJobStore, MemoryJobStore, FakeScheduler>;

    fn supervisor(root: &Path, store: MemoryJobStore, scheduler: FakeScheduler) -> TestSupervisor {
        Supervisor::new(
            SupervisorSettings::with_roots(vec![root.to_path_buf()]),
            JobStores {
                system: store,
                user: MemoryJobStore::new(),
            },
            scheduler,
        )
    }

    #[tokio::test]
    async fn no_trigger_goes_straight_to_ingesting() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("rot");
        let supervisor = supervisor(&root, MemoryJobStore::new(), FakeScheduler::running());

        let report = supervisor
            .start(&RotationRequest::new(dir.path().join("out.txt")))
            .await
            .unwrap();

        assert_eq!(report.states, vec![SinkState::Starting, SinkState::Ingesting]);
        assert!(report.policy.is_none());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn full_startup_installs_config_and_job() {
        // Given
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("rot");
        let store = MemoryJobStore::new();
        let supervisor = supervisor(&root, store.clone(), FakeScheduler::running());
        let target = dir.path().join("out.log");
        let request = RotationRequest::new(&target)
            .rotate_at("0 0 * * *")
            .rotate_count(10)
            .date_format("-%Y-%m-%d");

        // When
        let report = supervisor.start(&request).await.unwrap();

        // Then
        assert_eq!(
            report.states,
            vec![
                SinkState::Starting,
                SinkState::ValidatingSchedule,
                SinkState::CompilingPolicy,
                SinkState::RegisteringJob,
                SinkState::Ingesting,
            ]
        );
        assert!(report.warnings.is_empty());
        let config_path = report.config_path.clone().unwrap();
        assert_eq!(config_path, root.join("porla-out.log"));
        let contents = std::fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("rotate 10"));
        assert!(contents.contains("dateformat -%Y-%m-%d"));
        assert!(contents.contains("extension .log"));

        let table = store.contents().await;
        assert!(table.contains("0 0 * * * "));
        assert!(table.contains(&config_path.display().to_string()));
        assert_eq!(report.registration, Some(Registration::Appended));
        assert_eq!(report.root_scope, Some(RootScope::System));
    }

    #[tokio::test]
    async fn user_root_fallback_registers_in_user_table() {
        // Given: 시스템 루트는 일반 파일 아래라 쓸 수 없음
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let user_root = dir.path().join("home").join("logrotate.d");
        let system = MemoryJobStore::new();
        let user = MemoryJobStore::new();
        let supervisor = Supervisor::new(
            SupervisorSettings::with_roots(vec![blocker.join("logrotate.d"), user_root.clone()]),
            JobStores {
                system: system.clone(),
                user: user.clone(),
            },
            FakeScheduler::running(),
        );

        // When
        let report = supervisor
            .start(&RotationRequest::new(dir.path().join("app.log")).rotate_interval("daily"))
            .await
            .unwrap();

        // Then: 설정은 사용자 루트에, 작업은 사용자 테이블에 등록됨
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.root_scope, Some(RootScope::User));
        assert_eq!(report.registration, Some(Registration::Appended));
        let config_path = report.config_path.clone().unwrap();
        assert_eq!(config_path, user_root.join("porla-app.log"));
        assert!(user.contents().await.contains(&config_path.display().to_string()));
        assert_eq!(user.write_count().await, 1);
        assert_eq!(system.write_count().await, 0);
    }

    #[tokio::test]
    async fn validation_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("rot");
        let store = MemoryJobStore::new();
        let supervisor = supervisor(&root, store.clone(), FakeScheduler::running());

        let err = supervisor
            .start(&RotationRequest::new(dir.path().join("out.log")).rotate_at("bad"))
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(!root.exists());
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn unavailable_scheduler_is_warning_and_job_still_recorded() {
        let dir = TempDir::new().unwrap();
        let store = MemoryJobStore::new();
        let supervisor = supervisor(dir.path(), store.clone(), FakeScheduler::unavailable());

        let report = supervisor
            .start(&RotationRequest::new(dir.path().join("app.log")).rotate_interval("daily"))
            .await
            .unwrap();

        assert_eq!(report.state(), SinkState::Ingesting);
        assert!(report.warnings.iter().any(|w| w.kind == "scheduler_unavailable"));
        let warning = &report.warnings[0].message;
        assert!(warning.contains("porla-app.log"));
        assert_eq!(store.write_count().await, 1);
    }

    #[tokio::test]
    async fn unwritable_roots_skip_registration() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = MemoryJobStore::new();
        let supervisor = supervisor(&blocker.join("rot"), store.clone(), FakeScheduler::running());

        let report = supervisor
            .start(&RotationRequest::new(dir.path().join("app.log")).rotate_interval("hourly"))
            .await
            .unwrap();

        assert_eq!(report.state(), SinkState::Ingesting);
        assert!(!report.states.contains(&SinkState::RegisteringJob));
        assert_eq!(report.warnings[0].kind, "permission_denied");
        assert!(report.config_path.is_none());
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn registration_failure_is_warning() {
        let dir = TempDir::new().unwrap();
        let store = MemoryJobStore::new();
        store.set_fail_writes(true).await;
        let supervisor = supervisor(dir.path(), store, FakeScheduler::running());

        let report = supervisor
            .start(&RotationRequest::new(dir.path().join("app.log")).rotate_interval("weekly"))
            .await
            .unwrap();

        assert_eq!(report.state(), SinkState::Ingesting);
        assert!(report.registration.is_none());
        assert_eq!(report.warnings[0].kind, "job_registration");
        // 설정 파일은 남아 있어 수동 등록 가능
        assert!(dir.path().join("porla-app.log").exists());
    }

    #[tokio::test]
    async fn orphan_options_are_warned_and_ignored() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), MemoryJobStore::new(), FakeScheduler::running());

        let report = supervisor
            .start(&RotationRequest::new(dir.path().join("a.log")).rotate_count(3))
            .await
            .unwrap();

        assert_eq!(report.state(), SinkState::Ingesting);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, ORPHAN_OPTIONS_KIND);
    }

    #[tokio::test]
    async fn relative_target_is_absolutized() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), MemoryJobStore::new(), FakeScheduler::running());

        let report = supervisor
            .start(&RotationRequest::new("logs/rel.log").rotate_interval("daily"))
            .await
            .unwrap();

        assert!(report.target.is_absolute());
        assert!(report.policy.unwrap().target_path().is_absolute());
    }

    #[test]
    fn preview_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("rot");
        let store = MemoryJobStore::new();
        let supervisor = supervisor(&root, store, FakeScheduler::running());

        let preview = supervisor
            .preview(&RotationRequest::new("/x/out.log").rotate_interval("daily"))
            .unwrap();

        assert_eq!(preview.config_path, Some(root.join("porla-out.log")));
        let line = preview.job_line.unwrap();
        assert!(line.starts_with("0 0 * * * /usr/sbin/logrotate -f "));
        assert!(preview.document.unwrap().contents().contains("copytruncate"));
        assert!(!root.exists());
    }

    #[test]
    fn preview_propagates_validation_errors() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), MemoryJobStore::new(), FakeScheduler::running());
        let err = supervisor
            .preview(&RotationRequest::new("/x/out.log").rotate_interval("Daily"))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidSchedule { .. }));
    }

    #[test]
    fn settings_from_config() {
        let config = PorlaConfig::default();
        let settings = SupervisorSettings::from_config(&config);
        assert_eq!(settings.archiver, "/usr/sbin/logrotate");
        assert_eq!(settings.defaults.retention_count, 7);
        assert_eq!(
            settings.resolver.candidates()[0],
            PathBuf::from("/etc/logrotate.d")
        );
    }
}
