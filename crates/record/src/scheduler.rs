//! 스케줄러 데몬 제어 추상화
//!
//! [`SchedulerHandle`]은 cron 데몬의 생존 확인, 시작, 재적재(reload) 기능을
//! 분리된 능력으로 노출합니다. 재적재는 등록과 별개의 실패 모드를 가지며,
//! 실패해도 경고일 뿐 기록에는 영향이 없습니다.
//!
//! - [`ProcessScheduler`]: `pgrep`/`pkill`과 데몬 실행 파일로 제어
//! - [`FakeScheduler`]: 동작을 지정할 수 있는 테스트 대역

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 스케줄러 제어 실패 사유
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SchedulerFailure(pub String);

/// cron 데몬 제어 능력
pub trait SchedulerHandle: Send + Sync {
    /// 데몬 이름 (로그용)
    fn name(&self) -> &str;

    /// 데몬이 실행 중인지 확인합니다.
    fn is_running(&self) -> impl Future<Output = bool> + Send;

    /// 데몬을 시작합니다.
    fn start(&self) -> impl Future<Output = Result<(), SchedulerFailure>> + Send;

    /// 외부에서 수정된 작업 테이블을 다시 읽도록 데몬을 재시작합니다.
    fn reload(&self) -> impl Future<Output = Result<(), SchedulerFailure>> + Send;
}

/// 프로세스 기반 cron 데몬 제어
#[derive(Debug, Clone)]
pub struct ProcessScheduler {
    daemon: String,
    command_timeout: Duration,
}

impl ProcessScheduler {
    pub fn new(daemon: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            daemon: daemon.into(),
            command_timeout,
        }
    }

    pub fn from_core(config: &porla_core::config::SchedulerConfig) -> Self {
        Self::new(
            &config.daemon,
            Duration::from_millis(config.command_timeout_ms),
        )
    }

    /// 명령을 실행하고 종료 코드를 반환합니다. 타임아웃이면 `Ok(None)`입니다.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Option<i32>, SchedulerFailure> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SchedulerFailure(format!("failed to spawn {program}: {e}")))?;

        match tokio::time::timeout(self.command_timeout, child.wait()).await {
            Ok(Ok(status)) => Ok(Some(status.code().unwrap_or(-1))),
            Ok(Err(e)) => Err(SchedulerFailure(format!("failed to wait for {program}: {e}"))),
            Err(_) => Ok(None),
        }
    }
}

impl SchedulerHandle for ProcessScheduler {
    fn name(&self) -> &str {
        &self.daemon
    }

    async fn is_running(&self) -> bool {
        match self.run("pgrep", &["-x", &self.daemon]).await {
            Ok(Some(0)) => true,
            Ok(_) => false,
            Err(e) => {
                debug!(daemon = %self.daemon, error = %e, "liveness check failed");
                false
            }
        }
    }

    async fn start(&self) -> Result<(), SchedulerFailure> {
        debug!(daemon = %self.daemon, "starting scheduler daemon");
        match self.run(&self.daemon, &[]).await? {
            Some(0) => Ok(()),
            // 포그라운드로 머무는 데몬은 타임아웃까지 살아 있으면 시작된 것으로 봄
            None => Ok(()),
            Some(code) => Err(SchedulerFailure(format!(
                "{} exited with status {code}",
                self.daemon
            ))),
        }
    }

    async fn reload(&self) -> Result<(), SchedulerFailure> {
        // pkill 종료 코드 1은 일치하는 프로세스 없음
        match self.run("pkill", &["-x", &self.daemon]).await? {
            Some(0) | Some(1) => {}
            Some(code) => {
                warn!(daemon = %self.daemon, code, "pkill returned unexpected status");
            }
            None => {
                return Err(SchedulerFailure(format!(
                    "timed out stopping {}",
                    self.daemon
                )));
            }
        }
        self.start().await
    }
}

/// 테스트용 스케줄러 대역
///
/// 복제본은 상태를 공유합니다.
#[derive(Debug, Clone)]
pub struct FakeScheduler {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Debug)]
struct FakeState {
    running: bool,
    /// `start()`가 성공하기 전에 실패할 횟수. `None`이면 항상 실패
    start_failures_remaining: Option<usize>,
    reload_fails: bool,
    start_calls: usize,
    reload_calls: usize,
}

impl FakeScheduler {
    /// 이미 실행 중인 데몬
    pub fn running() -> Self {
        Self::with_state(true, Some(0))
    }

    /// 멈춰 있지만 첫 시작에 성공하는 데몬
    pub fn stopped() -> Self {
        Self::with_state(false, Some(0))
    }

    /// 멈춰 있고 `failures`번 시작에 실패한 뒤 성공하는 데몬
    pub fn starts_after(failures: usize) -> Self {
        Self::with_state(false, Some(failures))
    }

    /// 절대 시작되지 않는 데몬
    pub fn unavailable() -> Self {
        Self::with_state(false, None)
    }

    /// 재적재가 항상 실패하도록 설정합니다.
    pub fn with_failing_reload(self) -> Self {
        if let Ok(mut state) = self.state.try_lock() {
            state.reload_fails = true;
        }
        self
    }

    fn with_state(running: bool, start_failures_remaining: Option<usize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                running,
                start_failures_remaining,
                reload_fails: false,
                start_calls: 0,
                reload_calls: 0,
            })),
        }
    }

    pub async fn start_calls(&self) -> usize {
        self.state.lock().await.start_calls
    }

    pub async fn reload_calls(&self) -> usize {
        self.state.lock().await.reload_calls
    }
}

impl SchedulerHandle for FakeScheduler {
    fn name(&self) -> &str {
        "fake-crond"
    }

    async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    async fn start(&self) -> Result<(), SchedulerFailure> {
        let mut state = self.state.lock().await;
        state.start_calls += 1;
        match state.start_failures_remaining {
            Some(0) => {
                state.running = true;
                Ok(())
            }
            Some(n) => {
                state.start_failures_remaining = Some(n - 1);
                Err(SchedulerFailure("fake start failure".to_owned()))
            }
            None => Err(SchedulerFailure("scheduler binary not found".to_owned())),
        }
    }

    async fn reload(&self) -> Result<(), SchedulerFailure> {
        let mut state = self.state.lock().await;
        state.reload_calls += 1;
        if state.reload_fails {
            state.running = false;
            Err(SchedulerFailure("fake reload failure".to_owned()))
        } else {
            state.running = true;
            Ok(())
        }
    }
}
