//! 작업 등록기 -- 스케줄러 확인과 멱등 작업 등록
//!
//! [`JobRegistrar`]는 [`SchedulerHandle`]을 쥐고, 등록할 [`JobStore`]는 호출마다
//! 받습니다. 설정 루트가 시스템인지 사용자인지에 따라 테이블이 달라지기 때문입니다.
//!
//! 1. [`JobRegistrar::ensure_scheduler`]: 데몬이 없으면 시작하고, 실패하면
//!    `retry_delay` 후 한 번 더 시도합니다. 끝내 실패하면
//!    [`RecordError::SchedulerUnavailable`]을 반환합니다 (호출자가 경고로 처리).
//! 2. [`JobRegistrar::register`]: 테이블을 읽어 같은 명령이 이미 있으면 쓰지 않고,
//!    없으면 한 줄을 추가해 원자적으로 교체한 뒤, 테이블이 요구하면
//!    ([`JobStore::needs_reload`]) 데몬을 재적재합니다.
//!
//! 중복 판별은 명령 문자열 일치만으로 합니다. 같은 설정 경로에 대해
//! 스케줄만 바뀐 경우 기존 항목이 남고 새 항목은 추가되지 않습니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use porla_core::metrics as m;

use crate::error::RecordError;
use crate::job::{JobStore, ScheduledJob, append_entry, table_contains};
use crate::schedule::CronExpression;
use crate::scheduler::SchedulerHandle;

/// 작업 등록 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    /// 같은 명령의 항목이 이미 있어 쓰지 않음
    Unchanged,
    /// 새 항목을 추가함
    Appended,
}

/// 등록 결과와 재적재 경고
#[derive(Debug)]
pub struct RegistrationOutcome {
    pub registration: Registration,
    /// 추가 후 데몬 재적재가 실패한 경우의 경고
    pub reload_warning: Option<RecordError>,
}

/// 스케줄러 작업 등록기
pub struct JobRegistrar<H> {
    scheduler: H,
    archiver: String,
    retry_delay: Duration,
    reload_after_register: bool,
}

impl<H: SchedulerHandle> JobRegistrar<H> {
    pub fn new(scheduler: H, archiver: impl Into<String>) -> Self {
        Self {
            scheduler,
            archiver: archiver.into(),
            retry_delay: Duration::from_millis(500),
            reload_after_register: true,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_reload_after_register(mut self, reload: bool) -> Self {
        self.reload_after_register = reload;
        self
    }

    /// 정책 설정 경로에 대한 로테이션 작업을 만듭니다.
    pub fn job_for(&self, schedule: &CronExpression, config_path: &Path) -> ScheduledJob {
        ScheduledJob::rotation(schedule, &self.archiver, config_path)
    }

    /// 스케줄러 데몬이 실행 중이도록 보장합니다.
    ///
    /// # Errors
    ///
    /// 재시도 후에도 데몬이 올라오지 않으면 [`RecordError::SchedulerUnavailable`].
    /// 메시지에 수동 로테이션 명령이 포함됩니다.
    pub async fn ensure_scheduler(&self, config_path: &Path) -> Result<(), RecordError> {
        if self.scheduler.is_running().await {
            debug!(daemon = self.scheduler.name(), "scheduler already running");
            return Ok(());
        }

        let mut last_reason = String::from("daemon not running after start");
        for attempt in 0..2u32 {
            if attempt > 0 {
                warn!(
                    daemon = self.scheduler.name(),
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "retrying scheduler start"
                );
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.scheduler.start().await {
                Ok(()) if self.scheduler.is_running().await => {
                    info!(daemon = self.scheduler.name(), "scheduler started");
                    return Ok(());
                }
                Ok(()) => last_reason = String::from("daemon not running after start"),
                Err(e) => last_reason = e.to_string(),
            }
        }

        Err(self.unavailable(last_reason, config_path))
    }

    /// `store`에 작업을 멱등적으로 등록합니다.
    ///
    /// # Errors
    ///
    /// 테이블 읽기/쓰기 실패 시 [`RecordError::JobRegistration`].
    /// 재적재 실패는 에러가 아니라 [`RegistrationOutcome::reload_warning`]으로 보고됩니다.
    pub async fn register<S: JobStore>(
        &self,
        store: &S,
        job: &ScheduledJob,
        config_path: &Path,
    ) -> Result<RegistrationOutcome, RecordError> {
        let table = store.list().await?;
        if table_contains(&table, job.command()) {
            debug!(command = job.command(), "job already registered");
            return Ok(RegistrationOutcome {
                registration: Registration::Unchanged,
                reload_warning: None,
            });
        }

        let updated = append_entry(&table, job);
        store.atomic_replace(updated).await?;
        metrics::counter!(m::RECORD_JOBS_REGISTERED_TOTAL).increment(1);
        info!(
            table = %store.location().display(),
            entry = %job.table_line(),
            "rotation job registered"
        );

        let reload_warning = if self.reload_after_register && store.needs_reload() {
            self.reload(config_path).await.err()
        } else {
            None
        };

        Ok(RegistrationOutcome {
            registration: Registration::Appended,
            reload_warning,
        })
    }

    /// 데몬을 재적재합니다. 한 번 실패하면 `retry_delay` 후 재시도합니다.
    async fn reload(&self, config_path: &Path) -> Result<(), RecordError> {
        let reason = match self.scheduler.reload().await {
            Ok(()) => return Ok(()),
            Err(e) => e.to_string(),
        };
        warn!(daemon = self.scheduler.name(), error = %reason, "scheduler reload failed, retrying");
        tokio::time::sleep(self.retry_delay).await;
        self.scheduler
            .reload()
            .await
            .map_err(|e| self.unavailable(format!("reload failed: {e}"), config_path))
    }

    fn unavailable(&self, reason: String, config_path: &Path) -> RecordError {
        RecordError::SchedulerUnavailable {
            reason: format!("{} ({})", reason, self.scheduler.name()),
            archiver: self.archiver.clone(),
            config_path: PathBuf::from(config_path),
        }
    }
}
