//! 설정 관리 -- porla.toml 파싱 및 런타임 설정
//!
//! [`PorlaConfig`]는 `record` 싱크의 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PORLA_SCHEDULER_DAEMON=crond` 형식)
//! 3. 설정 파일 (`porla.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), porla_core::error::PorlaError> {
//! use porla_core::config::PorlaConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = PorlaConfig::load("porla.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PorlaConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PorlaError};

/// 설정 파일 기본 경로
pub const DEFAULT_CONFIG_PATH: &str = "/etc/porla/porla.toml";

/// Porla 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PorlaConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로테이션 정책 기본값 및 설정 디렉토리
    #[serde(default)]
    pub rotation: RotationConfig,
    /// 외부 아카이버 (logrotate) 설정
    #[serde(default)]
    pub archiver: ArchiverConfig,
    /// 외부 스케줄러 (cron) 설정
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 입력 기록 설정
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl PorlaConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PorlaError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 있으면 로드하고, 없으면 기본값에 환경변수 오버라이드만 적용합니다.
    ///
    /// 파일이 존재하지만 파싱에 실패하면 에러를 반환합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, PorlaError> {
        match Self::load(path.as_ref()).await {
            Err(PorlaError::Config(ConfigError::FileNotFound { .. })) => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PorlaError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PorlaError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PorlaError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PorlaError> {
        toml::from_str(toml_str).map_err(|e| {
            PorlaError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PORLA_{SECTION}_{FIELD}`
    /// 예: `PORLA_SCHEDULER_JOB_TABLE=/var/spool/cron/crontabs/root`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PORLA_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PORLA_GENERAL_LOG_FORMAT");

        // Rotation
        override_string(
            &mut self.rotation.system_config_dir,
            "PORLA_ROTATION_SYSTEM_CONFIG_DIR",
        );
        override_string(
            &mut self.rotation.user_config_dir,
            "PORLA_ROTATION_USER_CONFIG_DIR",
        );
        override_u32(
            &mut self.rotation.retention_count,
            "PORLA_ROTATION_RETENTION_COUNT",
        );
        override_string(&mut self.rotation.date_format, "PORLA_ROTATION_DATE_FORMAT");
        override_string(&mut self.rotation.archive_dir, "PORLA_ROTATION_ARCHIVE_DIR");
        override_string(
            &mut self.rotation.archive_dir_mode,
            "PORLA_ROTATION_ARCHIVE_DIR_MODE",
        );
        override_string(
            &mut self.rotation.archive_owner,
            "PORLA_ROTATION_ARCHIVE_OWNER",
        );
        override_string(
            &mut self.rotation.archive_group,
            "PORLA_ROTATION_ARCHIVE_GROUP",
        );

        // Archiver
        override_string(&mut self.archiver.binary, "PORLA_ARCHIVER_BINARY");

        // Scheduler
        override_string(&mut self.scheduler.daemon, "PORLA_SCHEDULER_DAEMON");
        override_string(&mut self.scheduler.job_table, "PORLA_SCHEDULER_JOB_TABLE");
        override_string(&mut self.scheduler.crontab, "PORLA_SCHEDULER_CRONTAB");
        override_u64(
            &mut self.scheduler.command_timeout_ms,
            "PORLA_SCHEDULER_COMMAND_TIMEOUT_MS",
        );
        override_u64(
            &mut self.scheduler.retry_delay_ms,
            "PORLA_SCHEDULER_RETRY_DELAY_MS",
        );
        override_bool(
            &mut self.scheduler.reload_after_register,
            "PORLA_SCHEDULER_RELOAD_AFTER_REGISTER",
        );

        // Ingest
        override_u64(
            &mut self.ingest.flush_interval_ms,
            "PORLA_INGEST_FLUSH_INTERVAL_MS",
        );
        override_bool(&mut self.ingest.sync_on_exit, "PORLA_INGEST_SYNC_ON_EXIT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PorlaError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.rotation.system_config_dir.is_empty() {
            return Err(invalid(
                "rotation.system_config_dir",
                "must not be empty".to_owned(),
            ));
        }

        if self.rotation.retention_count == 0 {
            return Err(invalid(
                "rotation.retention_count",
                "must be a positive integer".to_owned(),
            ));
        }

        // 기본 날짜 형식도 CLI 입력과 같은 규칙을 따름
        let date_format = &self.rotation.date_format;
        if !date_format.contains('%')
            || date_format
                .chars()
                .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(invalid(
                "rotation.date_format",
                "must contain at least one strftime directive and no whitespace (e.g. -%Y%m%d)"
                    .to_owned(),
            ));
        }

        if self.rotation.archive_dir.is_empty() || self.rotation.archive_dir.contains('/') {
            return Err(invalid(
                "rotation.archive_dir",
                "must be a single non-empty directory name".to_owned(),
            ));
        }

        let mode = &self.rotation.archive_dir_mode;
        if mode.is_empty() || mode.len() > 4 || !mode.chars().all(|c| ('0'..='7').contains(&c)) {
            return Err(invalid(
                "rotation.archive_dir_mode",
                "must be an octal file mode such as 0755".to_owned(),
            ));
        }

        if self.archiver.binary.is_empty() {
            return Err(invalid("archiver.binary", "must not be empty".to_owned()));
        }

        if self.scheduler.daemon.is_empty() {
            return Err(invalid("scheduler.daemon", "must not be empty".to_owned()));
        }

        if self.scheduler.job_table.is_empty() {
            return Err(invalid(
                "scheduler.job_table",
                "must not be empty".to_owned(),
            ));
        }

        if self.scheduler.crontab.is_empty() {
            return Err(invalid("scheduler.crontab", "must not be empty".to_owned()));
        }

        if self.scheduler.command_timeout_ms == 0 {
            return Err(invalid(
                "scheduler.command_timeout_ms",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.ingest.flush_interval_ms == 0 {
            return Err(invalid(
                "ingest.flush_interval_ms",
                "must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> PorlaError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 로테이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// 시스템 전역 logrotate 설정 디렉토리 (우선 시도)
    pub system_config_dir: String,
    /// 사용자별 설정 디렉토리. 비어 있으면 XDG 규칙으로 결정
    pub user_config_dir: String,
    /// 보관할 아카이브 개수 기본값
    pub retention_count: u32,
    /// 아카이브 날짜 접미사 기본값 (strftime)
    pub date_format: String,
    /// 아카이브 디렉토리 이름 (대상 파일의 형제 디렉토리)
    pub archive_dir: String,
    /// 아카이브 디렉토리 생성 권한 (8진수)
    pub archive_dir_mode: String,
    /// 아카이브 디렉토리 소유자. 비어 있으면 실행 사용자
    pub archive_owner: String,
    /// 아카이브 디렉토리 그룹. 비어 있으면 실행 사용자의 그룹
    pub archive_group: String,
}

impl RotationConfig {
    /// 사용자별 설정 디렉토리를 결정합니다.
    ///
    /// `user_config_dir` > `$XDG_CONFIG_HOME/porla/logrotate.d` >
    /// `$HOME/.config/porla/logrotate.d` 순서로 시도합니다.
    pub fn resolved_user_config_dir(&self) -> Option<PathBuf> {
        if !self.user_config_dir.is_empty() {
            return Some(PathBuf::from(&self.user_config_dir));
        }
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(xdg).join("porla").join("logrotate.d"));
        }
        std::env::var_os("HOME")
            .filter(|v| !v.is_empty())
            .map(|home| {
                PathBuf::from(home)
                    .join(".config")
                    .join("porla")
                    .join("logrotate.d")
            })
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            system_config_dir: "/etc/logrotate.d".to_owned(),
            user_config_dir: String::new(),
            retention_count: 7,
            date_format: "-%Y%m%d".to_owned(),
            archive_dir: "historic".to_owned(),
            archive_dir_mode: "0755".to_owned(),
            archive_owner: String::new(),
            archive_group: String::new(),
        }
    }
}

/// 아카이버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    /// logrotate 실행 파일 경로
    pub binary: String,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            binary: "/usr/sbin/logrotate".to_owned(),
        }
    }
}

/// 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// cron 데몬 프로세스 이름
    pub daemon: String,
    /// cron 작업 테이블 파일 경로 (시스템 설정 루트 사용 시)
    pub job_table: String,
    /// 사용자 설정 루트로 물러났을 때 사용자 crontab을 다루는 명령
    pub crontab: String,
    /// 데몬 제어 명령 타임아웃 (밀리초)
    pub command_timeout_ms: u64,
    /// 데몬 시작 재시도 전 대기 시간 (밀리초)
    pub retry_delay_ms: u64,
    /// 작업 추가 후 데몬 재시작 여부
    pub reload_after_register: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daemon: "crond".to_owned(),
            job_table: "/etc/crontabs/root".to_owned(),
            crontab: "crontab".to_owned(),
            command_timeout_ms: 5_000,
            retry_delay_ms: 500,
            reload_after_register: true,
        }
    }
}

/// 입력 기록 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 버퍼 플러시 주기 (밀리초)
    pub flush_interval_ms: u64,
    /// 종료 시 fsync 수행 여부
    pub sync_on_exit: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1_000,
            sync_on_exit: true,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
