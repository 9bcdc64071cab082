//! record 싱크 에러 타입
//!
//! [`RecordError`]는 싱크 시작과 기록 과정의 모든 에러를 표현합니다.
//! 검증 에러([`RecordError::is_validation`])만 치명적이며, 스케줄러/아카이버
//! 연동 에러는 경고로 강등되어 기록을 막지 않습니다.

use std::path::PathBuf;

/// cron 표현식 사용 예시 (에러 메시지에 포함)
const CRON_USAGE: &str = "expected 5 whitespace-separated fields: minute hour day month weekday \
     (e.g. --rotate-at \"0 0 * * *\" for daily at midnight, \
     --rotate-at \"*/15 * * * *\" for every 15 minutes)";

/// 날짜 형식 사용 예시 (에러 메시지에 포함)
const DATE_FORMAT_USAGE: &str = "must contain at least one strftime directive \
     and no whitespace or control characters \
     (e.g. --date-format \"-%Y%m%d\" or --date-format \"-%Y-%m-%d-%H\")";

/// record 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// cron 표현식 또는 이름 있는 주기가 잘못됨 (치명적)
    #[error("invalid rotation schedule '{input}': {reason}")]
    InvalidSchedule {
        /// 사용자가 입력한 원문
        input: String,
        /// 기대 형식과 예시를 포함한 사유
        reason: String,
    },

    /// 날짜 형식에 `%` 지시자가 없거나 공백/제어 문자가 있음 (치명적)
    #[error("invalid date format {input:?}: {}", DATE_FORMAT_USAGE)]
    InvalidDateFormat {
        /// 사용자가 입력한 원문
        input: String,
    },

    /// 보관 개수가 0 (치명적)
    #[error("invalid rotation count {count}: must be a positive integer (e.g. --rotate-count 7)")]
    InvalidRetentionCount {
        /// 입력된 개수
        count: u32,
    },

    /// 로테이션 설정에 넣을 수 없는 대상 경로 (치명적)
    #[error("invalid rotation target {path:?}: {reason}")]
    InvalidTargetPath {
        /// 대상 경로
        path: PathBuf,
        /// 거부 사유
        reason: &'static str,
    },

    /// 스케줄러 데몬을 시작/재시작할 수 없음
    #[error(
        "scheduler unavailable: {reason}; rotate manually with: {archiver} -f {}",
        .config_path.display()
    )]
    SchedulerUnavailable {
        /// 실패 사유
        reason: String,
        /// 수동 로테이션에 사용할 아카이버 경로
        archiver: String,
        /// 생성된 로테이션 설정 경로
        config_path: PathBuf,
    },

    /// 설정 루트 후보가 모두 쓰기 불가
    #[error("no writable rotation config directory (tried: {})", display_paths(.tried))]
    PermissionDenied {
        /// 시도한 디렉토리 목록
        tried: Vec<PathBuf>,
    },

    /// 작업 테이블 읽기/쓰기 실패
    #[error("job registration failed for {}: {reason}", .table.display())]
    JobRegistration {
        /// 작업 테이블 경로 또는 식별자
        table: PathBuf,
        /// 실패 사유
        reason: String,
    },

    /// 로테이션 설정 파일 쓰기 실패
    #[error("failed to write rotation config {}: {source}", .path.display())]
    PolicyWrite {
        /// 설정 파일 경로
        path: PathBuf,
        /// 원인 I/O 에러
        source: std::io::Error,
    },

    /// 대상 파일 기록 실패
    #[error("ingest error on {}: {source}", .path.display())]
    Ingest {
        /// 대상 파일 경로
        path: PathBuf,
        /// 원인 I/O 에러
        source: std::io::Error,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordError {
    /// 잘못된 cron 표현식 에러를 생성합니다.
    pub fn cron_field_count(input: &str, found: usize) -> Self {
        Self::InvalidSchedule {
            input: input.to_owned(),
            reason: format!("found {found} field(s), {CRON_USAGE}"),
        }
    }

    /// 알 수 없는 이름 있는 주기 에러를 생성합니다.
    pub fn unknown_interval(input: &str, valid: &[&str]) -> Self {
        Self::InvalidSchedule {
            input: input.to_owned(),
            reason: format!(
                "unknown rotation interval, expected one of: {} (e.g. --rotate-interval daily)",
                valid.join("|")
            ),
        }
    }

    /// 싱크 시작을 중단해야 하는 검증 에러인지 확인합니다.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchedule { .. }
                | Self::InvalidDateFormat { .. }
                | Self::InvalidRetentionCount { .. }
                | Self::InvalidTargetPath { .. }
        )
    }

    /// 경고 메트릭 레이블에 사용할 종류 이름을 반환합니다.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSchedule { .. } => "invalid_schedule",
            Self::InvalidDateFormat { .. } => "invalid_date_format",
            Self::InvalidRetentionCount { .. } => "invalid_retention_count",
            Self::InvalidTargetPath { .. } => "invalid_target_path",
            Self::SchedulerUnavailable { .. } => "scheduler_unavailable",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::JobRegistration { .. } => "job_registration",
            Self::PolicyWrite { .. } => "policy_write",
            Self::Ingest { .. } => "ingest",
            Self::Io(_) => "io",
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
