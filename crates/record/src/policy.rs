//! 로테이션 정책 -- 검증된 불변 값 객체
//!
//! [`RotationRequest`]는 CLI에서 받은 원시 입력이고, [`RotationPolicy::from_request`]가
//! 이를 검증하여 [`RotationPolicy`]를 만듭니다. 검증은 전부 아니면 전무이며,
//! 실패하면 어떤 설정도 적용되지 않습니다.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::RecordError;
use crate::schedule::{CronExpression, NamedInterval, Trigger, validate_date_format};

/// 정책 기본값 (porla.toml `[rotation]` 섹션에서 유래)
#[derive(Debug, Clone)]
pub struct PolicyDefaults {
    /// 보관 개수
    pub retention_count: u32,
    /// 날짜 접미사 템플릿
    pub date_format: String,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            retention_count: 7,
            date_format: "-%Y%m%d".to_owned(),
        }
    }
}

impl PolicyDefaults {
    pub fn from_core(config: &porla_core::config::RotationConfig) -> Self {
        Self {
            retention_count: config.retention_count,
            date_format: config.date_format.clone(),
        }
    }
}

/// `record` 호출에서 받은 원시 로테이션 입력
#[derive(Debug, Clone, Default)]
pub struct RotationRequest {
    /// 기록 대상 파일
    pub target: PathBuf,
    /// `--rotate-at` cron 표현식
    pub rotate_at: Option<String>,
    /// `--rotate-interval` 이름 있는 주기
    pub rotate_interval: Option<String>,
    /// `--rotate-count`
    pub rotate_count: Option<u32>,
    /// `--date-format`
    pub date_format: Option<String>,
}

impl RotationRequest {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn rotate_at(mut self, expr: impl Into<String>) -> Self {
        self.rotate_at = Some(expr.into());
        self
    }

    pub fn rotate_interval(mut self, name: impl Into<String>) -> Self {
        self.rotate_interval = Some(name.into());
        self
    }

    pub fn rotate_count(mut self, count: u32) -> Self {
        self.rotate_count = Some(count);
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// 로테이션 트리거가 지정되었는지 확인합니다.
    pub fn has_trigger(&self) -> bool {
        self.rotate_at.is_some() || self.rotate_interval.is_some()
    }

    /// 트리거 없이 지정된 로테이션 옵션이 있는지 확인합니다.
    pub fn has_orphan_options(&self) -> bool {
        !self.has_trigger() && (self.rotate_count.is_some() || self.date_format.is_some())
    }
}

/// 검증된 로테이션 정책
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationPolicy {
    target_path: PathBuf,
    trigger: Trigger,
    retention_count: u32,
    date_format: String,
}

impl RotationPolicy {
    /// 원시 입력을 검증하여 정책을 만듭니다.
    ///
    /// 트리거가 없으면 `Ok(None)`을 반환합니다 (로테이션은 opt-in).
    /// cron 표현식과 이름 있는 주기가 모두 있으면 cron 표현식이 우선합니다.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidSchedule`]: 필드 수가 5가 아니거나 알 수 없는 주기
    /// - [`RecordError::InvalidDateFormat`]: `%` 지시자 없음, 공백/제어 문자 포함
    /// - [`RecordError::InvalidRetentionCount`]: 보관 개수 0
    /// - [`RecordError::InvalidTargetPath`]: 설정 블록에 넣을 수 없는 대상 경로
    pub fn from_request(
        request: &RotationRequest,
        defaults: &PolicyDefaults,
    ) -> Result<Option<Self>, RecordError> {
        let trigger = match (&request.rotate_at, &request.rotate_interval) {
            (Some(expr), _) => Trigger::Cron(CronExpression::parse(expr)?),
            (None, Some(name)) => Trigger::Named(name.parse::<NamedInterval>()?),
            (None, None) => return Ok(None),
        };

        let date_format = validate_date_format(
            request
                .date_format
                .as_deref()
                .unwrap_or(&defaults.date_format),
        )?
        .to_owned();

        let retention_count = request.rotate_count.unwrap_or(defaults.retention_count);
        if retention_count == 0 {
            return Err(RecordError::InvalidRetentionCount {
                count: retention_count,
            });
        }

        Self::new(request.target.clone(), trigger, retention_count, date_format).map(Some)
    }

    /// 이미 검증된 구성 요소로 정책을 만듭니다.
    ///
    /// 대상 경로는 설정 블록 헤더에 그대로 들어가므로 블록을 깨뜨릴 수 있는
    /// 문자가 있으면 [`RecordError::InvalidTargetPath`]를 반환합니다.
    pub fn new(
        target_path: PathBuf,
        trigger: Trigger,
        retention_count: u32,
        date_format: String,
    ) -> Result<Self, RecordError> {
        validate_target_path(&target_path)?;
        if retention_count == 0 {
            return Err(RecordError::InvalidRetentionCount {
                count: retention_count,
            });
        }
        validate_date_format(&date_format)?;
        Ok(Self {
            target_path,
            trigger,
            retention_count,
            date_format,
        })
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn retention_count(&self) -> u32 {
        self.retention_count
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// 스케줄러에 등록할 cron 표현식 (이름 있는 주기는 변환됨)
    pub fn cron_expression(&self) -> CronExpression {
        self.trigger.cron_expression()
    }

    /// 대상 파일의 확장자 (`.log` 형태). 확장자가 없으면 `None`.
    pub fn archive_extension(&self) -> Option<String> {
        archive_extension(&self.target_path)
    }

}

/// logrotate 설정 헤더에 넣을 수 있는 대상 경로인지 확인합니다.
///
/// 비어 있거나, UTF-8이 아니거나, 제어 문자 또는 `{` `}` `"`가 있으면 거부합니다.
fn validate_target_path(path: &Path) -> Result<(), RecordError> {
    let invalid = |reason: &'static str| RecordError::InvalidTargetPath {
        path: path.to_path_buf(),
        reason,
    };
    let Some(raw) = path.to_str() else {
        return Err(invalid("path must be valid UTF-8"));
    };
    if raw.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if raw.chars().any(char::is_control) {
        return Err(invalid("path must not contain control characters"));
    }
    if raw.contains(['{', '}', '"']) {
        return Err(invalid("path must not contain '{', '}' or '\"'"));
    }
    Ok(())
}

/// 경로의 마지막 `.ext` 구성요소를 점을 포함해 반환합니다.
///
/// 점으로 시작하는 파일(`.bashrc`)이나 점으로 끝나는 파일(`out.`)은
/// 확장자가 없는 것으로 봅니다.
pub fn archive_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
}
