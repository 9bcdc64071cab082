//! 로테이션 트리거 검증
//!
//! 사용자 입력(신뢰할 수 없는 문자열)을 검증하여 타입이 있는 값으로 변환합니다.
//!
//! - [`CronExpression`]: 공백으로 구분된 정확히 5개 필드
//! - [`NamedInterval`]: `hourly|daily|weekly|monthly` (대소문자 구분)
//! - [`validate_date_format`]: `%` 지시자가 최소 하나 포함되고 공백/제어 문자가 없는
//!   strftime 템플릿
//!
//! 필드 내용(`*`, 숫자, 스텝 문법)의 정확성은 스케줄러에 위임합니다.
//! 이 모듈은 부수 효과가 없습니다.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::RecordError;

/// 5개 필드 cron 표현식
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronExpression {
    minute: String,
    hour: String,
    day_of_month: String,
    month: String,
    weekday: String,
}

impl CronExpression {
    /// 원문 문자열을 파싱합니다.
    ///
    /// 공백으로 분리한 결과가 정확히 5개가 아니면
    /// [`RecordError::InvalidSchedule`]을 반환합니다.
    pub fn parse(raw: &str) -> Result<Self, RecordError> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        match fields.as_slice() {
            [minute, hour, day_of_month, month, weekday] => Ok(Self {
                minute: (*minute).to_owned(),
                hour: (*hour).to_owned(),
                day_of_month: (*day_of_month).to_owned(),
                month: (*month).to_owned(),
                weekday: (*weekday).to_owned(),
            }),
            _ => Err(RecordError::cron_field_count(raw, fields.len())),
        }
    }

    pub fn minute(&self) -> &str {
        &self.minute
    }

    pub fn hour(&self) -> &str {
        &self.hour
    }

    pub fn day_of_month(&self) -> &str {
        &self.day_of_month
    }

    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn weekday(&self) -> &str {
        &self.weekday
    }
}

impl FromStr for CronExpression {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    /// 필드를 단일 공백으로 정규화하여 출력합니다.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.weekday
        )
    }
}

/// 이름 있는 로테이션 주기
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedInterval {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl NamedInterval {
    /// 허용되는 이름 목록
    pub const NAMES: [&'static str; 4] = ["hourly", "daily", "weekly", "monthly"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// 고정된 cron 표현식으로 변환합니다.
    pub fn cron_expression(&self) -> CronExpression {
        let fields = match self {
            Self::Hourly => ["0", "*", "*", "*", "*"],
            Self::Daily => ["0", "0", "*", "*", "*"],
            Self::Weekly => ["0", "0", "*", "*", "0"],
            Self::Monthly => ["0", "0", "1", "*", "*"],
        };
        let [minute, hour, day_of_month, month, weekday] = fields.map(str::to_owned);
        CronExpression {
            minute,
            hour,
            day_of_month,
            month,
            weekday,
        }
    }
}

impl FromStr for NamedInterval {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(RecordError::unknown_interval(other, &Self::NAMES)),
        }
    }
}

impl fmt::Display for NamedInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 로테이션 트리거 -- cron 표현식 또는 이름 있는 주기 중 정확히 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Trigger {
    Cron(CronExpression),
    Named(NamedInterval),
}

impl Trigger {
    /// 스케줄러에 등록할 실제 cron 표현식
    pub fn cron_expression(&self) -> CronExpression {
        match self {
            Self::Cron(expr) => expr.clone(),
            Self::Named(interval) => interval.cron_expression(),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(expr) => write!(f, "{expr}"),
            Self::Named(interval) => write!(f, "{interval}"),
        }
    }
}

/// 날짜 형식 템플릿을 검증합니다.
///
/// `%` 문자가 하나도 없거나 공백/제어 문자가 있으면
/// [`RecordError::InvalidDateFormat`]을 반환합니다. 템플릿은 logrotate 설정의
/// `dateformat` 한 줄에 그대로 들어가므로 줄바꿈이나 공백이 섞이면 안 됩니다.
pub fn validate_date_format(raw: &str) -> Result<&str, RecordError> {
    if raw.contains('%') && !raw.chars().any(is_forbidden_in_directive) {
        Ok(raw)
    } else {
        Err(RecordError::InvalidDateFormat {
            input: raw.to_owned(),
        })
    }
}

fn is_forbidden_in_directive(c: char) -> bool {
    c.is_whitespace() || c.is_control()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_five_field_expression() {
        let expr = CronExpression::parse("*/5 2 1 * 0").unwrap();
        assert_eq!(expr.minute(), "*/5");
        assert_eq!(expr.hour(), "2");
        assert_eq!(expr.day_of_month(), "1");
        assert_eq!(expr.month(), "*");
        assert_eq!(expr.weekday(), "0");
    }

    #[test]
    fn normalizes_whitespace_on_display() {
        let expr = CronExpression::parse("  0\t0  *   * *\n").unwrap();
        assert_eq!(expr.to_string(), "0 0 * * *");
    }

    #[test]
    fn rejects_wrong_field_counts() {
        for raw in ["", "bad", "0 0 * *", "0 0 * * * *", "@daily"] {
            let err = CronExpression::parse(raw).unwrap_err();
            assert!(
                matches!(err, RecordError::InvalidSchedule { .. }),
                "'{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn accepts_field_content_without_checking_it() {
        // 필드 내용 검증은 스케줄러 몫
        assert!(CronExpression::parse("x y z w v").is_ok());
    }

    #[test]
    fn named_intervals_map_to_fixed_expressions() {
        let cases = [
            ("hourly", "0 * * * *"),
            ("daily", "0 0 * * *"),
            ("weekly", "0 0 * * 0"),
            ("monthly", "0 0 1 * *"),
        ];
        for (name, expected) in cases {
            let interval: NamedInterval = name.parse().unwrap();
            assert_eq!(interval.as_str(), name);
            assert_eq!(interval.cron_expression().to_string(), expected);
        }
    }

    #[test]
    fn named_interval_is_case_sensitive() {
        let err = "Daily".parse::<NamedInterval>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("hourly|daily|weekly|monthly"));
    }

    #[test]
    fn unknown_named_interval_rejected() {
        assert!("yearly".parse::<NamedInterval>().is_err());
        assert!("".parse::<NamedInterval>().is_err());
    }

    #[test]
    fn trigger_resolves_effective_expression() {
        let named = Trigger::Named(NamedInterval::Weekly);
        assert_eq!(named.cron_expression().to_string(), "0 0 * * 0");
        assert_eq!(named.to_string(), "weekly");

        let cron = Trigger::Cron(CronExpression::parse("15 3 * * *").unwrap());
        assert_eq!(cron.cron_expression().to_string(), "15 3 * * *");
    }

    #[test]
    fn date_format_requires_percent() {
        assert_eq!(validate_date_format("-%Y%m%d").unwrap(), "-%Y%m%d");
        assert!(validate_date_format("%").is_ok());
        assert!(matches!(
            validate_date_format("-YYYYmmdd"),
            Err(RecordError::InvalidDateFormat { .. })
        ));
        assert!(validate_date_format("").is_err());
    }

    #[test]
    fn date_format_with_line_break_or_space_is_rejected() {
        // Given: 설정 블록에 지시자를 끼워 넣으려는 템플릿
        let injected = "-%Y\n    postrotate\n        touch /tmp/x\n    endscript";

        // Then: 줄바꿈, 공백, 탭, 제어 문자는 모두 거부
        for raw in [injected, "-%Y %m", "-%Y\t%m", "-%Y\r", "-%Y\u{0}"] {
            let err = validate_date_format(raw).unwrap_err();
            assert!(matches!(err, RecordError::InvalidDateFormat { .. }));
            assert!(!err.to_string().contains('\n'), "message must stay on one line");
        }
    }

    proptest! {
        #[test]
        fn field_count_other_than_five_is_rejected(
            fields in proptest::collection::vec("[a-z0-9*/,-]{1,4}", 0..10)
        ) {
            prop_assume!(fields.len() != 5);
            let raw = fields.join(" ");
            prop_assert!(CronExpression::parse(&raw).is_err());
        }

        #[test]
        fn any_five_fields_are_accepted(
            fields in proptest::collection::vec("[^\\s]{1,6}", 5)
        ) {
            let raw = fields.join(" ");
            let expr = CronExpression::parse(&raw).unwrap();
            prop_assert_eq!(expr.to_string(), raw);
        }

        #[test]
        fn date_format_decision_follows_percent_and_whitespace(raw in "\\PC{0,16}") {
            let expected = raw.contains('%') && !raw.chars().any(char::is_whitespace);
            prop_assert_eq!(validate_date_format(&raw).is_ok(), expected);
        }
    }
}
