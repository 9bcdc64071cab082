//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! `record` 바이너리는 익스포터를 설치하지 않으므로, 레코더를 설치하는
//! 임베더가 없으면 `metrics::counter!()` 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `porla_record_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 경고 종류 레이블 키 (scheduler_unavailable, permission_denied, job_registration)
pub const LABEL_KIND: &str = "kind";

// ─── Record 메트릭 ──────────────────────────────────────────────────

/// 기록된 라인 수 (counter)
pub const RECORD_LINES_INGESTED_TOTAL: &str = "porla_record_lines_ingested_total";

/// 기록된 바이트 수 (counter)
pub const RECORD_BYTES_INGESTED_TOTAL: &str = "porla_record_bytes_ingested_total";

/// 버퍼 플러시 횟수 (counter)
pub const RECORD_FLUSHES_TOTAL: &str = "porla_record_flushes_total";

/// 로테이션 설정 중 발생한 경고 수 (counter, label: kind)
pub const RECORD_ROTATION_WARNINGS_TOTAL: &str = "porla_record_rotation_warnings_total";

/// 새로 등록된 cron 작업 수 (counter)
pub const RECORD_JOBS_REGISTERED_TOTAL: &str = "porla_record_jobs_registered_total";

/// 로테이션 활성화 여부 (gauge, 0 또는 1)
pub const RECORD_ROTATION_ENABLED: &str = "porla_record_rotation_enabled";

/// 전체 메트릭 이름 목록
pub const ALL_METRIC_NAMES: &[&str] = &[
    RECORD_LINES_INGESTED_TOTAL,
    RECORD_BYTES_INGESTED_TOTAL,
    RECORD_FLUSHES_TOTAL,
    RECORD_ROTATION_WARNINGS_TOTAL,
    RECORD_JOBS_REGISTERED_TOTAL,
    RECORD_ROTATION_ENABLED,
];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다. 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        RECORD_LINES_INGESTED_TOTAL,
        "Lines appended to the target file"
    );
    describe_counter!(
        RECORD_BYTES_INGESTED_TOTAL,
        "Bytes appended to the target file"
    );
    describe_counter!(RECORD_FLUSHES_TOTAL, "Buffered writer flushes");
    describe_counter!(
        RECORD_ROTATION_WARNINGS_TOTAL,
        "Non-fatal rotation setup failures"
    );
    describe_counter!(
        RECORD_JOBS_REGISTERED_TOTAL,
        "Rotation jobs appended to the scheduler job table"
    );
    describe_gauge!(
        RECORD_ROTATION_ENABLED,
        "Whether a rotation policy was configured for this sink"
    );
}
