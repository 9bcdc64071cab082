#![no_main]

use std::path::Path;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use porla_record::CronExpression;
use porla_record::job::{ScheduledJob, append_entry, entry_command, table_contains};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 기존 작업 테이블 내용
    table: String,
    /// 설정 파일 경로
    config_path: String,
}

fuzz_target!(|input: FuzzInput| {
    for line in input.table.lines() {
        let _ = entry_command(line);
    }

    if input.config_path.contains(['\n', '\r', '\0']) {
        return;
    }
    let schedule = CronExpression::parse("0 0 * * *").unwrap();
    let job = ScheduledJob::rotation(
        &schedule,
        "/usr/sbin/logrotate",
        Path::new(&input.config_path),
    );

    // 추가 후에는 반드시 찾을 수 있고, 기존 줄은 보존된다
    let updated = append_entry(&input.table, &job);
    assert!(table_contains(&updated, job.command()));
    assert!(updated.starts_with(&input.table));
    assert_eq!(append_entry(&updated, &job).len(), updated.len() + job.table_line().len() + 1);
});
