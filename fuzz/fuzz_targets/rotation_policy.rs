#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use porla_record::{
    PolicyCompiler, PolicyDefaults, RotationPolicy, RotationRequest, archive_extension,
};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    target: String,
    rotate_at: Option<String>,
    rotate_interval: Option<String>,
    rotate_count: Option<u32>,
    date_format: Option<String>,
}

fuzz_target!(|input: FuzzInput| {
    if input.target.is_empty() || input.target.contains('\0') {
        return;
    }
    let request = RotationRequest {
        target: input.target.into(),
        rotate_at: input.rotate_at,
        rotate_interval: input.rotate_interval,
        rotate_count: input.rotate_count,
        date_format: input.date_format,
    };

    let Ok(Some(policy)) = RotationPolicy::from_request(&request, &PolicyDefaults::default())
    else {
        return;
    };

    let compiler = PolicyCompiler::default();
    let document = compiler.compile(&policy);

    // 같은 정책은 같은 바이트
    assert_eq!(document, compiler.compile(&policy));

    // extension 지시자는 확장자가 있을 때만
    let has_directive = document
        .contents()
        .lines()
        .any(|l| l.trim_start().starts_with("extension "));
    assert_eq!(has_directive, archive_extension(policy.target_path()).is_some());
    assert!(document.contents().contains("copytruncate"));

    // 입력이 블록 구조를 깨뜨리지 못함: 헤더 한 줄, 들여쓴 지시자들, 닫는 괄호
    let lines: Vec<&str> = document.contents().lines().collect();
    assert!(lines[0].ends_with(" {"));
    assert_eq!(lines.last().copied(), Some("}"));
    for line in &lines[1..lines.len() - 1] {
        let directive = line.strip_prefix("    ").unwrap_or_default();
        let keyword = directive.split(' ').next().unwrap_or_default();
        assert!(DIRECTIVES.contains(&keyword), "unexpected line {line:?}");
    }
});

const DIRECTIVES: &[&str] = &[
    "olddir",
    "createolddir",
    "extension",
    "dateformat",
    "rotate",
    "compress",
    "dateext",
    "dateyesterday",
    "missingok",
    "notifempty",
    "copytruncate",
];
