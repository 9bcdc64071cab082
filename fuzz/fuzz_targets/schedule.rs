#![no_main]

use libfuzzer_sys::fuzz_target;
use porla_record::{CronExpression, NamedInterval, validate_date_format};

fuzz_target!(|data: &str| {
    // 필드 수가 5일 때만 성공해야 한다
    let fields = data.split_whitespace().count();
    match CronExpression::parse(data) {
        Ok(expr) => {
            assert_eq!(fields, 5);
            // 정규화된 표현식은 다시 파싱해도 같아야 한다
            let again = CronExpression::parse(&expr.to_string()).unwrap();
            assert_eq!(again, expr);
        }
        Err(e) => {
            assert_ne!(fields, 5);
            assert!(e.is_validation());
        }
    }

    if let Ok(interval) = data.parse::<NamedInterval>() {
        assert_eq!(interval.as_str(), data);
    }

    // `%`가 있고 공백/제어 문자가 없을 때만 허용
    let single_token = !data.chars().any(|c| c.is_whitespace() || c.is_control());
    assert_eq!(
        validate_date_format(data).is_ok(),
        data.contains('%') && single_token
    );
});
