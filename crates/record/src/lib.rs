//! Porla `record` 싱크
//!
//! 표준 입력을 대상 파일에 추가 전용으로 기록하고, 선택적으로 logrotate 정책을
//! 생성하여 cron 작업으로 등록합니다.
//!
//! # 모듈 구조
//!
//! - [`error`]: 도메인 에러 (`RecordError`)
//! - [`schedule`]: 스케줄 검증 (`CronExpression`, `NamedInterval`, `Trigger`)
//! - [`policy`]: 검증된 정책 (`RotationRequest`, `RotationPolicy`)
//! - [`compiler`]: logrotate 설정 생성 (`PolicyCompiler`, `RotationConfigDocument`)
//! - [`job`]: 작업 테이블 (`JobStore`, `FileJobStore`, `CrontabJobStore`, `MemoryJobStore`)
//! - [`scheduler`]: cron 데몬 제어 (`SchedulerHandle`, `ProcessScheduler`)
//! - [`registrar`]: 멱등 작업 등록 (`JobRegistrar`)
//! - [`config_root`]: 설정 루트 선택 (`ConfigRootResolver`, `RootScope`)
//! - [`supervisor`]: 시작 순서 조율 (`Supervisor`, `StartupReport`)
//! - [`writer`]: 추가 전용 기록 (`IngestWriter`)
//!
//! # 흐름
//!
//! ```text
//! RotationRequest --validate--> RotationPolicy --compile--> RotationConfigDocument
//!                                                              |
//!                                      ConfigRootResolver.resolve() + write_to()
//!                                                              |
//!                                   JobRegistrar.ensure_scheduler() + register()
//!                                      (System -> 스풀 파일, User -> 사용자 crontab)
//!
//! stdin --IngestWriter.run()--> target (append)
//! ```

mod atomic;
pub mod compiler;
pub mod config_root;
pub mod error;
pub mod job;
pub mod policy;
pub mod registrar;
pub mod schedule;
pub mod scheduler;
pub mod supervisor;
pub mod writer;

// --- Public API Re-exports ---

// Error
pub use error::RecordError;

// Validation
pub use policy::{PolicyDefaults, RotationPolicy, RotationRequest, archive_extension};
pub use schedule::{CronExpression, NamedInterval, Trigger, validate_date_format};

// Compilation
pub use compiler::{ArchiveOwner, PolicyCompiler, RotationConfigDocument, config_file_name};

// Registration
pub use job::{CrontabJobStore, FileJobStore, JobStore, MemoryJobStore, ScheduledJob};
pub use registrar::{JobRegistrar, Registration, RegistrationOutcome};
pub use scheduler::{FakeScheduler, ProcessScheduler, SchedulerFailure, SchedulerHandle};

// Lifecycle
pub use config_root::{ConfigRoot, ConfigRootResolver, RootScope};
pub use supervisor::{
    JobStores, RotationPreview, SinkState, StartupReport, StartupWarning, Supervisor,
    SupervisorSettings,
};

// Ingestion
pub use writer::{IngestSettings, IngestStats, IngestWriter, StopReason};
