//! 정책 컴파일러 -- [`RotationPolicy`]를 logrotate 설정 블록으로 변환
//!
//! 생성되는 문서는 입력에만 의존하므로 같은 정책은 항상 같은 바이트를 만듭니다.
//! 시작할 때마다 무조건 덮어써도 안전한 이유입니다.
//!
//! # 생성 예시
//!
//! ```text
//! /var/log/app/out.log {
//!     olddir historic
//!     createolddir 0755 root root
//!     extension .log
//!     dateformat -%Y%m%d
//!     rotate 7
//!     compress
//!     dateext
//!     dateyesterday
//!     missingok
//!     notifempty
//!     copytruncate
//! }
//! ```
//!
//! `copytruncate`는 필수입니다. 기록기는 싱크가 살아 있는 동안 파일을
//! 계속 열어 두므로, rename 방식 로테이션은 기록기의 디스크립터를 고아로 만듭니다.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::atomic::atomic_write;
use crate::error::RecordError;
use crate::policy::RotationPolicy;

/// 로테이션 설정 파일 이름 접두어
pub const CONFIG_FILE_PREFIX: &str = "porla-";

/// 아카이브 디렉토리 소유자/그룹
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOwner {
    pub user: String,
    pub group: String,
}

impl ArchiveOwner {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    /// 현재 프로세스의 유효 사용자/그룹 이름을 조회합니다.
    ///
    /// 이름을 찾을 수 없으면 `None`을 반환합니다.
    #[cfg(unix)]
    pub fn current() -> Option<Self> {
        use nix::unistd::{Group, User, getegid, geteuid};

        let user = User::from_uid(geteuid()).ok().flatten()?;
        let group = Group::from_gid(getegid()).ok().flatten()?;
        Some(Self::new(user.name, group.name))
    }

    #[cfg(not(unix))]
    pub fn current() -> Option<Self> {
        None
    }
}

/// 컴파일러 설정
#[derive(Debug, Clone)]
pub struct PolicyCompiler {
    archive_dir: String,
    archive_dir_mode: String,
    archive_owner: Option<ArchiveOwner>,
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        Self {
            archive_dir: "historic".to_owned(),
            archive_dir_mode: "0755".to_owned(),
            archive_owner: None,
        }
    }
}

impl PolicyCompiler {
    pub fn new(archive_dir: impl Into<String>, archive_dir_mode: impl Into<String>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            archive_dir_mode: archive_dir_mode.into(),
            archive_owner: None,
        }
    }

    pub fn with_owner(mut self, owner: Option<ArchiveOwner>) -> Self {
        self.archive_owner = owner;
        self
    }

    /// porla.toml `[rotation]` 섹션에서 컴파일러를 만듭니다.
    ///
    /// 소유자/그룹이 비어 있으면 실행 사용자로 채웁니다.
    pub fn from_core(config: &porla_core::config::RotationConfig) -> Self {
        let owner = match (
            config.archive_owner.is_empty(),
            config.archive_group.is_empty(),
        ) {
            (false, false) => Some(ArchiveOwner::new(
                &config.archive_owner,
                &config.archive_group,
            )),
            (true, true) => ArchiveOwner::current(),
            _ => ArchiveOwner::current().map(|current| {
                ArchiveOwner::new(
                    non_empty_or(&config.archive_owner, current.user),
                    non_empty_or(&config.archive_group, current.group),
                )
            }),
        };
        Self::new(&config.archive_dir, &config.archive_dir_mode).with_owner(owner)
    }

    /// 정책을 설정 문서로 컴파일합니다. 부수 효과가 없습니다.
    pub fn compile(&self, policy: &RotationPolicy) -> RotationConfigDocument {
        let extension = policy.archive_extension();
        let mut text = String::new();

        // String에 대한 write!는 실패하지 않음
        let _ = writeln!(text, "{} {{", quote_target(policy.target_path()));
        let _ = writeln!(text, "    olddir {}", self.archive_dir);
        match &self.archive_owner {
            Some(owner) => {
                let _ = writeln!(
                    text,
                    "    createolddir {} {} {}",
                    self.archive_dir_mode, owner.user, owner.group
                );
            }
            None => {
                let _ = writeln!(text, "    createolddir {}", self.archive_dir_mode);
            }
        }
        if let Some(ext) = &extension {
            let _ = writeln!(text, "    extension {ext}");
        }
        let _ = writeln!(text, "    dateformat {}", policy.date_format());
        let _ = writeln!(text, "    rotate {}", policy.retention_count());
        for directive in [
            "compress",
            "dateext",
            "dateyesterday",
            "missingok",
            "notifempty",
            "copytruncate",
        ] {
            let _ = writeln!(text, "    {directive}");
        }
        text.push_str("}\n");

        RotationConfigDocument {
            file_name: config_file_name(policy.target_path()),
            target_path: policy.target_path().to_path_buf(),
            archive_extension: extension,
            contents: text,
        }
    }
}

fn non_empty_or(value: &str, fallback: String) -> String {
    if value.is_empty() {
        fallback
    } else {
        value.to_owned()
    }
}

/// 공백이나 작은따옴표가 있는 경로는 큰따옴표로 감쌉니다.
///
/// 큰따옴표, 중괄호, 제어 문자는 [`RotationPolicy`] 생성 시 이미 거부되었습니다.
fn quote_target(path: &Path) -> String {
    let raw = path.display().to_string();
    if raw.chars().any(|c| c.is_whitespace() || c == '\'') {
        format!("\"{raw}\"")
    } else {
        raw
    }
}

/// 대상 파일에 대한 설정 파일 이름 (`porla-<basename>`)
pub fn config_file_name(target: &Path) -> String {
    let base = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".to_owned());
    format!("{CONFIG_FILE_PREFIX}{base}")
}

/// 컴파일된 logrotate 설정 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationConfigDocument {
    file_name: String,
    target_path: PathBuf,
    archive_extension: Option<String>,
    contents: String,
}

impl RotationConfigDocument {
    /// 설정 파일 이름 (`porla-<basename>`)
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn archive_extension(&self) -> Option<&str> {
        self.archive_extension.as_deref()
    }

    /// 문서 본문
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// 설정 루트 아래의 정규 경로
    pub fn config_path(&self, root: &Path) -> PathBuf {
        root.join(&self.file_name)
    }

    /// 설정 루트에 문서를 씁니다. 기존 파일은 무조건 덮어씁니다.
    ///
    /// logrotate는 그룹/기타 쓰기 권한이 있는 설정을 거부하므로 0644로 씁니다.
    pub async fn write_to(&self, root: &Path) -> Result<PathBuf, RecordError> {
        let path = self.config_path(root);
        atomic_write(&path, self.contents.as_bytes(), Some(0o644))
            .await
            .map_err(|source| RecordError::PolicyWrite {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "rotation config written");
        Ok(path)
    }
}
