//! 로테이션 설정 루트 선택
//!
//! [`ConfigRootResolver`]는 후보 디렉토리를 순서대로 시도하여 처음으로 쓰기 가능한
//! 디렉토리를 반환합니다. 기본 후보는 시스템 디렉토리(`/etc/logrotate.d`)와
//! 사용자별 디렉토리입니다. 선택은 싱크 시작 시 한 번만 이루어지며,
//! 정책 컴파일러와 작업 등록기가 같은 루트를 사용합니다.
//!
//! 첫 번째 후보만 [`RootScope::System`]이고 나머지는 [`RootScope::User`]입니다.
//! 범위에 따라 작업이 등록되는 테이블이 달라집니다.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::RecordError;

/// 선택된 설정 루트의 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootScope {
    /// 시스템 디렉토리. 시스템 작업 테이블에 등록
    System,
    /// 사용자별 디렉토리. 실행 사용자의 crontab에 등록
    User,
}

/// 선택된 설정 루트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRoot {
    pub path: PathBuf,
    pub scope: RootScope,
}

/// 쓰기 가능한 설정 루트를 고르는 해석기
#[derive(Debug, Clone)]
pub struct ConfigRootResolver {
    candidates: Vec<PathBuf>,
}

impl ConfigRootResolver {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// `[rotation]` 설정에서 시스템 디렉토리와 사용자 디렉토리 후보를 만듭니다.
    pub fn from_core(config: &porla_core::config::RotationConfig) -> Self {
        let mut candidates = vec![PathBuf::from(&config.system_config_dir)];
        if let Some(user_dir) = config.resolved_user_config_dir() {
            if !candidates.contains(&user_dir) {
                candidates.push(user_dir);
            }
        }
        Self::new(candidates)
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// 처음으로 쓰기 가능한 후보를 반환합니다. 없는 디렉토리는 생성합니다.
    ///
    /// # Errors
    ///
    /// 모든 후보가 쓰기 불가하면 [`RecordError::PermissionDenied`]
    pub async fn resolve(&self) -> Result<ConfigRoot, RecordError> {
        for (index, candidate) in self.candidates.iter().enumerate() {
            match check_writable(candidate).await {
                Ok(()) => {
                    let scope = if index == 0 {
                        RootScope::System
                    } else {
                        RootScope::User
                    };
                    debug!(root = %candidate.display(), ?scope, "selected rotation config root");
                    return Ok(ConfigRoot {
                        path: candidate.clone(),
                        scope,
                    });
                }
                Err(e) => {
                    debug!(root = %candidate.display(), error = %e, "config root not writable");
                }
            }
        }
        Err(RecordError::PermissionDenied {
            tried: self.candidates.clone(),
        })
    }
}

/// 디렉토리를 만들고 임시 파일을 생성해 쓰기 권한을 확인합니다.
async fn check_writable(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix(".porla-write-check")
            .tempfile_in(&dir)
            .map(drop)
    })
    .await
    .map_err(std::io::Error::other)?
}
