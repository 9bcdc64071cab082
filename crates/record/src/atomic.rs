//! 임시 파일 + rename 기반 원자적 파일 교체

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// 같은 디렉토리의 임시 파일에 쓰고 fsync한 뒤 최종 경로로 rename합니다.
///
/// 임시 파일 이름에 UUID를 붙여 동시에 같은 경로를 교체하는 프로세스끼리
/// 충돌하지 않게 합니다. 실패하면 임시 파일을 지우고, 기존 파일은 그대로 남습니다.
/// `mode`가 주어지면 rename 전에 권한을 설정합니다 (Unix 전용).
pub(crate) async fn atomic_write(
    final_path: &Path,
    data: &[u8],
    mode: Option<u32>,
) -> std::io::Result<()> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let temp_path =
        final_path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = write_and_rename(&temp_path, final_path, data, mode).await;
    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

async fn write_and_rename(
    temp_path: &Path,
    final_path: &Path,
    data: &[u8],
    mode: Option<u32>,
) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp_path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    drop(file);
    fs::rename(temp_path, final_path).await
}
