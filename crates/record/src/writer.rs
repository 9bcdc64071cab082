//! 입력 기록기 -- 표준 입력을 대상 파일에 추가 전용으로 복사
//!
//! [`IngestWriter`]는 대상 파일을 append 모드로 열고 입력 스트림의 모든 줄을
//! 바이트 그대로 복사합니다. 로테이션 상태와 무관하게 동작하며, 아카이버가
//! copytruncate로 파일을 비워도 append 모드 핸들은 계속 파일 끝에 씁니다.
//!
//! 버퍼는 `flush_interval`마다, 그리고 입력 종료나 종료 신호 시 플러시됩니다.
//! 입력이 끊임없이 들어와 타이머가 선택되지 못해도 마지막 플러시 후
//! `flush_interval`이 지나면 줄을 쓴 직후 플러시합니다.
//! 종료 신호를 받으면 읽기 버퍼에 이미 들어온 줄과 부분 줄까지 기록한 뒤 멈춥니다.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::time::Instant;
use tracing::{debug, info};

use porla_core::metrics as m;

use crate::error::RecordError;

/// 쓰기 버퍼 크기
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// 기록기 동작 설정
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// 버퍼 플러시 주기
    pub flush_interval: Duration,
    /// 종료 시 fsync 여부
    pub sync_on_exit: bool,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            sync_on_exit: true,
        }
    }
}

impl IngestSettings {
    pub fn from_core(config: &porla_core::config::IngestConfig) -> Self {
        Self {
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
            sync_on_exit: config.sync_on_exit,
        }
    }
}

/// 기록 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 입력 스트림 종료
    EndOfInput,
    /// 종료 신호 수신
    Shutdown,
}

/// 기록 통계
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// 기록한 줄 수 (개행 없는 마지막 부분 줄 포함)
    pub lines: u64,
    /// 기록한 바이트 수
    pub bytes: u64,
    /// 플러시 횟수
    pub flushes: u64,
    pub stop_reason: StopReason,
}

/// 추가 전용 파일 기록기
pub struct IngestWriter {
    path: PathBuf,
    file: BufWriter<File>,
    settings: IngestSettings,
}

impl IngestWriter {
    /// 대상 파일을 append 모드로 엽니다. 부모 디렉토리가 없으면 만듭니다.
    ///
    /// # Errors
    ///
    /// 디렉토리 생성이나 파일 열기 실패 시 [`RecordError::Ingest`]
    pub async fn open(
        path: impl Into<PathBuf>,
        settings: IngestSettings,
    ) -> Result<Self, RecordError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RecordError::Ingest {
                    path: path.clone(),
                    source,
                })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| RecordError::Ingest {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "opened target for append");
        Ok(Self {
            path,
            file: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 입력이 끝나거나 `shutdown`이 완료될 때까지 복사합니다.
    ///
    /// # Errors
    ///
    /// 입력 읽기 또는 파일 쓰기 실패 시 [`RecordError::Ingest`]
    pub async fn run<R, F>(mut self, input: R, shutdown: F) -> Result<IngestStats, RecordError>
    where
        R: AsyncRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut reader = BufReader::new(input);
        // select! 취소 시 read_until이 읽은 부분은 여기에 남음
        let mut line = Vec::with_capacity(8 * 1024);
        let mut stats = IngestStats {
            lines: 0,
            bytes: 0,
            flushes: 0,
            stop_reason: StopReason::EndOfInput,
        };
        let mut dirty = false;
        let mut last_flush = Instant::now();

        let mut ticker = tokio::time::interval(self.settings.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(path = %self.path.display(), "shutdown requested, stopping ingestion");
                    stats.stop_reason = StopReason::Shutdown;
                    break;
                }

                read = reader.read_until(b'\n', &mut line) => {
                    let n = read.map_err(|e| self.ingest_error(e))?;
                    if n == 0 {
                        debug!(path = %self.path.display(), "end of input");
                        break;
                    }
                    if line.ends_with(b"\n") {
                        self.append(&line, &mut stats).await?;
                        line.clear();
                        dirty = true;
                        // 입력이 계속 준비되어 있으면 ticker 분기에 도달하지 못함
                        if last_flush.elapsed() >= self.settings.flush_interval {
                            self.flush(&mut stats).await?;
                            dirty = false;
                            last_flush = Instant::now();
                        }
                    }
                }

                _ = ticker.tick() => {
                    if dirty {
                        self.flush(&mut stats).await?;
                        dirty = false;
                        last_flush = Instant::now();
                    }
                }
            }
        }

        // 종료 신호로 멈춘 경우 읽기 버퍼에 남은 줄들, 그리고 개행 없는 마지막 조각
        line.extend_from_slice(reader.buffer());
        for chunk in line.split_inclusive(|&b| b == b'\n') {
            self.append(chunk, &mut stats).await?;
        }

        self.flush(&mut stats).await?;
        if self.settings.sync_on_exit {
            self.file
                .get_ref()
                .sync_all()
                .await
                .map_err(|e| self.ingest_error(e))?;
        }

        info!(
            path = %self.path.display(),
            lines = stats.lines,
            bytes = stats.bytes,
            "ingestion stopped"
        );
        Ok(stats)
    }

    async fn append(&mut self, data: &[u8], stats: &mut IngestStats) -> Result<(), RecordError> {
        self.file
            .write_all(data)
            .await
            .map_err(|e| self.ingest_error(e))?;
        stats.lines += 1;
        stats.bytes += data.len() as u64;
        metrics::counter!(m::RECORD_LINES_INGESTED_TOTAL).increment(1);
        metrics::counter!(m::RECORD_BYTES_INGESTED_TOTAL).increment(data.len() as u64);
        Ok(())
    }

    async fn flush(&mut self, stats: &mut IngestStats) -> Result<(), RecordError> {
        self.file.flush().await.map_err(|e| self.ingest_error(e))?;
        stats.flushes += 1;
        metrics::counter!(m::RECORD_FLUSHES_TOTAL).increment(1);
        Ok(())
    }

    fn ingest_error(&self, source: std::io::Error) -> RecordError {
        RecordError::Ingest {
            path: self.path.clone(),
            source,
        }
    }
}
