//! 감사 레코드 저장소
//!
//! 싱크는 [`AuditStore::write_batch`] 하나만 사용합니다.
//! 보장하는 것은 배치 안의 순서와 at-least-once 전달뿐입니다.
//!
//! - [`MemoryAuditStore`]: 테스트와 `audit.store = "memory"`용
//! - [`JsonlAuditStore`]: append-only JSON Lines 파일, 배치마다 `sync_data`
//! - [`ConfiguredStore`]: 설정으로 고르는 저장소

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use watchpost_core::config::AuditConfig;

use crate::error::AuditError;
use crate::record::AuditRecord;

/// 감사 레코드를 영속화하는 저장소
pub trait AuditStore: Send + Sync + 'static {
    /// 저장소 이름 (로그/에러 메시지용)
    fn name(&self) -> &str;

    /// 배치를 한 번에 기록합니다. 실패하면 싱크가 배치 전체를 재시도합니다.
    fn write_batch(
        &self,
        records: &[AuditRecord],
    ) -> impl Future<Output = Result<(), AuditError>> + Send;
}

/// 인메모리 저장소
///
/// 복제본은 같은 저장 공간을 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditStore {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 레코드의 복사본
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditStore for MemoryAuditStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        Ok(())
    }
}

/// JSON Lines 파일 저장소
///
/// 배치 전체를 한 번의 `write_all`로 덧붙이고 `sync_data`로 디스크에 내립니다.
/// 파일은 첫 쓰기 때 (필요하면 상위 디렉토리와 함께) 생성됩니다.
#[derive(Debug)]
pub struct JsonlAuditStore {
    path: PathBuf,
    file: tokio::sync::Mutex<Option<tokio::fs::File>>,
}

impl JsonlAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: tokio::sync::Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<tokio::fs::File, AuditError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        debug!(path = %self.path.display(), "audit log file opened");
        Ok(file)
    }

    fn write_error(&self, err: impl std::fmt::Display) -> AuditError {
        AuditError::Write {
            store: format!("jsonl:{}", self.path.display()),
            reason: err.to_string(),
        }
    }
}

impl AuditStore for JsonlAuditStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn write_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&record.to_json_line()?);
            buf.push('\n');
        }

        let mut guard = self.file.lock().await;
        let mut file = match guard.take() {
            Some(file) => file,
            None => self.open().await.map_err(|e| self.write_error(e))?,
        };

        // 실패하면 핸들을 버리고 다음 시도에서 파일을 다시 엽니다.
        append(&mut file, buf.as_bytes())
            .await
            .map_err(|e| self.write_error(e))?;
        *guard = Some(file);
        Ok(())
    }
}

async fn append(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_data().await
}

/// `audit.store` 설정으로 선택한 저장소
#[derive(Debug)]
pub enum ConfiguredStore {
    Memory(MemoryAuditStore),
    Jsonl(JsonlAuditStore),
}

impl ConfiguredStore {
    /// 설정에서 저장소를 생성합니다.
    pub fn from_config(config: &AuditConfig) -> Result<Self, AuditError> {
        match config.store.as_str() {
            "memory" => Ok(Self::Memory(MemoryAuditStore::new())),
            "jsonl" => Ok(Self::Jsonl(JsonlAuditStore::new(&config.path))),
            other => Err(AuditError::UnknownStore(other.to_owned())),
        }
    }
}

impl AuditStore for ConfiguredStore {
    fn name(&self) -> &str {
        match self {
            Self::Memory(store) => store.name(),
            Self::Jsonl(store) => store.name(),
        }
    }

    async fn write_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        match self {
            Self::Memory(store) => store.write_batch(records).await,
            Self::Jsonl(store) => store.write_batch(records).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record::RecordKind;

    fn batch(n: usize) -> Vec<AuditRecord> {
        (0..n)
            .map(|i| AuditRecord::from_value(RecordKind::Event, format!("r{i}"), json!({"i": i})))
            .collect()
    }

    #[tokio::test]
    async fn memory_store_appends_in_order() {
        let store = MemoryAuditStore::new();
        store.write_batch(&batch(2)).await.unwrap();
        store.write_batch(&batch(1)).await.unwrap();
        let actions: Vec<_> = store.records().into_iter().map(|r| r.action).collect();
        assert_eq!(actions, vec!["r0", "r1", "r0"]);
    }

    #[tokio::test]
    async fn jsonl_store_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/audit.jsonl");
        let store = JsonlAuditStore::new(&path);

        store.write_batch(&batch(3)).await.unwrap();
        store.write_batch(&batch(2)).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, "r0");
        assert_eq!(first.payload["i"], 0);
    }

    #[tokio::test]
    async fn jsonl_store_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // 디렉토리 자체를 파일로 열 수는 없습니다.
        let store = JsonlAuditStore::new(dir.path());
        let err = store.write_batch(&batch(1)).await.unwrap_err();
        assert!(matches!(err, AuditError::Write { .. }));
    }

    #[test]
    fn configured_store_selection() {
        let memory = AuditConfig {
            store: "memory".to_owned(),
            ..AuditConfig::default()
        };
        assert_eq!(ConfiguredStore::from_config(&memory).unwrap().name(), "memory");

        let unknown = AuditConfig {
            store: "s3".to_owned(),
            ..AuditConfig::default()
        };
        assert!(matches!(
            ConfiguredStore::from_config(&unknown),
            Err(AuditError::UnknownStore(_))
        ));
    }
}
