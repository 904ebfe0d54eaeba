//! 감사 대상 키-값 스토리지 데코레이터
//!
//! [`AuditedStore`]는 [`KeyValueStore`]를 감싸서 같은 인터페이스를 구현합니다.
//! 모든 get/put/delete를 내부 저장소로 전달한 뒤, 결과(실패 포함)를
//! `storage-access` 감사 레코드로 남깁니다. 값 자체는 기록하지 않습니다.

use std::collections::HashMap;
use std::future::Future;

use serde::Serialize;
use tokio::sync::RwLock;
use watchpost_core::error::StorageError;

use crate::record::RecordKind;
use crate::sink::AuditHandle;

/// 키-값 저장소 인터페이스
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    fn put(&self, key: &str, value: String) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 키를 삭제합니다. 존재했으면 `true`.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, StorageError>> + Send;
}

/// 인메모리 키-값 저장소
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

/// 스토리지 접근 감사 레코드 본문
#[derive(Debug, Serialize)]
struct StorageAccess<'a> {
    namespace: &'a str,
    operation: &'static str,
    key: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// 접근을 감사 로그로 남기는 저장소 데코레이터
pub struct AuditedStore<K> {
    inner: K,
    audit: AuditHandle,
    namespace: String,
}

impl<K: KeyValueStore> AuditedStore<K> {
    pub fn new(inner: K, audit: AuditHandle, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            audit,
            namespace: namespace.into(),
        }
    }

    /// 감싼 저장소
    pub fn inner(&self) -> &K {
        &self.inner
    }

    fn emit(
        &self,
        operation: &'static str,
        key: &str,
        outcome: &'static str,
        bytes: Option<usize>,
        error: Option<&StorageError>,
    ) {
        self.audit.record(
            RecordKind::StorageAccess,
            operation,
            &StorageAccess {
                namespace: &self.namespace,
                operation,
                key,
                outcome,
                bytes,
                error: error.map(ToString::to_string),
            },
        );
    }
}

impl<K: KeyValueStore> KeyValueStore for AuditedStore<K> {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let result = self.inner.get(key).await;
        match &result {
            Ok(Some(value)) => self.emit("get", key, "hit", Some(value.len()), None),
            Ok(None) => self.emit("get", key, "miss", None, None),
            Err(e) => self.emit("get", key, "error", None, Some(e)),
        }
        result
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StorageError> {
        let bytes = value.len();
        let result = self.inner.put(key, value).await;
        match &result {
            Ok(()) => self.emit("put", key, "ok", Some(bytes), None),
            Err(e) => self.emit("put", key, "error", Some(bytes), Some(e)),
        }
        result
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let result = self.inner.delete(key).await;
        match &result {
            Ok(true) => self.emit("delete", key, "ok", None, None),
            Ok(false) => self.emit("delete", key, "miss", None, None),
            Err(e) => self.emit("delete", key, "error", None, Some(e)),
        }
        result
    }
}
