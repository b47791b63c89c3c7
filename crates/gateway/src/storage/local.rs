//! # ローカルディスク実装
//!
//! `{root}/files/` に実体、`{root}/index.json` に id→レコード表を置く。
//! 表は変更のたびに一時ファイル経由で書き換え、起動時に読み戻す。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use watermark_types::StoredFile;

use super::{generate_stored_name, FileStore, NewUpload};
use crate::error::GatewayError;

const INDEX_VERSION: u32 = 1;

#[derive(Serialize)]
struct IndexSnapshot<'a> {
    version: u32,
    files: Vec<&'a StoredFile>,
}

#[derive(Deserialize)]
struct IndexFile {
    #[allow(dead_code)]
    version: u32,
    files: Vec<StoredFile>,
}

/// ローカルディスク上のファイルストア。
pub struct LocalFileStore {
    files_dir: PathBuf,
    index_path: PathBuf,
    index: RwLock<HashMap<String, StoredFile>>,
}

impl LocalFileStore {
    /// `root` 配下を初期化し、既存の表を読み込む。
    ///
    /// 実体が見つからないレコードは読み込み時に捨てる。
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let root = root.into();
        let files_dir = root.join("files");
        let index_path = root.join("index.json");
        tokio::fs::create_dir_all(&files_dir).await?;

        let mut index = HashMap::new();
        let mut dropped = 0usize;
        match tokio::fs::read(&index_path).await {
            Ok(bytes) => {
                let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| {
                    GatewayError::Storage(format!("index.jsonの読み込みに失敗: {e}"))
                })?;
                for record in file.files {
                    let exists = tokio::fs::try_exists(files_dir.join(&record.stored_name))
                        .await
                        .unwrap_or(false);
                    if exists {
                        index.insert(record.id.clone(), record);
                    } else {
                        dropped += 1;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let store = Self {
            files_dir,
            index_path,
            index: RwLock::new(index),
        };

        if dropped > 0 {
            tracing::warn!(dropped, "実体が存在しないレコードを破棄しました");
            let index = store.index.read().await;
            store.persist(&index).await?;
        }

        let files = store.index.read().await.len();
        tracing::info!(root = %root.display(), files, "ファイルストアを開きました");
        Ok(store)
    }

    /// 表を一時ファイルに書き出してから置き換える。
    async fn persist(&self, index: &HashMap<String, StoredFile>) -> Result<(), GatewayError> {
        let mut files: Vec<&StoredFile> = index.values().collect();
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let json = serde_json::to_vec_pretty(&IndexSnapshot {
            version: INDEX_VERSION,
            files,
        })
        .map_err(|e| GatewayError::Storage(format!("index.jsonのシリアライズに失敗: {e}")))?;

        let tmp_path = self.index_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.index_path).await?;
        Ok(())
    }

    /// 実体を削除する。既に存在しない場合は成功扱い。
    async fn remove_bytes(&self, record: &StoredFile) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.files_dir.join(&record.stored_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(file_id = %record.id, "ファイルの実体が既に存在しません");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, upload: NewUpload) -> Result<StoredFile, GatewayError> {
        let now = Utc::now();
        let (id, stored_name) = generate_stored_name(now, &upload.original_name);
        let path = self.files_dir.join(&stored_name);

        let record = StoredFile {
            id: id.clone(),
            original_name: upload.original_name,
            stored_name,
            size_bytes: upload.bytes.len() as u64,
            mime_type: upload.mime_type,
            storage_path: path.to_string_lossy().into_owned(),
            created_at: now,
            expires_at: now + upload.retention,
        };

        tokio::fs::write(&path, &upload.bytes).await?;

        let mut index = self.index.write().await;
        index.insert(id.clone(), record.clone());
        if let Err(e) = self.persist(&index).await {
            index.remove(&id);
            drop(index);
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                tracing::warn!(error = %cleanup, path = %path.display(), "保存済みファイルの後始末に失敗");
            }
            return Err(e);
        }

        tracing::info!(
            file_id = %record.id,
            size = record.size_bytes,
            mime = %record.mime_type,
            expires_at = %record.expires_at,
            "ファイルを保存しました"
        );
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<StoredFile>, GatewayError> {
        Ok(self.index.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<Option<StoredFile>, GatewayError> {
        let mut index = self.index.write().await;
        let Some(record) = index.remove(id) else {
            return Ok(None);
        };

        if let Err(e) = self.remove_bytes(&record).await {
            index.insert(record.id.clone(), record);
            return Err(e.into());
        }
        self.persist(&index).await?;

        tracing::info!(file_id = %id, "ファイルを削除しました");
        Ok(Some(record))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<StoredFile>, GatewayError> {
        let mut index = self.index.write().await;
        let expired: Vec<String> = index
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            let Some(record) = index.remove(&id) else {
                continue;
            };
            match self.remove_bytes(&record).await {
                Ok(()) => removed.push(record),
                Err(e) => {
                    // 次回のスイープで再試行する
                    tracing::warn!(file_id = %id, error = %e, "期限切れファイルの削除に失敗");
                    index.insert(id, record);
                }
            }
        }
        if !removed.is_empty() {
            self.persist(&index).await?;
        }
        Ok(removed)
    }

    fn files_dir(&self) -> &Path {
        &self.files_dir
    }
}
