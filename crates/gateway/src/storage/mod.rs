//! # ファイルストレージ
//!
//! アップロードファイルの保存先の抽象インターフェースと、保存前の検証。
//! ローカルディスク実装は `local` サブモジュールを参照。

pub mod local;

pub use local::LocalFileStore;

use std::path::Path;

use chrono::{DateTime, Utc};
use watermark_types::StoredFile;

use crate::error::GatewayError;

/// アップロード上限（50 MiB）
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// 受け付けるMIMEタイプ。
pub const ALLOWED_MIME_TYPES: [&str; 18] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "text/csv",
    "application/json",
    "text/xml",
    "application/xml",
    "image/jpeg",
    "image/png",
    "image/gif",
    "audio/mpeg",
    "audio/wav",
    "video/mp4",
];

/// 拡張子として保存名に残す最大文字数
const MAX_EXTENSION_LEN: usize = 16;

/// 保存待ちのアップロード。検証済みであること。
#[derive(Debug)]
pub struct NewUpload {
    pub bytes: Vec<u8>,
    pub original_name: String,
    /// 正規化済みMIMEタイプ
    pub mime_type: String,
    pub retention: chrono::Duration,
}

/// ファイル保存先の抽象インターフェース。
///
/// id→レコードの対応を保持し、保存・参照・削除・期限切れ一括削除を提供する。
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    /// バイト列を保存してレコードを返す。
    async fn put(&self, upload: NewUpload) -> Result<StoredFile, GatewayError>;

    /// idでレコードを引く。
    async fn get(&self, id: &str) -> Result<Option<StoredFile>, GatewayError>;

    /// レコードとバイト列を削除する。存在しなかった場合は `None`。
    async fn delete(&self, id: &str) -> Result<Option<StoredFile>, GatewayError>;

    /// `now` 時点で期限切れのレコードを全て削除し、削除したものを返す。
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<StoredFile>, GatewayError>;

    /// 公開配信するディレクトリ
    fn files_dir(&self) -> &Path;
}

/// MIMEタイプからパラメータ（`; charset=...` 等）を除き小文字化する。
pub fn normalize_mime_type(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// 許可リストに含まれるか検証し、正規化済みMIMEタイプを返す。
pub fn check_mime_type(mime: &str) -> Result<String, GatewayError> {
    let normalized = normalize_mime_type(mime);
    if ALLOWED_MIME_TYPES.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(GatewayError::UnsupportedType(mime.to_string()))
    }
}

/// 検証してから保存する。検証に失敗した場合は何も書き込まない。
pub async fn upload(
    store: &dyn FileStore,
    bytes: Vec<u8>,
    original_name: &str,
    mime: &str,
    retention: chrono::Duration,
) -> Result<StoredFile, GatewayError> {
    let mime_type = check_mime_type(mime)?;
    if bytes.len() as u64 > MAX_UPLOAD_BYTES {
        return Err(GatewayError::TooLarge {
            limit: MAX_UPLOAD_BYTES,
        });
    }
    if retention <= chrono::Duration::zero() {
        return Err(GatewayError::Internal(
            "保持期間は正の値である必要があります".to_string(),
        ));
    }

    store
        .put(NewUpload {
            bytes,
            original_name: original_name.to_string(),
            mime_type,
            retention,
        })
        .await
}

/// 元のファイル名から保存名に付ける拡張子（`.` 付き）を取り出す。
///
/// ASCII英数字のみ・16文字以内のものだけを残し、それ以外は付けない。
pub fn sanitized_extension(original_name: &str) -> Option<String> {
    let (stem, ext) = original_name.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// 保存名を生成する。戻り値は `(id, stored_name)`。
///
/// `{unixMillis}_{32桁hex}{ext}`。idは拡張子を除いた部分。
pub fn generate_stored_name(now: DateTime<Utc>, original_name: &str) -> (String, String) {
    let id = format!(
        "{}_{}",
        now.timestamp_millis(),
        hex::encode(rand::random::<[u8; 16]>())
    );
    let stored_name = match sanitized_extension(original_name) {
        Some(ext) => format!("{id}{ext}"),
        None => id.clone(),
    };
    (id, stored_name)
}
