//! # クライアントエラー型

use watermark_crypto::CryptoError;

use crate::retry::{RetryError, Retryable};

/// 署名付きAPIクライアントのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 設定不備
    #[error("設定が不正です: {0}")]
    Config(String),
    /// 呼び出し側の入力不正
    #[error("不正な入力: {0}")]
    InvalidInput(String),
    /// 署名生成に失敗
    #[error("署名生成に失敗: {0}")]
    Signing(#[from] CryptoError),
    /// リクエストボディのシリアライズに失敗
    #[error("リクエストのシリアライズに失敗: {0}")]
    Serialize(String),
    /// 接続失敗等
    #[error("HTTP送信失敗: {0}")]
    Transport(String),
    /// タイムアウト
    #[error("リクエストがタイムアウトしました: {0}")]
    Timeout(String),
    /// レスポンスボディの読み取りに失敗
    #[error("レスポンス読み取り失敗: {0}")]
    ReadBody(String),
    /// 2xx以外のステータス
    #[error("APIリクエスト失敗: {status} {status_text} - {body}")]
    Status {
        status: u16,
        status_text: String,
        body: String,
    },
    /// 全試行が失敗
    #[error("リクエスト失敗、{attempts}回試行しました: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// HTTPステータス（リトライ後の場合は最後の試行のもの）
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

impl Retryable for ClientError {
    /// 通信失敗・タイムアウト・408/429/5xx は一時的な失敗として再試行する。
    /// その他の4xxやローカルでの失敗は即座に返す。
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Timeout(_) | ClientError::ReadBody(_) => true,
            ClientError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            ClientError::Config(_)
            | ClientError::InvalidInput(_)
            | ClientError::Signing(_)
            | ClientError::Serialize(_)
            | ClientError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<RetryError<ClientError>> for ClientError {
    fn from(err: RetryError<ClientError>) -> Self {
        match err {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { attempts, last } => ClientError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
        }
    }
}
