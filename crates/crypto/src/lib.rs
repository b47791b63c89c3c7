//! # Watermark Relay リクエスト署名
//!
//! 外部ウォーターマークサービスが要求するHMAC認証を実装する。
//!
//! ## 署名手順
//! | Step | 内容 |
//! |------|------|
//! | 1 | 署名対象文字列 = `METHOD\npath\nHTTP-date\nbody` |
//! | 2 | 署名 = Base64(HMAC-SHA256(secret, 署名対象文字列)) |
//! | 3 | `Date` / `X-HMAC-*` ヘッダに付与 |
//!
//! `Date` ヘッダと署名対象の日時は同一の値でなければならない。
//! [`SigningRequest::new`] で一度だけ時刻を取得し、その文字列を両方に使う。

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `X-HMAC-ALGORITHM` ヘッダの値
pub const HMAC_ALGORITHM: &str = "hmac-sha256";

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_DATE: &str = "Date";
pub const HEADER_ALGORITHM: &str = "X-HMAC-ALGORITHM";
pub const HEADER_ACCESS_KEY: &str = "X-HMAC-ACCESS-KEY";
pub const HEADER_SIGNATURE: &str = "X-HMAC-SIGNATURE";

/// 署名処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// HMAC鍵の初期化に失敗
    #[error("HMAC鍵の初期化に失敗しました: {0}")]
    InvalidKey(String),
}

/// Base64エンジン（Standard）
pub fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// RFC 1123形式（HTTP-date）で日時を出力する。
///
/// 例: `Mon, 01 Jan 2024 00:00:00 GMT`
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// 署名対象文字列を構築する。ボディがない場合は空文字列を渡す。
pub fn canonical_string(method: &str, endpoint_path: &str, date: &str, body: &str) -> String {
    format!("{method}\n{endpoint_path}\n{date}\n{body}")
}

/// HMAC-SHA256を計算する。
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(message);
    let result = mac.finalize().into_bytes();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    Ok(digest)
}

/// HMAC-SHA256を計算し、Base64文字列で返す。
pub fn hmac_sha256_base64(secret: &str, message: &str) -> Result<String, CryptoError> {
    let digest = hmac_sha256(secret.as_bytes(), message.as_bytes())?;
    Ok(b64().encode(digest))
}

// ---------------------------------------------------------------------------
// 署名対象リクエスト
// ---------------------------------------------------------------------------

/// 署名前のリクエスト。呼び出しごとに構築し、永続化しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// HTTPメソッド（大文字）
    pub method: String,
    /// エンドポイントパス（ベースURLを含まない）
    pub endpoint_path: String,
    /// `Date` ヘッダに送る値
    pub date_header: String,
    /// シリアライズ済みJSONボディ（ボディなしは空文字列）
    pub body: String,
}

impl SigningRequest {
    /// `now` を一度だけHTTP-dateに変換して保持する。
    pub fn new(method: &str, endpoint_path: &str, body: Option<String>, now: DateTime<Utc>) -> Self {
        Self::with_date(method, endpoint_path, body, http_date(now))
    }

    /// 日付文字列を直接指定して構築する。
    pub fn with_date(
        method: &str,
        endpoint_path: &str,
        body: Option<String>,
        date_header: String,
    ) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            endpoint_path: endpoint_path.to_string(),
            date_header,
            body: body.unwrap_or_default(),
        }
    }

    pub fn canonical_string(&self) -> String {
        canonical_string(&self.method, &self.endpoint_path, &self.date_header, &self.body)
    }

    /// 共有秘密鍵で署名し、送信用のエンベロープを返す。
    pub fn sign(self, access_key: &str, secret_key: &str) -> Result<SignedEnvelope, CryptoError> {
        let string_to_sign = self.canonical_string();
        let signature = hmac_sha256_base64(secret_key, &string_to_sign)?;

        tracing::debug!(
            string_to_sign = %string_to_sign.replace('\n', "\\n"),
            "リクエストに署名しました"
        );

        Ok(SignedEnvelope {
            request: self,
            signature,
            access_key: access_key.to_string(),
        })
    }
}

/// 署名済みリクエスト。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub request: SigningRequest,
    /// Base64エンコードされた署名
    pub signature: String,
    pub access_key: String,
}

impl SignedEnvelope {
    /// 送信時に付与するヘッダ一覧。
    pub fn headers(&self) -> [(&'static str, String); 5] {
        [
            (HEADER_CONTENT_TYPE, "application/json".to_string()),
            (HEADER_DATE, self.request.date_header.clone()),
            (HEADER_ALGORITHM, HMAC_ALGORITHM.to_string()),
            (HEADER_ACCESS_KEY, self.access_key.clone()),
            (HEADER_SIGNATURE, self.signature.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TEST_DATE: &str = "Mon, 01 Jan 2024 00:00:00 GMT";

    /// 既知のテストベクタと一致することを確認
    #[test]
    fn test_known_vector() {
        let request = SigningRequest::with_date(
            "POST",
            "/dlp/file_process/add_watermark_task",
            Some(r#"{"file_url":"x"}"#.to_string()),
            TEST_DATE.to_string(),
        );
        let envelope = request.sign("ak", "test").unwrap();
        assert_eq!(
            envelope.signature,
            "yI8qHn2uUR5yszcsVZOQuIOY8/USJAXFJrxLczQkfHM="
        );
    }

    /// ボディなし（GET）の場合、署名対象文字列は末尾の改行で終わることを確認
    #[test]
    fn test_get_without_body() {
        let request = SigningRequest::with_date(
            "get",
            "/dlp/file_process/task/abc123",
            None,
            TEST_DATE.to_string(),
        );
        assert_eq!(
            request.canonical_string(),
            "GET\n/dlp/file_process/task/abc123\nMon, 01 Jan 2024 00:00:00 GMT\n"
        );
        let envelope = request.sign("ak", "test").unwrap();
        assert_eq!(
            envelope.signature,
            "pbtctT5YTVBKhoAO6sblhcwcIvoH/6UZxtTCneGkKFw="
        );
    }

    /// 同一入力からは同一の署名が得られることを確認
    #[test]
    fn test_signature_is_deterministic() {
        let a = hmac_sha256_base64("secret", "POST\n/p\nd\n{}").unwrap();
        let b = hmac_sha256_base64("secret", "POST\n/p\nd\n{}").unwrap();
        let c = hmac_sha256_base64("other", "POST\n/p\nd\n{}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    /// RFC 4231 テストケース2
    #[test]
    fn test_hmac_sha256_rfc4231() {
        let digest = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(digest),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_http_date_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(http_date(at), TEST_DATE);

        let at = Utc.with_ymd_and_hms(2025, 7, 9, 13, 5, 42).unwrap();
        assert_eq!(http_date(at), "Wed, 09 Jul 2025 13:05:42 GMT");
    }

    /// Dateヘッダと署名対象の日時が同一の値であることを確認
    #[test]
    fn test_date_header_matches_signed_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap();
        let envelope = SigningRequest::new("POST", "/p", Some("{}".to_string()), now)
            .sign("access", "secret")
            .unwrap();

        let headers = envelope.headers();
        let date = &headers.iter().find(|(k, _)| *k == HEADER_DATE).unwrap().1;
        assert_eq!(date, "Fri, 15 Mar 2024 08:30:00 GMT");

        let expected =
            hmac_sha256_base64("secret", &canonical_string("POST", "/p", date, "{}")).unwrap();
        assert_eq!(envelope.signature, expected);
    }

    #[test]
    fn test_headers_contents() {
        let envelope = SigningRequest::with_date("POST", "/p", None, TEST_DATE.to_string())
            .sign("my-access-key", "secret")
            .unwrap();
        let headers = envelope.headers();
        assert_eq!(headers[0], (HEADER_CONTENT_TYPE, "application/json".to_string()));
        assert_eq!(headers[2], (HEADER_ALGORITHM, "hmac-sha256".to_string()));
        assert_eq!(headers[3], (HEADER_ACCESS_KEY, "my-access-key".to_string()));
        assert_eq!(headers[4].1, envelope.signature);
    }
}
