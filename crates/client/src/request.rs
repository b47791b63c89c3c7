//! # 署名付きリクエストの送信
//!
//! 1回分の試行。署名を付与して送信し、レスポンスをJSONとして解釈する。

use chrono::Utc;
use reqwest::Method;
use watermark_crypto::SigningRequest;

use crate::config::WatermarkConfig;
use crate::error::ClientError;

/// レスポンス本文をJSONとして解釈する。
/// JSONでない場合は失敗とせず `{"rawResponse": 本文}` で包む。
pub fn parse_response_body(text: &str) -> serde_json::Value {
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "レスポンスが有効なJSONではありません");
            serde_json::json!({ "rawResponse": text })
        }
    }
}

/// 署名付きリクエストを1回送信する。
///
/// `body` はシリアライズ済みのJSON文字列。署名対象と送信ボディは同一のバイト列になる。
pub(crate) async fn send_signed(
    http: &reqwest::Client,
    config: &WatermarkConfig,
    method: Method,
    endpoint_path: &str,
    body: Option<String>,
) -> Result<serde_json::Value, ClientError> {
    let envelope = SigningRequest::new(method.as_str(), endpoint_path, body, Utc::now())
        .sign(&config.access_key, &config.secret_key)?;

    let url = format!("{}{}", config.base_url, endpoint_path);
    tracing::info!(%method, %url, "APIリクエストを送信します");

    let mut builder = http.request(method, &url).timeout(config.timeout);
    for (name, value) in envelope.headers() {
        builder = builder.header(name, value);
    }
    if !envelope.request.body.is_empty() {
        builder = builder.body(envelope.request.body);
    }

    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            ClientError::Timeout(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    let response_body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            ClientError::Timeout(e.to_string())
        } else {
            ClientError::ReadBody(e.to_string())
        }
    })?;

    tracing::info!(status = status.as_u16(), %url, "APIレスポンスを受信しました");
    tracing::debug!(body = %response_body, "APIレスポンス本文");

    let data = parse_response_body(&response_body);

    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: response_body,
        });
    }

    Ok(data)
}
