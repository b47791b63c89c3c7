//! # Watermark Relay CLI
//!
//! 外部ウォーターマークサービスをコマンドラインから呼び出す。
//! 結果は整形済みJSONで標準出力に、ログは標準エラー出力に出す。
//!
//! ## サブコマンド
//! - `create-task` — ウォーターマーク付与タスク作成
//! - `query-task` — タスク状態照会
//! - `extract-task` — ウォーターマーク抽出タスク作成
//! - `health` — 疎通確認
//! - `sign` — 署名のみ計算（通信なし）

use std::time::Duration;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use watermark_client::config::{DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES};
use watermark_client::{WatermarkClient, WatermarkConfig};
use watermark_crypto::{http_date, SigningRequest};

#[derive(Parser)]
#[command(name = "watermark-cli")]
#[command(about = "Watermark Relay CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// 外部サービスへの接続設定
#[derive(Args, Debug, Clone)]
struct ConnectionArgs {
    #[arg(long, env = "WATERMARK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "WATERMARK_ACCESS_KEY", hide_env_values = true)]
    access_key: String,

    #[arg(long, env = "WATERMARK_SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    /// 1回の試行のタイムアウト（秒）
    #[arg(long, env = "WATERMARK_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// 最大試行回数
    #[arg(long, env = "WATERMARK_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
}

impl ConnectionArgs {
    fn into_config(self) -> WatermarkConfig {
        let mut config = WatermarkConfig::new(self.base_url, self.access_key, self.secret_key);
        config.timeout = Duration::from_secs(self.timeout_secs);
        config.max_retries = self.max_retries;
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// ウォーターマーク付与タスクを作成する
    CreateTask {
        #[command(flatten)]
        conn: ConnectionArgs,
        /// 対象ファイルの公開URL
        #[arg(long)]
        file_url: String,
        /// ウォーターマーク文字列
        #[arg(long)]
        content: String,
        /// 業務ID
        #[arg(long)]
        biz_id: String,
    },
    /// タスク状態を照会する
    QueryTask {
        #[command(flatten)]
        conn: ConnectionArgs,
        task_id: String,
    },
    /// ウォーターマーク抽出タスクを作成する
    ExtractTask {
        #[command(flatten)]
        conn: ConnectionArgs,
        #[arg(long)]
        file_url: String,
        #[arg(long)]
        biz_id: String,
    },
    /// 外部サービスへの疎通を確認する
    Health {
        #[arg(long, env = "WATERMARK_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },
    /// 署名を計算して表示する（通信しない）
    Sign {
        #[arg(long, default_value = "POST")]
        method: String,
        /// エンドポイントパス（例: /dlp/file_process/add_watermark_task）
        #[arg(long)]
        path: String,
        /// HTTP-date。省略時は現在時刻
        #[arg(long)]
        date: Option<String>,
        /// シリアライズ済みJSONボディ
        #[arg(long)]
        body: Option<String>,
        #[arg(long, env = "WATERMARK_ACCESS_KEY", default_value = "", hide_env_values = true)]
        access_key: String,
        #[arg(long, env = "WATERMARK_SECRET_KEY", hide_env_values = true)]
        secret_key: String,
    },
}

/// `sign` サブコマンドの出力。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignOutput {
    string_to_sign: String,
    signature: String,
    headers: serde_json::Map<String, serde_json::Value>,
}

fn sign_offline(
    method: &str,
    path: &str,
    date: Option<String>,
    body: Option<String>,
    access_key: &str,
    secret_key: &str,
) -> anyhow::Result<SignOutput> {
    let date = date.unwrap_or_else(|| http_date(Utc::now()));
    let request = SigningRequest::with_date(method, path, body, date);
    let string_to_sign = request.canonical_string();
    let envelope = request.sign(access_key, secret_key)?;

    let headers = envelope
        .headers()
        .into_iter()
        .map(|(name, value)| (name.to_string(), serde_json::Value::String(value)))
        .collect();

    Ok(SignOutput {
        string_to_sign,
        signature: envelope.signature,
        headers,
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::CreateTask {
            conn,
            file_url,
            content,
            biz_id,
        } => {
            let client = WatermarkClient::new(conn.into_config())?;
            let task = client
                .create_watermark_task(&file_url, &content, &biz_id)
                .await?;
            if let Some(task_id) = task.task_id() {
                tracing::info!(task_id, "タスクを作成しました");
            }
            print_json(&task)
        }
        Commands::QueryTask { conn, task_id } => {
            let client = WatermarkClient::new(conn.into_config())?;
            let task = client.query_task_status(&task_id).await?;
            print_json(&task)
        }
        Commands::ExtractTask {
            conn,
            file_url,
            biz_id,
        } => {
            let client = WatermarkClient::new(conn.into_config())?;
            let task = client
                .create_extract_watermark_task(&file_url, &biz_id)
                .await?;
            print_json(&task)
        }
        Commands::Health { base_url } => {
            // 疎通確認は署名しないため、鍵はダミーで構わない
            let client = WatermarkClient::new(WatermarkConfig::new(base_url, "-", "-"))?;
            print_json(&client.health_check().await)
        }
        Commands::Sign {
            method,
            path,
            date,
            body,
            access_key,
            secret_key,
        } => print_json(&sign_offline(
            &method,
            &path,
            date,
            body,
            &access_key,
            &secret_key,
        )?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli.command).await
}
