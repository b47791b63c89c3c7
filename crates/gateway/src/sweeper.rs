//! # 期限切れファイルのスイープ
//!
//! バックグラウンドで定期的に `purge_expired` を呼ぶ。
//! 初回は起動直後に実行するため、停止中に期限を迎えたファイルも回収される。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;

use crate::storage::FileStore;

/// 期限切れファイルの削除ワーカー。
pub struct ExpirySweeper {
    store: Arc<dyn FileStore>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn FileStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// バックグラウンドタスクとして起動する。
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(&self) {
        let mut timer = interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "期限切れスイープを開始します"
        );

        // 最初のtickは即座に発火する
        loop {
            timer.tick().await;
            self.sweep_once().await;
        }
    }

    /// 1回分のスイープ。削除件数を返す。失敗はログのみ。
    pub async fn sweep_once(&self) -> usize {
        match self.store.purge_expired(Utc::now()).await {
            Ok(removed) => {
                if !removed.is_empty() {
                    tracing::info!(
                        removed = removed.len(),
                        "期限切れファイルを削除しました"
                    );
                }
                removed.len()
            }
            Err(e) => {
                tracing::error!(error = %e, "期限切れスイープに失敗しました");
                0
            }
        }
    }
}
