//! 完了通知Webhook
//!
//! アップロード完了後、ジョブの`replyTo`に保存先をPUTで通知する。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

/// リクエスト全体のタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 通知のエラー型（Webhook・メール共通）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    /// HTTPクライアントの構築に失敗
    #[error("HTTPクライアントの構築に失敗: {0}")]
    Client(String),

    /// リクエスト送信に失敗
    #[error("通知リクエストの送信に失敗: {0}")]
    Request(String),

    /// 通知先がエラーを返却
    #[error("通知先がエラーを返却: status={status}, body={body}")]
    Rejected { status: u16, body: String },
}

/// 完了通知のペイロード
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionNotice {
    pub status: &'static str,
    pub csv_s3_bucket: String,
    pub csv_s3_key: String,
}

impl CompletionNotice {
    pub fn completed(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            status: "completed",
            csv_s3_bucket: bucket.into(),
            csv_s3_key: key.into(),
        }
    }
}

/// 完了通知の抽象（テスト用）
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn notify(&self, reply_to: &Url, notice: &CompletionNotice) -> Result<(), NotifyError>;
}

/// reqwestによるWebhook通知実装
#[derive(Debug, Clone)]
pub struct HttpWebhookNotifier {
    client: Client,
}

impl HttpWebhookNotifier {
    pub fn new() -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn notify(&self, reply_to: &Url, notice: &CompletionNotice) -> Result<(), NotifyError> {
        let response = self
            .client
            .put(reply_to.clone())
            .json(notice)
            .send()
            .await
            .map_err(|e| {
                error!(reply_to = %reply_to, error = %e, "Webhook送信に失敗");
                NotifyError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(reply_to = %reply_to, status = %status, "Webhookがエラーを返却");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(reply_to = %reply_to, s3_key = %notice.csv_s3_key, "完了通知を送信");
        Ok(())
    }
}
