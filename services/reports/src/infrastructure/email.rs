//! メール通知
//!
//! SendGrid v3 `mail/send`でレポートのダウンロードリンクを受信者に送る。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use super::config::EmailSettings;
use super::webhook::NotifyError;

/// SendGridの送信エンドポイント
const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// リクエスト全体のタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 送信するメール
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// メール送信の抽象（テスト用）
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct SendGridPersonalization<'a> {
    to: Vec<SendGridAddress<'a>>,
}

#[derive(Debug, Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

/// `mail/send`のリクエストボディ
#[derive(Debug, Serialize)]
struct SendGridRequest<'a> {
    personalizations: Vec<SendGridPersonalization<'a>>,
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: Vec<SendGridContent<'a>>,
}

impl<'a> SendGridRequest<'a> {
    fn new(from: &'a str, message: &'a EmailMessage) -> Self {
        Self {
            personalizations: vec![SendGridPersonalization {
                to: message
                    .recipients
                    .iter()
                    .map(|email| SendGridAddress { email })
                    .collect(),
            }],
            from: SendGridAddress { email: from },
            subject: &message.subject,
            content: vec![SendGridContent {
                content_type: "text/plain",
                value: &message.body,
            }],
        }
    }
}

/// SendGridによるメール送信実装
#[derive(Clone)]
pub struct SendGridEmailNotifier {
    client: Client,
    settings: EmailSettings,
}

impl std::fmt::Debug for SendGridEmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridEmailNotifier")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SendGridEmailNotifier {
    pub fn new(settings: EmailSettings) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;

        Ok(Self { client, settings })
    }
}

#[async_trait]
impl EmailNotifier for SendGridEmailNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let request = SendGridRequest::new(&self.settings.from, message);

        let response = self
            .client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "SendGridへのリクエストに失敗");
                NotifyError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "SendGridがエラーを返却");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            recipient_count = message.recipients.len(),
            subject = %message.subject,
            "レポートメールを送信"
        );
        Ok(())
    }
}
