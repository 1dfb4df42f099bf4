// レポートジョブ
//
// 呼び出し元から渡されるジョブペイロードと、その検証結果。
// 検証は最初に見つかった不備で失敗し、エラーメッセージはフィールド名を含む。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::dealer::{DealerId, InvalidDealerId};
use super::report_period::{PeriodError, ReportPeriod};

/// ジョブ検証のエラー型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobValidationError {
    #[error("Please provide at least one dealer identifier (dealerIDs or dealershipIntegralinkCodes)")]
    MissingDealerIds,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    InvalidDealerId(#[from] InvalidDealerId),

    #[error(transparent)]
    InvalidPeriod(#[from] PeriodError),

    #[error("replyTo must be an absolute http(s) URL, got: {0}")]
    InvalidReplyTo(String),

    #[error("emailRecipients contains an invalid address: {0}")]
    InvalidEmail(String),

    #[error("Please provide at least one entry in emailRecipients")]
    MissingEmailRecipients,
}

/// ジョブのメタデータ（自由形式）
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    /// メール件名に使うディーラーグループ名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealer_group_name: Option<String>,

    /// その他の任意フィールド
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// 呼び出し元から受け取るジョブペイロード（未検証）
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportJob {
    #[serde(rename = "dealerIDs", default, skip_serializing_if = "Option::is_none")]
    pub dealer_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealership_integralink_codes: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_recipients: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
}

/// レポート種別ごとの必須項目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRequirements {
    /// replyTo（Webhookコールバック先）が必須か
    pub reply_to: bool,
    /// emailRecipientsが1件以上必須か
    pub email_recipients: bool,
}

impl JobRequirements {
    /// リコール系レポート: 完了をreplyToへ通知する
    pub const CALLBACK: Self = Self {
        reply_to: true,
        email_recipients: false,
    };

    /// ビデオ系レポート: ダウンロードリンクをメールで送る
    pub const EMAIL: Self = Self {
        reply_to: false,
        email_recipients: true,
    };
}

/// 検証済みのジョブ
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJob {
    pub dealer_ids: Vec<DealerId>,
    pub period: ReportPeriod,
    pub email_recipients: Vec<String>,
    pub reply_to: Option<Url>,
    pub dealer_group_name: Option<String>,
}

impl ReportJob {
    /// JSON値からジョブを読み込む
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// ジョブを検証する
    ///
    /// # 検証順序
    /// 1. ディーラー識別子（1件以上、許可文字のみ）
    /// 2. startDate / endDate（存在、形式、start <= end）
    /// 3. replyTo（指定時はhttp/httpsの絶対URL）
    /// 4. emailRecipients（各要素に`@`を含む）
    /// 5. レポート種別ごとの必須項目
    pub fn validate(&self, requirements: JobRequirements) -> Result<ValidatedJob, JobValidationError> {
        let dealer_ids = self.collect_dealer_ids()?;

        let start = non_blank(self.start_date.as_deref()).ok_or(JobValidationError::MissingField("startDate"))?;
        let end = non_blank(self.end_date.as_deref()).ok_or(JobValidationError::MissingField("endDate"))?;
        let period = ReportPeriod::parse(start, end)?;

        let reply_to = match non_blank(self.reply_to.as_deref()) {
            Some(raw) => Some(parse_reply_to(raw)?),
            None => None,
        };

        let email_recipients: Vec<String> = self
            .email_recipients
            .iter()
            .flatten()
            .map(|address| address.trim())
            .filter(|address| !address.is_empty())
            .map(|address| {
                if address.contains('@') {
                    Ok(address.to_string())
                } else {
                    Err(JobValidationError::InvalidEmail(address.to_string()))
                }
            })
            .collect::<Result<_, _>>()?;

        if requirements.reply_to && reply_to.is_none() {
            return Err(JobValidationError::MissingField("replyTo"));
        }
        if requirements.email_recipients && email_recipients.is_empty() {
            return Err(JobValidationError::MissingEmailRecipients);
        }

        let dealer_group_name = self
            .metadata
            .as_ref()
            .and_then(|metadata| non_blank(metadata.dealer_group_name.as_deref()))
            .map(str::to_string);

        Ok(ValidatedJob {
            dealer_ids,
            period,
            email_recipients,
            reply_to,
            dealer_group_name,
        })
    }

    /// dealerIDsとdealershipIntegralinkCodesを順序を保って結合し、重複を除く
    fn collect_dealer_ids(&self) -> Result<Vec<DealerId>, JobValidationError> {
        let mut dealer_ids: Vec<DealerId> = Vec::new();

        let raw_ids = self
            .dealer_ids
            .iter()
            .flatten()
            .chain(self.dealership_integralink_codes.iter().flatten());

        for raw in raw_ids {
            let dealer_id = DealerId::parse(raw)?;
            if !dealer_ids.contains(&dealer_id) {
                dealer_ids.push(dealer_id);
            }
        }

        if dealer_ids.is_empty() {
            return Err(JobValidationError::MissingDealerIds);
        }
        Ok(dealer_ids)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_reply_to(raw: &str) -> Result<Url, JobValidationError> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
        _ => Err(JobValidationError::InvalidReplyTo(raw.to_string())),
    }
}
