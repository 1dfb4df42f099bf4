/// レポート実行
///
/// 1回の呼び出しで、ジョブ検証 → 資格情報の解決 → ディーラーごとの集計 →
/// CSV出力 → アップロード → 通知 を順に行う。
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use super::report_definition::ReportDefinition;
use crate::domain::{
    generate_object_key, random_suffix, ConsolidatedRow, DealerConnectionInfo, DealerFailurePolicy,
    JobValidationError, ReportJob, ReportPeriod, ValidatedJob,
};
use crate::infrastructure::{
    encode_csv, with_dealer_source, CompletionNotice, ConfigError, DealerConnector,
    DealerDirectory, DirectoryError, EmailMessage, EmailNotifier, EncodeError, NotifyError,
    QueryError, ReportStore, StorageError, WebhookNotifier, CSV_CONTENT_TYPE, CSV_EXTENSION,
    MAX_LINK_EXPIRY,
};

/// 成功時のステータスコード
pub const STATUS_CREATED: u16 = 201;

/// レポート実行のエラー型
#[derive(Debug, Error)]
pub enum ReportError {
    /// 設定エラー
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// ペイロードがJSONとして読めない
    #[error("Invalid job payload: {0}")]
    Payload(String),

    /// ジョブ検証エラー
    #[error(transparent)]
    InvalidJob(#[from] JobValidationError),

    /// ディーラー資格情報の取得に失敗
    #[error("Dealer credential lookup failed: {0}")]
    CredentialLookup(#[from] DirectoryError),

    /// ディーラーの集計に失敗（abortポリシー時のみ）
    #[error("Report queries failed for dealer {dealer_code}: {source}")]
    DealerQuery {
        dealer_code: String,
        source: QueryError,
    },

    /// CSV出力に失敗
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// アップロードまたはリンク生成に失敗
    #[error(transparent)]
    Upload(#[from] StorageError),

    /// 通知に失敗
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// ハンドラーの戻り値
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub status_code: u16,
    /// アップロードしたオブジェクトキー
    pub body: String,
    pub row_count: usize,
}

/// レポートを実行するランナー
pub struct ReportRunner<D, C, S, W, E>
where
    D: DealerDirectory,
    C: DealerConnector,
    S: ReportStore,
    W: WebhookNotifier,
    E: EmailNotifier,
{
    directory: D,
    connector: C,
    store: S,
    webhook: W,
    /// メール設定がないLambdaではNone
    email: Option<E>,
    failure_policy: DealerFailurePolicy,
    link_expiry: Duration,
}

impl<D, C, S, W, E> ReportRunner<D, C, S, W, E>
where
    D: DealerDirectory,
    C: DealerConnector,
    S: ReportStore,
    W: WebhookNotifier,
    E: EmailNotifier,
{
    pub fn new(
        directory: D,
        connector: C,
        store: S,
        webhook: W,
        email: Option<E>,
        failure_policy: DealerFailurePolicy,
        link_expiry: Duration,
    ) -> Self {
        Self {
            directory,
            connector,
            store,
            webhook,
            email,
            failure_policy,
            link_expiry,
        }
    }

    /// 1回分のレポートを実行する
    ///
    /// # 処理フロー
    /// 1. ジョブを検証（I/Oの前）
    /// 2. ディーラーの接続情報を解決
    /// 3. ディーラーごとに集計（同時実行、結果はディーラー指定順）
    /// 4. スキーマで整形してCSVを作成し、アップロード
    /// 5. replyToがあればWebhook、宛先があればメールで通知
    pub async fn run(
        &self,
        definition: &dyn ReportDefinition,
        job: &ReportJob,
    ) -> Result<ReportOutcome, ReportError> {
        let job = job.validate(definition.job_requirements())?;

        info!(
            report = definition.name(),
            dealer_count = job.dealer_ids.len(),
            start = %job.period.start_sql(),
            end = %job.period.end_sql(),
            "レポート作成開始"
        );

        let dealers = self.directory.resolve(&job.dealer_ids).await?;
        let rows = self.collect_all(definition, &dealers, &job.period).await?;

        let schema = definition.schema();
        let report_rows = schema.format_all(&rows);
        let body = encode_csv(&schema, &report_rows)?;

        let key = generate_object_key(
            definition.key_prefix(),
            definition.slug(),
            CSV_EXTENSION,
            Utc::now(),
            random_suffix(),
        );
        self.store.put(&key, body, CSV_CONTENT_TYPE).await?;

        info!(
            report = definition.name(),
            s3_key = %key,
            row_count = report_rows.len(),
            "レポートをアップロード"
        );

        self.deliver(definition, &job, &key).await?;

        Ok(ReportOutcome {
            status_code: STATUS_CREATED,
            body: key,
            row_count: report_rows.len(),
        })
    }

    /// 全ディーラーを同時に集計し、失敗ポリシーを適用する
    async fn collect_all(
        &self,
        definition: &dyn ReportDefinition,
        dealers: &[DealerConnectionInfo],
        period: &ReportPeriod,
    ) -> Result<Vec<ConsolidatedRow>, ReportError> {
        let results = join_all(
            dealers
                .iter()
                .map(|dealer| self.collect_dealer(definition, dealer, period)),
        )
        .await;

        let mut rows = Vec::new();
        for (dealer, result) in dealers.iter().zip(results) {
            match result {
                Ok(dealer_rows) => rows.extend(dealer_rows),
                Err(source) => {
                    error!(
                        report = definition.name(),
                        dealer_code = %dealer.internal_code,
                        policy = %self.failure_policy,
                        error = %source,
                        "ディーラーの集計に失敗"
                    );
                    match self.failure_policy {
                        DealerFailurePolicy::Zeroed => rows.push(definition.identity(dealer)),
                        DealerFailurePolicy::Omit => {}
                        DealerFailurePolicy::Abort => {
                            return Err(ReportError::DealerQuery {
                                dealer_code: dealer.internal_code.clone(),
                                source,
                            });
                        }
                    }
                }
            }
        }

        Ok(rows)
    }

    /// 1ディーラー分の集計（接続は必ずクローズする）
    async fn collect_dealer(
        &self,
        definition: &dyn ReportDefinition,
        dealer: &DealerConnectionInfo,
        period: &ReportPeriod,
    ) -> Result<Vec<ConsolidatedRow>, QueryError> {
        let span = info_span!("dealer_report", dealer_code = %dealer.internal_code);

        async move {
            let rows = with_dealer_source(&self.connector, dealer, |source| async move {
                definition.collect(source.as_ref(), dealer, period).await
            })
            .await?;

            info!(row_count = rows.len(), "ディーラーの集計完了");
            Ok(rows)
        }
        .instrument(span)
        .await
    }

    /// アップロード後の通知（Webhook → メールの順）
    async fn deliver(
        &self,
        definition: &dyn ReportDefinition,
        job: &ValidatedJob,
        key: &str,
    ) -> Result<(), ReportError> {
        if let Some(reply_to) = &job.reply_to {
            let notice = CompletionNotice::completed(self.store.bucket(), key);
            self.webhook.notify(reply_to, &notice).await?;
            info!(reply_to = %reply_to, s3_key = %key, "完了を通知");
        }

        if job.email_recipients.is_empty() {
            return Ok(());
        }

        let Some(email) = &self.email else {
            warn!(
                recipient_count = job.email_recipients.len(),
                "メール設定がないため送信をスキップ"
            );
            return Ok(());
        };

        let link = self.store.download_link(key, self.link_expiry).await?;
        let message = build_email(
            definition.title(),
            job,
            &link,
            self.link_expiry.min(MAX_LINK_EXPIRY),
        );
        email.send(&message).await?;

        info!(
            recipient_count = message.recipients.len(),
            s3_key = %key,
            "ダウンロードリンクをメール送信"
        );

        Ok(())
    }
}

/// ダウンロードリンクのメールを組み立てる
fn build_email(title: &str, job: &ValidatedJob, link: &str, expiry: Duration) -> EmailMessage {
    let range = job.period.display_range();
    let subject = match &job.dealer_group_name {
        Some(group) => format!("{} - {} ({})", title, group, range),
        None => format!("{} ({})", title, range),
    };
    let body = format!(
        "Your {} for {} is ready.\n\nDownload: {}\n\nThis link expires in {}.",
        title,
        range,
        link,
        describe_expiry(expiry)
    );

    EmailMessage {
        recipients: job.email_recipients.clone(),
        subject,
        body,
    }
}

/// 有効期限を読みやすい単位で表す（割り切れる最大の単位を使う）
fn describe_expiry(expiry: Duration) -> String {
    let seconds = expiry.as_secs();
    let (count, unit) = match seconds {
        s if s >= 86_400 && s % 86_400 == 0 => (s / 86_400, "day"),
        s if s >= 3_600 && s % 3_600 == 0 => (s / 3_600, "hour"),
        s if s >= 60 && s % 60 == 0 => (s / 60, "minute"),
        s => (s, "second"),
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{} {}{}", count, unit, plural)
}
