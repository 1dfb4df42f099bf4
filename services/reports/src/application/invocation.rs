/// Lambda呼び出しのエントリーポイント
///
/// 環境変数から設定を読み、レポート種別に応じた実装を組み立ててランナーに渡す。
use serde_json::Value;
use tracing::{error, info};

use super::job_envelope::extract_job;
use super::report_definition::{DirectorySource, ReportDefinition};
use super::report_runner::{ReportError, ReportOutcome, ReportRunner};
use crate::domain::ReportJob;
use crate::infrastructure::{
    DealerDirectory, HttpWebhookNotifier, IndexDbDealerDirectory, MySqlDealerConnector,
    ReportConfig, S3ReportStore, SendGridEmailNotifier, UnotifiApiDirectory,
};

/// 1回分のLambda呼び出しを処理する
///
/// # 処理フロー
/// 1. 必要な環境変数をまとめて検証
/// 2. ペイロードからジョブを取り出す
/// 3. 資格情報の取得元に応じてランナーを組み立てて実行
pub async fn run_report(
    definition: &dyn ReportDefinition,
    payload: Value,
) -> Result<ReportOutcome, ReportError> {
    let result = run(definition, payload).await;

    match &result {
        Ok(outcome) => info!(
            report = definition.name(),
            s3_key = %outcome.body,
            row_count = outcome.row_count,
            "レポート作成完了"
        ),
        Err(e) => error!(report = definition.name(), error = %e, "レポート作成に失敗"),
    }

    result
}

async fn run(definition: &dyn ReportDefinition, payload: Value) -> Result<ReportOutcome, ReportError> {
    let config = ReportConfig::from_env(definition.config_requirements())?;
    let job = extract_job(payload)?;

    match definition.directory_source() {
        DirectorySource::IndexDatabase => {
            let directory = IndexDbDealerDirectory::new(
                config.index_db()?.clone(),
                config.dealer_connect_timeout(),
            );
            run_with(directory, &config, definition, &job).await
        }
        DirectorySource::DealerApi => {
            let directory = UnotifiApiDirectory::new(config.directory_api()?)?;
            run_with(directory, &config, definition, &job).await
        }
    }
}

async fn run_with<D>(
    directory: D,
    config: &ReportConfig,
    definition: &dyn ReportDefinition,
    job: &ReportJob,
) -> Result<ReportOutcome, ReportError>
where
    D: DealerDirectory,
{
    let store = S3ReportStore::from_config(config.bucket()?).await;
    let connector = MySqlDealerConnector::new(config.dealer_connect_timeout());
    let webhook = HttpWebhookNotifier::new()?;
    let email = config
        .email()
        .cloned()
        .map(SendGridEmailNotifier::new)
        .transpose()?;

    let runner = ReportRunner::new(
        directory,
        connector,
        store,
        webhook,
        email,
        config.failure_policy(),
        config.link_expiry(),
    );

    runner.run(definition, job).await
}
