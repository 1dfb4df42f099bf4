/// ジョブペイロードの取り出し
///
/// SQSトリガー（`Records[0].body`がジョブJSON文字列）と、
/// 直接呼び出し（ペイロードがジョブそのもの）の両方を受け付ける。
use aws_lambda_events::event::sqs::SqsEvent;
use serde_json::Value;
use tracing::{debug, warn};

use super::report_runner::ReportError;
use crate::domain::ReportJob;

/// SQSイベントを示すキー
const RECORDS_KEY: &str = "Records";

/// Lambdaペイロードからジョブを取り出す
pub fn extract_job(payload: Value) -> Result<ReportJob, ReportError> {
    if payload.get(RECORDS_KEY).is_none() {
        debug!("直接呼び出しのペイロードとして解析");
        return ReportJob::from_value(payload).map_err(|e| ReportError::Payload(e.to_string()));
    }

    let event: SqsEvent =
        serde_json::from_value(payload).map_err(|e| ReportError::Payload(e.to_string()))?;

    if event.records.len() > 1 {
        warn!(
            record_count = event.records.len(),
            "SQSレコードが複数あるため先頭のみ処理"
        );
    }

    let body = event
        .records
        .into_iter()
        .next()
        .and_then(|record| record.body)
        .ok_or_else(|| ReportError::Payload("SQS event has no record body".to_string()))?;

    serde_json::from_str(&body).map_err(|e| ReportError::Payload(e.to_string()))
}
