/// ビデオサマリーレポート Lambda
///
/// 直接呼び出し。ダウンロードリンクをemailRecipientsへメール送信する。
use lambda_runtime::{service_fn, Error, LambdaEvent};
use reports::application::{run_report, VideoSummaryReport};
use reports::infrastructure::init_logging;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    let func = service_fn(handler);
    lambda_runtime::run(func).await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
///
/// 失敗はエラーとして返し、Lambdaランタイムに失敗を報告させる。
async fn handler(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let outcome = run_report(&VideoSummaryReport, event.payload).await?;
    Ok(serde_json::to_value(outcome)?)
}
