// アプリケーション層モジュール
pub mod invocation;
pub mod job_envelope;
pub mod message_events;
pub mod recall_bdc_report;
pub mod recall_roi_report;
pub mod report_definition;
pub mod report_runner;
pub mod video_report;
pub mod video_summary_report;

// 再エクスポート
pub use invocation::run_report;
pub use job_envelope::extract_job;
pub use message_events::message_events_query;
pub use recall_bdc_report::RecallBdcReport;
pub use recall_roi_report::RecallRoiReport;
pub use report_definition::{DirectorySource, ReportDefinition};
pub use report_runner::{ReportError, ReportOutcome, ReportRunner, STATUS_CREATED};
pub use video_report::VideoReport;
pub use video_summary_report::VideoSummaryReport;
