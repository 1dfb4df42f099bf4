// Domain layer modules
pub mod consolidator;
pub mod dealer;
pub mod failure_policy;
pub mod object_key;
pub mod query_row;
pub mod report_job;
pub mod report_period;
pub mod report_schema;
pub mod response_time;

// Re-exports
pub use consolidator::{consolidate, ConstantPolicy, JoinKey, ResultConsolidator};
pub use dealer::{DealerConnectionInfo, DealerId, InvalidDealerId};
pub use failure_policy::{DealerFailurePolicy, UnknownFailurePolicy};
pub use object_key::{generate_object_key, random_suffix};
pub use query_row::{ConsolidatedRow, QueryRow, Scalar};
pub use report_job::{JobMetadata, JobRequirements, JobValidationError, ReportJob, ValidatedJob};
pub use report_period::{PeriodError, ReportPeriod};
pub use report_schema::{Column, ColumnDefault, ReportRow, ReportSchema};
pub use response_time::{
    Aggregation, Direction, GroupBy, MessageEvent, ResponsePair, ResponseTimePairer, ResponseTimes,
    MAX_RESPONSE_SECONDS,
};
