/// ビデオサマリーレポート
///
/// ディーラーごとに1行。各集計クエリは1行だけ返し、ディーラー識別行に順に重ねる。
/// 平均応答時間は受信者単位でペアリングし、全体で1つの平均にまとめる。
use async_trait::async_trait;
use futures::future::try_join;

use super::message_events::{message_events_query, round_seconds};
use super::report_definition::{fetch_sets, DirectorySource, ReportDefinition};
use crate::domain::{
    Aggregation, Column, ConsolidatedRow, DealerConnectionInfo, GroupBy, JobRequirements,
    ReportPeriod, ReportSchema, ResponseTimePairer, ResponseTimes, Scalar,
};
use crate::infrastructure::{QueryError, QueryRowSource, ReportQuery};

/// 平均応答秒の列
pub const AVG_RESPONSE_SECONDS: &str = "avgResponseSeconds";

const COLUMNS: &[Column] = &[
    Column::text("dealerName", "Dealer Name"),
    Column::text("dealerCode", "Dealer Code"),
    Column::numeric("repairOrderCount", "Repair Orders"),
    Column::numeric("appointmentCount", "Appointments"),
    Column::numeric("videosSent", "Videos Sent"),
    Column::numeric("textsSent", "Texts Sent"),
    Column::numeric("emailsSent", "Emails Sent"),
    Column::numeric("optedInCustomers", "Opted-In Customers"),
    Column::with_default(AVG_RESPONSE_SECONDS, "Avg Response Time (sec)", "N/A"),
];

/// 出力スキーマ
pub const SCHEMA: ReportSchema = ReportSchema::new(COLUMNS);

// バインド順はすべて: ディーラーコード, 開始, 終了

const REPAIR_ORDERS_SQL: &str = "SELECT \
        COUNT(DISTINCT auto_repair_order.id) AS repairOrderCount \
    FROM auto_repair_order \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_repair_order.auto_dealer_id_c \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_repair_order.deleted = 0 \
        AND auto_repair_order.service_closed_date BETWEEN ? AND ?";

const APPOINTMENTS_SQL: &str = "SELECT \
        COUNT(DISTINCT auto_appointment.id) AS appointmentCount \
    FROM auto_appointment \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_appointment.auto_dealer_id_c \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_appointment.deleted = 0 \
        AND auto_appointment.appointment_date BETWEEN ? AND ?";

const MESSAGES_SQL: &str = "SELECT \
        COUNT(DISTINCT IF(auto_event.body_type = 'Video' AND auto_event.type = 'Not-Pending', auto_event.id, NULL)) AS videosSent, \
        COUNT(DISTINCT IF(auto_event.body_type = 'Text' AND auto_event.generated_from = 'Comunicator' AND auto_event.type = 'Not-Pending', auto_event.id, NULL)) AS textsSent, \
        COUNT(DISTINCT IF(auto_event.type = 'Sent', auto_event.id, NULL)) AS emailsSent \
    FROM auto_event \
    INNER JOIN auto_repair_order ON auto_repair_order.id = auto_event.auto_repair_order_id_c \
        AND auto_repair_order.deleted = 0 \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_repair_order.auto_dealer_id_c \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_event.deleted = 0 \
        AND auto_event.sent_date BETWEEN ? AND ?";

const OPTED_IN_SQL: &str = "SELECT \
        COUNT(DISTINCT auto_recipient.id) AS optedInCustomers \
    FROM auto_recipient \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_recipient.auto_dealer_id_c \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_recipient.deleted = 0 \
        AND auto_recipient.opt_in = 1 \
        AND auto_recipient.opt_in_date BETWEEN ? AND ?";

/// ビデオサマリーレポート
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoSummaryReport;

impl VideoSummaryReport {
    /// 集計クエリ（発行順）
    pub fn queries(dealer: &DealerConnectionInfo, period: &ReportPeriod) -> Vec<ReportQuery> {
        [
            ("summary_repair_orders", REPAIR_ORDERS_SQL),
            ("summary_appointments", APPOINTMENTS_SQL),
            ("summary_messages", MESSAGES_SQL),
            ("summary_opted_in", OPTED_IN_SQL),
        ]
        .into_iter()
        .map(|(name, sql)| {
            ReportQuery::new(name, sql)
                .bind_text(dealer.internal_code.as_str())
                .bind_datetime(period.start())
                .bind_datetime(period.end())
        })
        .collect()
    }

    pub fn events_query(dealer: &DealerConnectionInfo, period: &ReportPeriod) -> ReportQuery {
        message_events_query("summary_response_events", GroupBy::Recipient, dealer, period)
    }
}

#[async_trait]
impl ReportDefinition for VideoSummaryReport {
    fn name(&self) -> &'static str {
        "video_summary"
    }

    fn title(&self) -> &'static str {
        "Video Summary Report"
    }

    fn slug(&self) -> &'static str {
        "video-summary-report"
    }

    fn key_prefix(&self) -> &'static str {
        "Video_Summary_Reports"
    }

    fn schema(&self) -> ReportSchema {
        SCHEMA
    }

    fn job_requirements(&self) -> JobRequirements {
        JobRequirements::EMAIL
    }

    fn directory_source(&self) -> DirectorySource {
        DirectorySource::IndexDatabase
    }

    async fn collect(
        &self,
        source: &dyn QueryRowSource,
        dealer: &DealerConnectionInfo,
        period: &ReportPeriod,
    ) -> Result<Vec<ConsolidatedRow>, QueryError> {
        let queries = Self::queries(dealer, period);
        let events_query = Self::events_query(dealer, period);

        let (sets, events) = try_join(
            fetch_sets(source, &queries),
            source.fetch_events(&events_query),
        )
        .await?;

        let mut row = self.identity(dealer);
        for first in sets.into_iter().filter_map(|set| set.into_iter().next()) {
            row.overlay(first);
        }

        if let ResponseTimes::Single(Some(seconds)) =
            ResponseTimePairer::new().average(&events, Aggregation::Single)
        {
            row.insert(AVG_RESPONSE_SECONDS, Scalar::Float(round_seconds(seconds)));
        }

        Ok(vec![row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::report_definition::tests::{assert_binds_match, june_2021};
    use crate::domain::dealer::tests::sample_info;
    use crate::domain::{Direction, MessageEvent, QueryRow};
    use crate::infrastructure::dealer_database::tests::MockQueryRowSource;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn at(offset_seconds: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::seconds(offset_seconds)
    }

    #[test]
    fn test_queries_bind_every_placeholder() {
        let period = june_2021();
        let queries = VideoSummaryReport::queries(&sample_info(), &period);

        assert_eq!(queries.len(), 4);
        for query in &queries {
            assert_binds_match(query);
        }
        let events = VideoSummaryReport::events_query(&sample_info(), &period);
        assert!(events.sql().contains("auto_eventa735cipient_ida AS groupKey"));
        assert_binds_match(&events);
    }

    #[tokio::test]
    async fn test_collect_builds_one_row_per_dealer() {
        let source = MockQueryRowSource::new()
            .with_rows(
                "summary_repair_orders",
                vec![QueryRow::from_pairs([("repairOrderCount", 12_i64)])],
            )
            .with_rows(
                "summary_messages",
                vec![QueryRow::from_pairs([
                    ("videosSent", 4_i64),
                    ("textsSent", 9_i64),
                    ("emailsSent", 3_i64),
                ])],
            )
            .with_events(
                "summary_response_events",
                vec![
                    MessageEvent::new("R1", at(0), Direction::Outbound, true),
                    MessageEvent::new("R1", at(100), Direction::Inbound, false),
                    MessageEvent::new("R2", at(0), Direction::Outbound, true),
                    MessageEvent::new("R2", at(201), Direction::Inbound, false),
                ],
            );

        let rows = VideoSummaryReport
            .collect(&source, &sample_info(), &june_2021())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            SCHEMA.format(&rows[0]).to_record(),
            vec!["Dealership 12345", "12345", "12", "0", "4", "9", "3", "0", "150.5"]
        );
    }

    #[tokio::test]
    async fn test_missing_response_pairs_render_not_available() {
        let source = MockQueryRowSource::new().with_events(
            "summary_response_events",
            vec![MessageEvent::new("R1", at(0), Direction::Outbound, true)],
        );

        let rows = VideoSummaryReport
            .collect(&source, &sample_info(), &june_2021())
            .await
            .unwrap();

        let record = SCHEMA.format(&rows[0]).to_record();
        assert_eq!(record.last().map(String::as_str), Some("N/A"));
    }
}
