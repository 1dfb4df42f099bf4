/// ビデオレポート
///
/// 期間内にクローズしたRO単位で、ビデオ・テキストの送受信数と平均応答時間を出力する。
use async_trait::async_trait;
use futures::future::try_join;

use super::message_events::{message_events_query, round_seconds};
use super::report_definition::{fetch_sets, DirectorySource, ReportDefinition};
use crate::domain::{
    Aggregation, Column, ConsolidatedRow, DealerConnectionInfo, GroupBy, JobRequirements, QueryRow,
    ReportPeriod, ReportSchema, ResponseTimePairer, ResponseTimes, ResultConsolidator, Scalar,
};
use crate::infrastructure::{QueryError, QueryRowSource, ReportQuery};

/// 結合キー
pub const JOIN_KEY: &str = "roId";

/// 平均応答秒の列
pub const AVG_RESPONSE_SECONDS: &str = "avgResponseSeconds";

const COLUMNS: &[Column] = &[
    Column::text("dealerName", "Dealer Name"),
    Column::text("dealerCode", "Dealer Code"),
    Column::text("roNumber", "RO Number"),
    Column::text("advisor", "Advisor"),
    Column::numeric("videosSent", "Videos Sent"),
    Column::numeric("videosViewed", "Videos Viewed"),
    Column::numeric("textsSent", "Texts Sent"),
    Column::numeric("textsReceived", "Texts Received"),
    Column::with_default(AVG_RESPONSE_SECONDS, "Avg Response Time (sec)", "N/A"),
];

/// 出力スキーマ
pub const SCHEMA: ReportSchema = ReportSchema::new(COLUMNS);

/// 期間内にクローズしたRO
///
/// バインド順（以下共通）: ディーラーコード, 開始, 終了
const REPAIR_ORDERS_SQL: &str = "SELECT \
        auto_repair_order.id AS roId, \
        auto_repair_order.name AS roNumber, \
        auto_repair_order.service_advisor AS advisor \
    FROM auto_repair_order \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_repair_order.auto_dealer_id_c \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_repair_order.deleted = 0 \
        AND auto_repair_order.service_closed_date BETWEEN ? AND ? \
    ORDER BY auto_repair_order.name";

/// RO別のビデオ送信・視聴数
const VIDEOS_SQL: &str = "SELECT \
        auto_repair_order.id AS roId, \
        COUNT(DISTINCT IF(auto_event.type = 'Not-Pending', auto_event.id, NULL)) AS videosSent, \
        COUNT(DISTINCT IF(auto_event.video_viewed = 1, auto_event.id, NULL)) AS videosViewed \
    FROM auto_repair_order \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_repair_order.auto_dealer_id_c \
    INNER JOIN auto_event ON auto_event.auto_repair_order_id_c = auto_repair_order.id \
        AND auto_event.deleted = 0 \
        AND auto_event.body_type = 'Video' \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_repair_order.deleted = 0 \
        AND auto_repair_order.service_closed_date BETWEEN ? AND ? \
    GROUP BY auto_repair_order.id";

/// RO別のテキスト送受信数
const TEXTS_SQL: &str = "SELECT \
        auto_repair_order.id AS roId, \
        COUNT(DISTINCT IF(auto_event.generated_from = 'Comunicator' AND auto_event.type = 'Not-Pending', auto_event.id, NULL)) AS textsSent, \
        COUNT(DISTINCT IF(auto_event.generated_from = 'Reply' AND auto_event.type = 'Reply', auto_event.id, NULL)) AS textsReceived \
    FROM auto_repair_order \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_repair_order.auto_dealer_id_c \
    INNER JOIN auto_event ON auto_event.auto_repair_order_id_c = auto_repair_order.id \
        AND auto_event.deleted = 0 \
        AND auto_event.body_type = 'Text' \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_repair_order.deleted = 0 \
        AND auto_repair_order.service_closed_date BETWEEN ? AND ? \
    GROUP BY auto_repair_order.id";

/// ビデオレポート
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoReport;

impl VideoReport {
    /// 集計クエリ（発行順）
    pub fn queries(dealer: &DealerConnectionInfo, period: &ReportPeriod) -> Vec<ReportQuery> {
        [
            ("video_repair_orders", REPAIR_ORDERS_SQL),
            ("video_messages", VIDEOS_SQL),
            ("video_texts", TEXTS_SQL),
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
        message_events_query("video_response_events", GroupBy::RepairOrder, dealer, period)
    }
}

#[async_trait]
impl ReportDefinition for VideoReport {
    fn name(&self) -> &'static str {
        "video"
    }

    fn title(&self) -> &'static str {
        "Video Report"
    }

    fn slug(&self) -> &'static str {
        "video-report"
    }

    fn key_prefix(&self) -> &'static str {
        "Video_Reports"
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

        let mut consolidator = ResultConsolidator::new(JOIN_KEY)
            .with_constant("dealerName", dealer.dealer_name.as_str())
            .with_constant("dealerCode", dealer.internal_code.as_str());
        for set in sets {
            consolidator.merge_set(set);
        }

        if let ResponseTimes::PerGroup(averages) =
            ResponseTimePairer::new().average(&events, Aggregation::PerGroup)
        {
            consolidator.merge_set(averages.into_iter().map(|(ro_id, seconds)| {
                QueryRow::from_pairs([
                    (JOIN_KEY, Scalar::Text(ro_id)),
                    (AVG_RESPONSE_SECONDS, Scalar::Float(round_seconds(seconds))),
                ])
            }));
        }

        Ok(consolidator.into_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::report_definition::tests::{assert_binds_match, june_2021};
    use crate::domain::dealer::tests::sample_info;
    use crate::domain::{Direction, MessageEvent};
    use crate::infrastructure::dealer_database::tests::MockQueryRowSource;
    use chrono::{Duration, NaiveDate};

    fn ro(id: &str, number: &str) -> QueryRow {
        QueryRow::from_pairs([
            (JOIN_KEY, Scalar::text(id)),
            ("roNumber", Scalar::text(number)),
            ("advisor", Scalar::text("Sam")),
        ])
    }

    fn events() -> Vec<MessageEvent> {
        let t0 = NaiveDate::from_ymd_opt(2021, 6, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        vec![
            MessageEvent::new("RO1", t0, Direction::Outbound, true),
            MessageEvent::new("RO1", t0 + Duration::seconds(300), Direction::Inbound, false),
            MessageEvent::new("RO1", t0 + Duration::seconds(400), Direction::Outbound, true),
            MessageEvent::new("RO1", t0 + Duration::seconds(90_000), Direction::Inbound, false),
        ]
    }

    #[test]
    fn test_queries_bind_every_placeholder() {
        let period = june_2021();
        for query in VideoReport::queries(&sample_info(), &period) {
            assert_binds_match(&query);
        }
        assert_binds_match(&VideoReport::events_query(&sample_info(), &period));
    }

    #[tokio::test]
    async fn test_collect_merges_average_response_time() {
        let source = MockQueryRowSource::new()
            .with_rows("video_repair_orders", vec![ro("RO1", "1001"), ro("RO2", "1002")])
            .with_rows(
                "video_texts",
                vec![QueryRow::from_pairs([
                    (JOIN_KEY, Scalar::text("RO1")),
                    ("textsSent", Scalar::Int(2)),
                    ("textsReceived", Scalar::Int(2)),
                ])],
            )
            .with_events("video_response_events", events());

        let rows = VideoReport
            .collect(&source, &sample_info(), &june_2021())
            .await
            .unwrap();
        let formatted = SCHEMA.format_all(&rows);

        assert_eq!(
            formatted[0].to_record(),
            vec!["Dealership 12345", "12345", "1001", "Sam", "0", "0", "2", "2", "300"]
        );
        assert_eq!(
            formatted[1].to_record(),
            vec!["Dealership 12345", "12345", "1002", "Sam", "0", "0", "0", "0", "N/A"]
        );
    }

    #[tokio::test]
    async fn test_events_failure_fails_dealer() {
        let source = MockQueryRowSource::new()
            .with_error("video_response_events", QueryError::Closed);

        let result = VideoReport
            .collect(&source, &sample_info(), &june_2021())
            .await;

        assert_eq!(result, Err(QueryError::Closed));
    }
}
