/// リコールBDCレポート
///
/// キャンペーン名ごとに、商談・接触・テキスト/電話・予約・RO・売上・販売台数を集計する。
/// 4本のクエリを同時に発行し、`autoCampaignName`で結合する。
use async_trait::async_trait;

use super::report_definition::{fetch_sets, DirectorySource, ReportDefinition};
use crate::domain::{
    Column, ConsolidatedRow, DealerConnectionInfo, JobRequirements, QueryRow, ReportPeriod,
    ReportSchema, ResultConsolidator, Scalar,
};
use crate::infrastructure::{QueryError, QueryRowSource, ReportQuery};

/// 結合キー
pub const JOIN_KEY: &str = "autoCampaignName";

/// ディーラー名の列（全行に付与）
pub const DEALERSHIP_NAME: &str = "dealershipName";

const COLUMNS: &[Column] = &[
    Column::text(DEALERSHIP_NAME, "Dealership Name"),
    Column::text(JOIN_KEY, "Campaign Name"),
    Column::numeric("totalOpportunities", "Total Opportunities"),
    Column::numeric("totalOpportunitiesContacted", "Total Opportunities Contacted"),
    Column::numeric("totalOpportunitiesTexted", "Total Opportunities Texted"),
    Column::numeric("totalOpportunitiesCalled", "Total Opportunities Called"),
    Column::numeric("totalAppointments", "Total Appointments"),
    Column::numeric("totalAppointmentsArrived", "Total Appointments Arrived"),
    Column::numeric("totalRepairOrders", "Total Repair Orders"),
    Column::numeric("revenue", "Revenue"),
    Column::numeric("soldVehicles", "Sold Vehicles"),
];

/// 出力スキーマ
pub const SCHEMA: ReportSchema = ReportSchema::new(COLUMNS);

/// ディーラー → 顧客 → 車両 → 商談 → キャンペーンの共通結合
macro_rules! opportunity_campaign_joins {
    () => {
        "auto_dealer \
        INNER JOIN auto_custom_auto_dealer_c ON auto_custom_auto_dealer_c.auto_custo60bd_dealer_ida = auto_dealer.id \
            AND auto_custom_auto_dealer_c.deleted = 0 \
        INNER JOIN auto_customer ON auto_custom_auto_dealer_c.auto_custo0932ustomer_idb = auto_customer.id \
            AND auto_customer.deleted = 0 \
        INNER JOIN auto_vehicluto_customer_c ON auto_vehicluto_customer_c.auto_vehic9275ustomer_ida = auto_customer.id \
            AND auto_vehicluto_customer_c.deleted = 0 \
        INNER JOIN auto_vehicle ON auto_vehicluto_customer_c.auto_vehic831dvehicle_idb = auto_vehicle.id \
            AND auto_vehicle.deleted = 0 \
        INNER JOIN auto_vehiclpportunities_c ON auto_vehiclpportunities_c.auto_vehicce49vehicle_ida = auto_vehicle.id \
            AND auto_vehiclpportunities_c.deleted = 0 \
        INNER JOIN opportunities ON opportunities.id = auto_vehiclpportunities_c.auto_vehicb672unities_idb \
            AND opportunities.deleted = 0 \
        INNER JOIN auto_campaipportunities_c ON auto_campaipportunities_c.auto_campae5baunities_idb = opportunities.id \
            AND auto_campaipportunities_c.deleted = 0 \
        INNER JOIN auto_campaign ON auto_campaipportunities_c.auto_campa1b75ampaign_ida = auto_campaign.id \
            AND auto_campaign.deleted = 0 "
    };
}

/// 商談数・接触数・販売台数
///
/// バインド順: 監査開始, 監査終了, ディーラーコード, 開始, 終了
const OPPORTUNITIES_SQL: &str = concat!(
    "SELECT \
        auto_campaign.name AS autoCampaignName, \
        COUNT(DISTINCT opportunities.id) AS totalOpportunities, \
        COUNT(last_contacted_date) AS totalOpportunitiesContacted, \
        COUNT(DISTINCT IF(auto_vehicle.sold = 1 AND auto_vehicle_audit.id IS NOT NULL, auto_vehicle.id, NULL)) AS soldVehicles \
    FROM ",
    opportunity_campaign_joins!(),
    "LEFT JOIN auto_vehicle_audit ON auto_vehicle_audit.parent_id = auto_vehicle.id \
        AND field_name = 'sold' \
        AND auto_vehicle_audit.before_value_string = '0' \
        AND auto_vehicle_audit.after_value_string = '1' \
        AND auto_vehicle_audit.date_created BETWEEN ? AND ? \
    LEFT JOIN auto_contact_person ON auto_contact_person.user_id_c = opportunities.assigned_user_id \
        AND auto_contact_person.deleted = 0 \
    LEFT JOIN auto_contac_auto_dealer_c ON auto_contac_auto_dealer_c.auto_contaff8f_person_idb = auto_contact_person.id \
        AND auto_contac_auto_dealer_c.deleted = 0 \
    WHERE auto_dealer.integralink_code = ? \
        AND opportunities.date_entered BETWEEN ? AND ? \
        AND (auto_contact_person.id IS NULL \
            OR (auto_contact_person.id IS NOT NULL AND auto_contac_auto_dealer_c.auto_contafb84_dealer_ida = auto_dealer.id)) \
    GROUP BY auto_campaign.name \
    ORDER BY auto_campaign.name"
);

/// テキスト・電話のタスク数
const TEXTED_CALLED_SQL: &str = concat!(
    "SELECT \
        auto_campaign.name AS autoCampaignName, \
        SUM(IF(tasks.name = 'Text', 1, 0)) AS totalOpportunitiesTexted, \
        SUM(IF(tasks.name = 'Call', 1, 0)) AS totalOpportunitiesCalled \
    FROM ",
    opportunity_campaign_joins!(),
    "INNER JOIN tasks ON tasks.parent_id = opportunities.id \
        AND tasks.parent_type = 'Opportunities' \
    LEFT JOIN auto_contact_person ON auto_contact_person.user_id_c = opportunities.assigned_user_id \
        AND auto_contact_person.deleted = 0 \
    LEFT JOIN auto_contac_auto_dealer_c ON auto_contac_auto_dealer_c.auto_contaff8f_person_idb = auto_contact_person.id \
        AND auto_contac_auto_dealer_c.deleted = 0 \
    WHERE auto_dealer.integralink_code = ? \
        AND opportunities.date_entered BETWEEN ? AND ? \
        AND (auto_contact_person.id IS NULL \
            OR (auto_contact_person.id IS NOT NULL AND auto_contac_auto_dealer_c.auto_contafb84_dealer_ida = auto_dealer.id)) \
    GROUP BY auto_campaign.name"
);

/// 予約数・来店数
const APPOINTMENTS_SQL: &str = concat!(
    "SELECT \
        auto_campaign.name AS autoCampaignName, \
        COUNT(opportunities.last_contacted_date) AS totalAppointments, \
        SUM(IF(auto_appointment.appointment_with_ade_ro = 1 OR auto_appointment.appointment_with_ro = 1, 1, 0)) AS totalAppointmentsArrived \
    FROM ",
    opportunity_campaign_joins!(),
    "INNER JOIN auto_contact_person ON auto_contact_person.user_id_c = opportunities.assigned_user_id \
        AND auto_contact_person.deleted = 0 \
    INNER JOIN auto_contac_auto_dealer_c ON auto_contac_auto_dealer_c.auto_contaff8f_person_idb = auto_contact_person.id \
        AND auto_contac_auto_dealer_c.deleted = 0 \
    INNER JOIN auto_appointment ON opportunities.id = auto_appointment.opportunity_id_c \
        AND auto_appointment.deleted = 0 \
    WHERE auto_dealer.integralink_code = ? \
        AND opportunities.last_contacted_date IS NOT NULL \
        AND auto_appointment.appointment_date BETWEEN ? AND ? \
        AND auto_contac_auto_dealer_c.auto_contafb84_dealer_ida = auto_dealer.id \
    GROUP BY auto_campaign.name"
);

/// RO数・売上
const REPAIR_ORDERS_SQL: &str = "SELECT \
        auto_campaign.name AS autoCampaignName, \
        COUNT(auto_repair_order.id) AS totalRepairOrders, \
        SUM(REPLACE(repair_order_amount_total, ',', '')) AS revenue \
    FROM auto_dealer \
    INNER JOIN auto_custom_auto_dealer_c ON auto_custom_auto_dealer_c.auto_custo60bd_dealer_ida = auto_dealer.id \
        AND auto_custom_auto_dealer_c.deleted = 0 \
    INNER JOIN auto_customer ON auto_custom_auto_dealer_c.auto_custo0932ustomer_idb = auto_customer.id \
        AND auto_customer.deleted = 0 \
    INNER JOIN auto_vehicluto_customer_c ON auto_vehicluto_customer_c.auto_vehic9275ustomer_ida = auto_customer.id \
        AND auto_vehicluto_customer_c.deleted = 0 \
    INNER JOIN auto_vehicle ON auto_vehicluto_customer_c.auto_vehic831dvehicle_idb = auto_vehicle.id \
        AND auto_vehicle.deleted = 0 \
    INNER JOIN auto_repairauto_vehicle_c ON auto_repairauto_vehicle_c.auto_repai4169vehicle_ida = auto_vehicle.id \
        AND auto_repairauto_vehicle_c.deleted = 0 \
    INNER JOIN auto_repair_order ON auto_repairauto_vehicle_c.auto_repai527cr_order_idb = auto_repair_order.id \
        AND auto_repair_order.deleted = 0 \
    INNER JOIN opportunities ON auto_repair_order.opportunity_id_c = opportunities.id \
        AND opportunities.deleted = 0 \
    INNER JOIN auto_campaipportunities_c ON auto_campaipportunities_c.auto_campae5baunities_idb = opportunities.id \
        AND auto_campaipportunities_c.deleted = 0 \
    INNER JOIN auto_campaign ON auto_campaipportunities_c.auto_campa1b75ampaign_ida = auto_campaign.id \
        AND auto_campaign.deleted = 0 \
    INNER JOIN auto_contact_person ON auto_contact_person.user_id_c = opportunities.assigned_user_id \
        AND auto_contact_person.deleted = 0 \
    INNER JOIN auto_contac_auto_dealer_c ON auto_contac_auto_dealer_c.auto_contaff8f_person_idb = auto_contact_person.id \
        AND auto_contac_auto_dealer_c.deleted = 0 \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_repair_order.service_closed_date BETWEEN ? AND ? \
        AND opportunities.last_contacted_date IS NOT NULL \
        AND auto_contac_auto_dealer_c.auto_contafb84_dealer_ida = auto_dealer.id \
    GROUP BY auto_campaign.name";

/// リコールBDCレポート
#[derive(Debug, Clone, Copy, Default)]
pub struct RecallBdcReport;

impl RecallBdcReport {
    /// 1ディーラー分のクエリ（発行順）
    pub fn queries(dealer: &DealerConnectionInfo, period: &ReportPeriod) -> Vec<ReportQuery> {
        let code = dealer.internal_code.as_str();
        let in_period = |query: ReportQuery| {
            query
                .bind_text(code)
                .bind_datetime(period.start())
                .bind_datetime(period.end())
        };

        vec![
            in_period(
                ReportQuery::new("bdc_opportunities", OPPORTUNITIES_SQL)
                    .bind_datetime(period.start())
                    .bind_datetime(period.end()),
            ),
            in_period(ReportQuery::new("bdc_texted_called", TEXTED_CALLED_SQL)),
            in_period(ReportQuery::new("bdc_appointments", APPOINTMENTS_SQL)),
            in_period(ReportQuery::new("bdc_repair_orders", REPAIR_ORDERS_SQL)),
        ]
    }
}

#[async_trait]
impl ReportDefinition for RecallBdcReport {
    fn name(&self) -> &'static str {
        "recall_bdc"
    }

    fn title(&self) -> &'static str {
        "Recall BDC Report"
    }

    fn slug(&self) -> &'static str {
        "recall-bdc-report"
    }

    fn key_prefix(&self) -> &'static str {
        "recall_bdc_reports"
    }

    fn schema(&self) -> ReportSchema {
        SCHEMA
    }

    fn job_requirements(&self) -> JobRequirements {
        JobRequirements::CALLBACK
    }

    fn directory_source(&self) -> DirectorySource {
        DirectorySource::DealerApi
    }

    fn identity(&self, dealer: &DealerConnectionInfo) -> QueryRow {
        QueryRow::from_pairs([(DEALERSHIP_NAME, Scalar::text(dealer.dealer_name.as_str()))])
    }

    async fn collect(
        &self,
        source: &dyn QueryRowSource,
        dealer: &DealerConnectionInfo,
        period: &ReportPeriod,
    ) -> Result<Vec<ConsolidatedRow>, QueryError> {
        let sets = fetch_sets(source, &Self::queries(dealer, period)).await?;

        let mut consolidator = ResultConsolidator::new(JOIN_KEY)
            .with_constant(DEALERSHIP_NAME, dealer.dealer_name.as_str());
        for set in sets {
            consolidator.merge_set(set);
        }

        Ok(consolidator.into_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::report_definition::tests::{assert_binds_match, june_2021};
    use crate::domain::dealer::tests::sample_info;
    use crate::infrastructure::dealer_database::tests::MockQueryRowSource;
    use crate::infrastructure::QueryParam;

    fn campaign(name: &str, pairs: &[(&str, i64)]) -> QueryRow {
        let mut row = QueryRow::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)));
        row.insert(JOIN_KEY, name);
        row
    }

    #[test]
    fn test_queries_bind_every_placeholder() {
        let queries = RecallBdcReport::queries(&sample_info(), &june_2021());

        assert_eq!(queries.len(), 4);
        for query in &queries {
            assert_binds_match(query);
            assert!(!query.sql().contains("12345"));
        }
    }

    #[test]
    fn test_dealer_code_is_bound_after_audit_range() {
        let period = june_2021();
        let queries = RecallBdcReport::queries(&sample_info(), &period);

        assert_eq!(
            queries[0].params(),
            &[
                QueryParam::DateTime(period.start()),
                QueryParam::DateTime(period.end()),
                QueryParam::Text("12345".to_string()),
                QueryParam::DateTime(period.start()),
                QueryParam::DateTime(period.end()),
            ]
        );
    }

    #[test]
    fn test_repair_order_aliases_match_schema() {
        assert!(REPAIR_ORDERS_SQL.contains("AS totalRepairOrders"));
        assert!(REPAIR_ORDERS_SQL.contains("AS revenue"));
    }

    #[tokio::test]
    async fn test_collect_merges_by_campaign_name() {
        let source = MockQueryRowSource::new()
            .with_rows(
                "bdc_opportunities",
                vec![
                    campaign("Airbag", &[("totalOpportunities", 10), ("soldVehicles", 1)]),
                    campaign("Brakes", &[("totalOpportunities", 4)]),
                ],
            )
            .with_rows(
                "bdc_texted_called",
                vec![campaign("Brakes", &[("totalOpportunitiesTexted", 2)])],
            )
            .with_rows(
                "bdc_repair_orders",
                vec![campaign("Recall X", &[("totalRepairOrders", 3)])],
            );

        let rows = RecallBdcReport
            .collect(&source, &sample_info(), &june_2021())
            .await
            .unwrap();

        let names: Vec<String> = rows
            .iter()
            .map(|row| row.get(JOIN_KEY).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Airbag", "Brakes", "Recall X"]);
        assert_eq!(rows[1].get("totalOpportunitiesTexted"), Some(&Scalar::Int(2)));
        assert_eq!(rows[1].get("totalOpportunities"), Some(&Scalar::Int(4)));
        for row in &rows {
            assert_eq!(
                row.get(DEALERSHIP_NAME),
                Some(&Scalar::text("Dealership 12345"))
            );
        }

        assert_eq!(
            source.executed_names(),
            vec![
                "bdc_opportunities",
                "bdc_texted_called",
                "bdc_appointments",
                "bdc_repair_orders"
            ]
        );
    }

    #[tokio::test]
    async fn test_formatted_row_defaults() {
        let source = MockQueryRowSource::new().with_rows(
            "bdc_appointments",
            vec![campaign("Airbag", &[("totalAppointments", 5)])],
        );

        let rows = RecallBdcReport
            .collect(&source, &sample_info(), &june_2021())
            .await
            .unwrap();
        let formatted = SCHEMA.format_all(&rows);

        assert_eq!(
            formatted[0].to_record(),
            vec!["Dealership 12345", "Airbag", "0", "0", "0", "0", "5", "0", "0", "0", "0"]
        );
    }

    #[test]
    fn test_identity_row() {
        let identity = RecallBdcReport.identity(&sample_info());
        assert_eq!(
            SCHEMA.format(&identity).to_record(),
            vec!["Dealership 12345", "", "0", "0", "0", "0", "0", "0", "0", "0", "0"]
        );
    }
}
