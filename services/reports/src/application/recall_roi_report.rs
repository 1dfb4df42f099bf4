/// リコールROIレポート
///
/// キャンペーンごとのテキスト・メール・RO・売上（第1段）と、
/// 見つかったキャンペーンの予約・来店数（第2段）を`campaignId`で結合する。
/// 第2段の上書きではディーラー名を再設定しない。
use async_trait::async_trait;
use tracing::debug;

use super::report_definition::{DirectorySource, ReportDefinition};
use crate::domain::{
    Column, ConsolidatedRow, ConstantPolicy, DealerConnectionInfo, JobRequirements, QueryRow,
    ReportPeriod, ReportSchema, ResultConsolidator, Scalar,
};
use crate::infrastructure::{in_placeholders, QueryError, QueryRowSource, ReportQuery};

/// 結合キー
pub const JOIN_KEY: &str = "campaignId";

/// ディーラー名の列
pub const DEALERSHIP_NAME: &str = "dealershipName";

const COLUMNS: &[Column] = &[
    Column::text(DEALERSHIP_NAME, "Dealership Name"),
    Column::text("campaignName", "Campaign Name"),
    Column::text("campaignType", "Campaign Type"),
    Column::numeric("textMessageNo", "No. of Texts"),
    Column::numeric("emailNo", "No. of Emails"),
    Column::numeric("appointmentNo", "No. of Appointments"),
    Column::numeric("arrivedAppointmentNo", "No. of Arrived Appointments"),
    Column::numeric("roNo", "No. of ROs"),
    Column::numeric("roTotal", "Amount"),
];

/// 出力スキーマ
pub const SCHEMA: ReportSchema = ReportSchema::new(COLUMNS);

/// 第1段: キャンペーン別のテキスト・メール・RO
///
/// バインド順: ディーラーコード, 開始, 終了
const CAMPAIGNS_SQL: &str = "SELECT \
        auto_campaign.id AS campaignId, \
        auto_campaign.name AS campaignName, \
        auto_campaign.type AS campaignType, \
        COUNT(DISTINCT (IF(auto_event.body_type = 'Text', auto_event.id, NULL))) AS textMessageNo, \
        COUNT(DISTINCT (IF(auto_event.type = 'Sent', auto_event.id, NULL))) AS emailNo, \
        COUNT(DISTINCT auto_repair_order.id) AS roNo, \
        SUM(REPLACE(repair_order_amount_total, ',', '')) AS roTotal \
    FROM auto_event \
    INNER JOIN auto_event_to_recipient_c ON auto_event.id = auto_event_to_recipient_c.auto_eventfa83o_event_idb \
        AND auto_event_to_recipient_c.deleted = 0 \
    INNER JOIN auto_recipient ON auto_event_to_recipient_c.auto_eventa735cipient_ida = auto_recipient.id \
        AND auto_recipient.deleted = 0 \
    INNER JOIN auto_recipiuto_campaign_c ON auto_recipiuto_campaign_c.auto_recip885bcipient_idb = auto_recipient.id \
        AND auto_recipiuto_campaign_c.deleted = 0 \
    INNER JOIN auto_campaign ON auto_campaign.id = auto_recipiuto_campaign_c.auto_recip8ba3ampaign_ida \
        AND auto_campaign.deleted = 0 \
    INNER JOIN auto_campai_auto_dealer_c ON auto_campai_auto_dealer_c.auto_campa2d6bampaign_idb = auto_campaign.id \
        AND auto_campai_auto_dealer_c.deleted = 0 \
    INNER JOIN auto_dealer ON auto_campai_auto_dealer_c.auto_campa1fd9_dealer_ida = auto_dealer.id \
    LEFT JOIN auto_repair_order FORCE INDEX FOR JOIN (idx_auto_repair_order_auto_event_id_c) \
        ON auto_repair_order.auto_event_id_c = auto_event.id \
        AND auto_repair_order.deleted = 0 \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_campaign.included_in_roi = 1 \
        AND auto_event.sent_date BETWEEN ? AND ? \
        AND (auto_event.type = 'Sent' \
            OR (auto_event.body_type = 'Text' \
                AND auto_event.generated_from = 'System' \
                AND auto_event.type = 'Not-Pending')) \
    GROUP BY auto_campaign.id \
    ORDER BY auto_campaign.name";

/// 第2段の予約日時（接触後に登録された予約は登録日時、それ以外は変更日時）
macro_rules! appointment_date_expr {
    () => {
        "IF(opportunities.last_contacted_date < auto_appointment.date_entered, \
            auto_appointment.date_entered, auto_appointment.reschedule_date)"
    };
}

/// 第2段のSELECT〜`IN`の手前
///
/// バインド順: キャンペーンID..., 開始, 終了, 開始, 終了
const APPOINTMENTS_SQL_HEAD: &str = concat!(
    "SELECT \
        auto_campaign.id AS campaignId, \
        COUNT(",
    appointment_date_expr!(),
    ") AS appointmentNo, \
        SUM(IF(auto_appointment.appointment_with_ade_ro = 1 OR auto_appointment.appointment_with_ro = 1, 1, 0)) AS arrivedAppointmentNo \
    FROM auto_campaign \
    INNER JOIN auto_recipiuto_campaign_c ON auto_campaign.id = auto_recipiuto_campaign_c.auto_recip8ba3ampaign_ida \
        AND auto_recipiuto_campaign_c.deleted = 0 \
    INNER JOIN auto_recipient ON auto_recipiuto_campaign_c.auto_recip885bcipient_idb = auto_recipient.id \
        AND auto_recipient.deleted = 0 \
    INNER JOIN auto_vehicle ON auto_recipient.auto_vehicle_id_c = auto_vehicle.id \
        AND auto_vehicle.deleted = 0 \
    INNER JOIN auto_vehiclpportunities_c ON auto_vehiclpportunities_c.auto_vehicce49vehicle_ida = auto_vehicle.id \
        AND auto_vehiclpportunities_c.deleted = 0 \
    INNER JOIN opportunities ON opportunities.id = auto_vehiclpportunities_c.auto_vehicb672unities_idb \
        AND opportunities.deleted = 0 \
    INNER JOIN auto_appointment ON auto_appointment.opportunity_id_c = opportunities.id \
        AND auto_appointment.deleted = 0 \
    WHERE auto_campaign.id IN "
);

/// 第2段の`IN (...)`以降
const APPOINTMENTS_SQL_TAIL: &str = concat!(
    " AND opportunities.last_contacted_date IS NOT NULL \
        AND ((",
    appointment_date_expr!(),
    " >= ? AND ",
    appointment_date_expr!(),
    " <= ?) \
            OR (auto_appointment.appointment_date BETWEEN ? AND ?)) \
    GROUP BY auto_campaign.id"
);

/// リコールROIレポート
#[derive(Debug, Clone, Copy, Default)]
pub struct RecallRoiReport;

impl RecallRoiReport {
    /// 第1段のクエリ
    pub fn campaigns_query(dealer: &DealerConnectionInfo, period: &ReportPeriod) -> ReportQuery {
        ReportQuery::new("roi_campaigns", CAMPAIGNS_SQL)
            .bind_text(dealer.internal_code.as_str())
            .bind_datetime(period.start())
            .bind_datetime(period.end())
    }

    /// 第2段のクエリ（キャンペーンIDは1件以上）
    pub fn appointments_query(campaign_ids: &[String], period: &ReportPeriod) -> ReportQuery {
        let sql = format!(
            "{}({}){}",
            APPOINTMENTS_SQL_HEAD,
            in_placeholders(campaign_ids.len()),
            APPOINTMENTS_SQL_TAIL
        );

        ReportQuery::new("roi_appointments", sql)
            .bind_texts(campaign_ids.iter().cloned())
            .bind_datetime(period.start())
            .bind_datetime(period.end())
            .bind_datetime(period.start())
            .bind_datetime(period.end())
    }
}

/// 結合済み行から重複なしのキャンペーンIDを取り出す（NULLは除く）
fn campaign_ids(consolidator: &ResultConsolidator) -> Vec<String> {
    consolidator
        .key_values()
        .into_iter()
        .filter(|value| !value.is_null())
        .map(|value| value.to_string())
        .collect()
}

#[async_trait]
impl ReportDefinition for RecallRoiReport {
    fn name(&self) -> &'static str {
        "recall_roi"
    }

    fn title(&self) -> &'static str {
        "Recall ROI Report"
    }

    fn slug(&self) -> &'static str {
        "recall-roi-report"
    }

    fn key_prefix(&self) -> &'static str {
        "Recall_ROI_Reports"
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
        let mut consolidator = ResultConsolidator::new(JOIN_KEY)
            .with_constant(DEALERSHIP_NAME, dealer.dealer_name.as_str());

        let campaigns = source
            .fetch_rows(&Self::campaigns_query(dealer, period))
            .await?;
        consolidator.merge_set(campaigns);

        let ids = campaign_ids(&consolidator);
        if ids.is_empty() {
            debug!(dealer_code = %dealer.internal_code, "対象キャンペーンなし、予約集計をスキップ");
            return Ok(consolidator.into_rows());
        }

        let appointments = source
            .fetch_rows(&Self::appointments_query(&ids, period))
            .await?;
        consolidator.merge_set_with(appointments, ConstantPolicy::OnInsert);

        Ok(consolidator.into_rows())
    }
}
