/// 応答時間計測用のメッセージイベントクエリ
///
/// 期間内にクローズしたROに紐づくテキスト・ビデオメッセージを、
/// グループキー・送信日時の昇順で返す（ペアリングの前提条件）。
use crate::domain::{DealerConnectionInfo, GroupBy, ReportPeriod};
use crate::infrastructure::ReportQuery;

/// グループキー以外の共通部分
///
/// バインド順: ディーラーコード, 開始, 終了
const EVENTS_SQL_TAIL: &str = " AS groupKey, \
        auto_event.sent_date AS sentDate, \
        auto_event.generated_from AS generatedFrom, \
        auto_event.type AS eventType, \
        IF(auto_event.attachment_id IS NOT NULL AND auto_event.attachment_id <> '', 1, 0) AS hasAttachment \
    FROM auto_event \
    INNER JOIN auto_event_to_recipient_c ON auto_event.id = auto_event_to_recipient_c.auto_eventfa83o_event_idb \
        AND auto_event_to_recipient_c.deleted = 0 \
    INNER JOIN auto_repair_order ON auto_repair_order.id = auto_event.auto_repair_order_id_c \
        AND auto_repair_order.deleted = 0 \
    INNER JOIN auto_dealer ON auto_dealer.id = auto_repair_order.auto_dealer_id_c \
    WHERE auto_dealer.integralink_code = ? \
        AND auto_event.deleted = 0 \
        AND auto_event.body_type IN ('Text', 'Video') \
        AND auto_event.sent_date IS NOT NULL \
        AND auto_repair_order.service_closed_date BETWEEN ? AND ? \
    ORDER BY groupKey, sentDate, auto_event.id";

/// グループキーに使う列
fn group_column(group_by: GroupBy) -> &'static str {
    match group_by {
        GroupBy::RepairOrder => "auto_repair_order.id",
        GroupBy::Recipient => "auto_event_to_recipient_c.auto_eventa735cipient_ida",
    }
}

/// メッセージイベントのクエリを組み立てる
pub fn message_events_query(
    name: &'static str,
    group_by: GroupBy,
    dealer: &DealerConnectionInfo,
    period: &ReportPeriod,
) -> ReportQuery {
    let sql = format!("SELECT {}{}", group_column(group_by), EVENTS_SQL_TAIL);

    ReportQuery::new(name, sql)
        .bind_text(dealer.internal_code.as_str())
        .bind_datetime(period.start())
        .bind_datetime(period.end())
}

/// 平均応答秒を小数第2位に丸める
pub(crate) fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
