// 集計期間
//
// ジョブで指定されたstartDate/endDateを解析し、SQLにバインドする
// UTCの日時範囲として保持するドメイン層コンポーネント。

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

/// SQLパラメータ・ログ出力用の日時フォーマット
pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 日付のみのフォーマット
const DATE_FORMAT: &str = "%Y-%m-%d";

/// 日付と時刻のフォーマット（RFC 3339以外で受け付けるもの）
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// 日付のみの終了日に補う時刻
const END_OF_DAY: NaiveTime = match NaiveTime::from_hms_opt(23, 59, 59) {
    Some(time) => time,
    None => NaiveTime::MIN,
};

/// 集計期間のエラー型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PeriodError {
    #[error("{field} must be a YYYY-MM-DD date or datetime, got: {value}")]
    InvalidDate { field: &'static str, value: String },

    #[error("startDate ({start}) must not be after endDate ({end})")]
    StartAfterEnd { start: String, end: String },
}

/// 期間のどちら側か（日付のみ指定時の補完時刻が異なる）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Start,
    End,
}

/// 両端を含む集計期間（UTC）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl ReportPeriod {
    /// 日時を直接指定して作成
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::StartAfterEnd {
                start: start.format(SQL_DATETIME_FORMAT).to_string(),
                end: end.format(SQL_DATETIME_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// ジョブの文字列から期間を解析
    ///
    /// 日付のみの終了日はその日の23:59:59までを含む。
    pub fn parse(start: &str, end: &str) -> Result<Self, PeriodError> {
        let start = parse_bound(start, "startDate", Bound::Start)?;
        let end = parse_bound(end, "endDate", Bound::End)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// SQLバインド用の開始日時文字列
    pub fn start_sql(&self) -> String {
        self.start.format(SQL_DATETIME_FORMAT).to_string()
    }

    /// SQLバインド用の終了日時文字列
    pub fn end_sql(&self) -> String {
        self.end.format(SQL_DATETIME_FORMAT).to_string()
    }

    /// メール本文用の日付範囲（例: `2021-05-01 - 2021-05-31`）
    pub fn display_range(&self) -> String {
        format!(
            "{} - {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

fn parse_bound(value: &str, field: &'static str, bound: Bound) -> Result<NaiveDateTime, PeriodError> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        return Ok(match bound {
            Bound::Start => date.and_time(NaiveTime::MIN),
            Bound::End => date.and_time(END_OF_DAY),
        });
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| PeriodError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_only_end_is_inclusive() {
        let period = ReportPeriod::parse("2021-05-18", "2021-06-18").unwrap();

        assert_eq!(period.start_sql(), "2021-05-18 00:00:00");
        assert_eq!(period.end_sql(), "2021-06-18 23:59:59");
    }

    #[test]
    fn test_same_day_period() {
        let period = ReportPeriod::parse("2021-05-18", "2021-05-18").unwrap();

        assert_eq!(period.start_sql(), "2021-05-18 00:00:00");
        assert_eq!(period.end_sql(), "2021-05-18 23:59:59");
    }

    #[test]
    fn test_rfc3339_is_converted_to_utc() {
        let period =
            ReportPeriod::parse("2021-12-31T18:00:00-06:00", "2022-01-31T17:59:59-06:00").unwrap();

        assert_eq!(period.start_sql(), "2022-01-01 00:00:00");
        assert_eq!(period.end_sql(), "2022-01-31 23:59:59");
    }

    #[test]
    fn test_sql_datetime_is_kept_as_is() {
        let period = ReportPeriod::parse("2021-01-01 08:30:00", "2021-01-02 17:00:00").unwrap();

        assert_eq!(period.start_sql(), "2021-01-01 08:30:00");
        assert_eq!(period.end_sql(), "2021-01-02 17:00:00");
    }

    #[test]
    fn test_invalid_date_names_field() {
        let error = ReportPeriod::parse("2021-05-18", "18/06/2021").unwrap_err();

        assert_eq!(
            error,
            PeriodError::InvalidDate {
                field: "endDate",
                value: "18/06/2021".to_string()
            }
        );
        assert!(error.to_string().starts_with("endDate"));
    }

    #[test]
    fn test_start_after_end_is_rejected() {
        let error = ReportPeriod::parse("2021-06-19", "2021-06-18").unwrap_err();

        assert!(matches!(error, PeriodError::StartAfterEnd { .. }));
    }

    #[test]
    fn test_display_range() {
        let period = ReportPeriod::parse("2021-05-01", "2021-05-31").unwrap();

        assert_eq!(period.display_range(), "2021-05-01 - 2021-05-31");
    }
}
