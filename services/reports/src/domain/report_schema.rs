/// Report row formatting
///
/// A `ReportSchema` is the fixed, ordered column list of one report type.
/// Formatting projects a consolidated row onto that list, substituting the
/// column's default for every field that is absent or NULL.
use super::query_row::{ConsolidatedRow, Scalar};

/// Value written when a column is absent or NULL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    /// Numeric columns render as `0`
    Zero,
    /// Text columns render as an empty string
    Empty,
    /// A fixed literal, e.g. `N/A` for an unavailable measurement
    Text(&'static str),
}

impl ColumnDefault {
    pub fn value(self) -> Scalar {
        match self {
            ColumnDefault::Zero => Scalar::Int(0),
            ColumnDefault::Empty => Scalar::text(""),
            ColumnDefault::Text(text) => Scalar::text(text),
        }
    }
}

/// One output column: internal field name, display title, default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub key: &'static str,
    pub title: &'static str,
    pub default: ColumnDefault,
}

impl Column {
    pub const fn numeric(key: &'static str, title: &'static str) -> Self {
        Self {
            key,
            title,
            default: ColumnDefault::Zero,
        }
    }

    pub const fn text(key: &'static str, title: &'static str) -> Self {
        Self {
            key,
            title,
            default: ColumnDefault::Empty,
        }
    }

    pub const fn with_default(key: &'static str, title: &'static str, default: &'static str) -> Self {
        Self {
            key,
            title,
            default: ColumnDefault::Text(default),
        }
    }
}

/// A formatted output row, one value per schema column in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    cells: Vec<(&'static str, Scalar)>,
}

impl ReportRow {
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.cells
            .iter()
            .find(|(column, _)| *column == key)
            .map(|(_, value)| value)
    }

    pub fn values(&self) -> impl Iterator<Item = &Scalar> {
        self.cells.iter().map(|(_, value)| value)
    }

    /// Cell values rendered as strings, ready for a tabular encoder
    pub fn to_record(&self) -> Vec<String> {
        self.values().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Ordered column list of one report type
#[derive(Debug, Clone, Copy)]
pub struct ReportSchema {
    columns: &'static [Column],
}

impl ReportSchema {
    pub const fn new(columns: &'static [Column]) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &'static [Column] {
        self.columns
    }

    pub fn titles(&self) -> Vec<&'static str> {
        self.columns.iter().map(|column| column.title).collect()
    }

    /// Projects `row` onto the schema.
    ///
    /// Present, non-null values pass through unchanged. Fields outside the
    /// schema are dropped.
    pub fn format(&self, row: &ConsolidatedRow) -> ReportRow {
        let cells = self
            .columns
            .iter()
            .map(|column| {
                let value = match row.get(column.key) {
                    Some(value) if !value.is_null() => value.clone(),
                    _ => column.default.value(),
                };
                (column.key, value)
            })
            .collect();

        ReportRow { cells }
    }

    pub fn format_all<'a, I>(&self, rows: I) -> Vec<ReportRow>
    where
        I: IntoIterator<Item = &'a ConsolidatedRow>,
    {
        rows.into_iter().map(|row| self.format(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::consolidator::consolidate;
    use crate::domain::query_row::QueryRow;

    const CAMPAIGN_COLUMNS: &[Column] = &[
        Column::text("campaignId", "Campaign"),
        Column::numeric("totalOpportunities", "Total Opportunities"),
        Column::numeric("totalOpportunitiesContacted", "Total Opportunities Contacted"),
        Column::numeric("totalAppointments", "Total Appointments"),
        Column::numeric("revenue", "Revenue"),
    ];
    const CAMPAIGN_SCHEMA: ReportSchema = ReportSchema::new(CAMPAIGN_COLUMNS);

    const VIDEO_COLUMNS: &[Column] = &[
        Column::text("roNumber", "RO Number"),
        Column::text("advisorName", "Advisor"),
        Column::with_default("avgResponseSeconds", "Avg Response Time (sec)", "N/A"),
    ];
    const VIDEO_SCHEMA: ReportSchema = ReportSchema::new(VIDEO_COLUMNS);

    #[test]
    fn test_titles_follow_schema_order() {
        assert_eq!(
            VIDEO_SCHEMA.titles(),
            vec!["RO Number", "Advisor", "Avg Response Time (sec)"]
        );
    }

    #[test]
    fn test_absent_and_null_fields_get_defaults() {
        let row = QueryRow::from_pairs([
            ("roNumber", Scalar::text("1001")),
            ("advisorName", Scalar::Null),
        ]);

        let formatted = VIDEO_SCHEMA.format(&row);

        assert_eq!(formatted.get("roNumber"), Some(&Scalar::text("1001")));
        assert_eq!(formatted.get("advisorName"), Some(&Scalar::text("")));
        assert_eq!(formatted.get("avgResponseSeconds"), Some(&Scalar::text("N/A")));
    }

    #[test]
    fn test_present_values_pass_through() {
        let row = QueryRow::from_pairs([
            ("campaignId", Scalar::text("A")),
            ("revenue", Scalar::Float(1234.5)),
            ("totalOpportunities", Scalar::Int(0)),
        ]);

        let formatted = CAMPAIGN_SCHEMA.format(&row);

        assert_eq!(formatted.get("revenue"), Some(&Scalar::Float(1234.5)));
        assert_eq!(formatted.get("totalOpportunities"), Some(&Scalar::Int(0)));
    }

    #[test]
    fn test_fields_outside_schema_are_dropped() {
        let row = QueryRow::from_pairs([("roNumber", "1"), ("internalOnly", "x")]);

        let formatted = VIDEO_SCHEMA.format(&row);

        assert_eq!(formatted.len(), 3);
        assert_eq!(formatted.get("internalOnly"), None);
    }

    #[test]
    fn test_consolidated_campaign_row_end_to_end() {
        let opportunities = vec![QueryRow::from_pairs([
            ("campaignId", Scalar::text("A")),
            ("totalOpportunities", Scalar::Int(10)),
        ])];
        let appointments = vec![QueryRow::from_pairs([
            ("campaignId", Scalar::text("A")),
            ("totalAppointments", Scalar::Int(3)),
        ])];

        let rows = consolidate("campaignId", [opportunities, appointments]);
        let formatted = CAMPAIGN_SCHEMA.format_all(&rows);

        assert_eq!(formatted.len(), 1);
        assert_eq!(
            formatted[0].to_record(),
            vec!["A", "10", "0", "3", "0"]
        );
    }
}
