/// Row model shared by every aggregate query
///
/// A `QueryRow` is one row returned by one aggregate query: a mapping from
/// column name to a scalar. Rows are schemaless; each query decides its own
/// column set.
use std::collections::BTreeMap;
use std::fmt;

/// A single column value as returned by the database
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// SQL NULL
    Null,
    /// Integer columns (COUNT, flags)
    Int(i64),
    /// DECIMAL / DOUBLE columns (SUM, averages)
    Float(f64),
    /// Text and temporal columns
    Text(String),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Text view of the value, `None` for non-text variants
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric view of the value, `None` for text and NULL
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(value) => Some(*value as f64),
            Scalar::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Int(value) => write!(f, "{}", value),
            // 1500.0 renders as "1500", matching how the numbers read in a spreadsheet
            Scalar::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{:.0}", value)
            }
            Scalar::Float(value) => write!(f, "{}", value),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// One row of one aggregate query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRow {
    fields: BTreeMap<String, Scalar>,
}

/// The union of every `QueryRow` sharing one join-key value.
///
/// Same shape as a `QueryRow`; the alias marks rows that came out of the
/// consolidator.
pub type ConsolidatedRow = QueryRow;

impl QueryRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from `(column, value)` pairs; later duplicates win
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Scalar>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.fields.get(column)
    }

    /// Sets a column, returning the previous value if any
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Option<Scalar> {
        self.fields.insert(column.into(), value.into())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Copies every field of `other` over this row.
    ///
    /// Fields present in `other` overwrite; fields only present here are kept.
    pub fn overlay(&mut self, other: QueryRow) {
        self.fields.extend(other.fields);
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for QueryRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
