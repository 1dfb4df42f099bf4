/// Result consolidation by join key
///
/// Merges the row-sets of several independent aggregate queries into one
/// row per join-key value. Query-sets are merged in the order they were
/// issued; the first occurrence of a join-key value fixes its output
/// position.
///
/// Merge rules:
/// - unseen key: a new row with every field of the query row, then the
///   constant fields, appended at the end
/// - seen key: every field of the query row overwrites the existing row,
///   fields the query row lacks are left untouched, then the constant fields
///   are written again (unless the caller asks to keep them)
use std::collections::HashMap;

use super::query_row::{ConsolidatedRow, QueryRow, Scalar};

/// Hashable identity of a join-key value.
///
/// `Int(1)` and `Text("1")` are different keys. Floats compare by value:
/// `0.0` and `-0.0` are one key, and every NaN shares a single key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinKey {
    Missing,
    Null,
    Int(i64),
    Float(u64),
    Text(String),
}

impl JoinKey {
    fn of(row: &QueryRow, column: &str) -> Self {
        match row.get(column) {
            None => JoinKey::Missing,
            Some(Scalar::Null) => JoinKey::Null,
            Some(Scalar::Int(value)) => JoinKey::Int(*value),
            Some(Scalar::Float(value)) => JoinKey::Float(float_key_bits(*value)),
            Some(Scalar::Text(value)) => JoinKey::Text(value.clone()),
        }
    }
}

fn float_key_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Whether constant fields are written again when a row is overlaid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantPolicy {
    /// Constants are re-applied on every overlay, so they always reflect the
    /// last write
    Reapply,
    /// Constants are only written when a row is created
    OnInsert,
}

/// Accumulates query-sets into consolidated rows
#[derive(Debug, Clone)]
pub struct ResultConsolidator {
    join_key: String,
    constants: Vec<(String, Scalar)>,
    rows: Vec<ConsolidatedRow>,
    index: HashMap<JoinKey, usize>,
}

impl ResultConsolidator {
    /// Creates an empty consolidator keyed on `join_key`.
    ///
    /// Every query row is expected to carry the join-key column. A row
    /// without it is grouped under a single "missing" key.
    pub fn new(join_key: impl Into<String>) -> Self {
        Self {
            join_key: join_key.into(),
            constants: Vec::new(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a constant field (e.g. the dealer name) written into every row
    pub fn with_constant(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.constants.push((column.into(), value.into()));
        self
    }

    pub fn join_key(&self) -> &str {
        &self.join_key
    }

    /// Merges one query-set, re-applying constants on overlay
    pub fn merge_set<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = QueryRow>,
    {
        self.merge_set_with(rows, ConstantPolicy::Reapply);
    }

    /// Merges one query-set with an explicit constant policy
    pub fn merge_set_with<I>(&mut self, rows: I, policy: ConstantPolicy)
    where
        I: IntoIterator<Item = QueryRow>,
    {
        for row in rows {
            self.merge_row(row, policy);
        }
    }

    fn merge_row(&mut self, row: QueryRow, policy: ConstantPolicy) {
        let key = JoinKey::of(&row, &self.join_key);

        match self.index.get(&key).copied() {
            Some(position) => {
                let existing = &mut self.rows[position];
                existing.overlay(row);
                if policy == ConstantPolicy::Reapply {
                    Self::apply_constants(existing, &self.constants);
                }
            }
            None => {
                let mut created = row;
                Self::apply_constants(&mut created, &self.constants);
                self.index.insert(key, self.rows.len());
                self.rows.push(created);
            }
        }
    }

    fn apply_constants(row: &mut ConsolidatedRow, constants: &[(String, Scalar)]) {
        for (column, value) in constants {
            row.insert(column.clone(), value.clone());
        }
    }

    /// Join-key values seen so far, in first-seen order
    pub fn key_values(&self) -> Vec<Scalar> {
        self.rows
            .iter()
            .filter_map(|row| row.get(&self.join_key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ConsolidatedRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ConsolidatedRow> {
        self.rows
    }
}

/// Consolidates `sets` (in issue order) by `join_key` with no constant fields
pub fn consolidate<S>(join_key: &str, sets: S) -> Vec<ConsolidatedRow>
where
    S: IntoIterator<Item = Vec<QueryRow>>,
{
    let mut consolidator = ResultConsolidator::new(join_key);
    for set in sets {
        consolidator.merge_set(set);
    }
    consolidator.into_rows()
}
