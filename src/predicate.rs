//! Conjunctions of equality constraints.
//!
//! A predicate is evaluated in two places: against partition directory values
//! while planning a scan (pruning), and against decoded batches for the
//! columns stored inside leaf files.

use crate::error::{DatasetError, Result};
use crate::partition::PartitionKey;
use crate::schema::{self, Value};
use arrow::array::{BooleanArray, RecordBatch, Scalar};
use arrow::compute::kernels::{boolean, cmp};
use std::fmt;

/// `column == value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqClause {
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<EqClause>,
}

impl Predicate {
    /// The predicate that admits every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::all().and_eq(column, value)
    }

    pub fn and_eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.clauses.push(EqClause {
            column: column.into(),
            value,
        });
        self
    }

    /// Parse `column=value` (or `column==value`) filters, typing each value by
    /// its column's kind.
    pub fn parse<S: AsRef<str>>(filters: &[S]) -> Result<Self> {
        let mut predicate = Predicate::all();
        for filter in filters {
            let filter = filter.as_ref();
            let (column, raw) = filter.split_once('=').ok_or_else(|| {
                DatasetError::invalid_predicate(format!(
                    "'{}' is not of the form column=value",
                    filter
                ))
            })?;
            let column = column.trim();
            let raw = raw.trim_start_matches('=').trim();

            let kind = schema::column_kind(column).ok_or_else(|| {
                DatasetError::invalid_predicate(format!("unknown column '{}'", column))
            })?;
            let value = kind.parse_value(raw).ok_or_else(|| {
                DatasetError::invalid_predicate(format!(
                    "'{}' is not a valid {} for column '{}'",
                    raw, kind, column
                ))
            })?;
            predicate = predicate.and_eq(column, value);
        }
        Ok(predicate)
    }

    /// Check every clause names a schema column and carries a value of that
    /// column's kind.
    pub fn validate(&self) -> Result<()> {
        for clause in &self.clauses {
            let kind = schema::column_kind(&clause.column).ok_or_else(|| {
                DatasetError::invalid_predicate(format!("unknown column '{}'", clause.column))
            })?;
            if clause.value.kind() != kind {
                return Err(DatasetError::invalid_predicate(format!(
                    "column '{}' is {} but the filter value '{}' is {}",
                    clause.column,
                    kind,
                    clause.value,
                    clause.value.kind()
                )));
            }
        }
        Ok(())
    }

    pub fn clauses(&self) -> &[EqClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether a partition directory `column=value` can hold matching rows.
    pub fn admits_partition(&self, column: &str, value: &Value) -> bool {
        self.clauses
            .iter()
            .filter(|c| c.column == column)
            .all(|c| &c.value == value)
    }

    pub fn admits_key(&self, key: &PartitionKey) -> bool {
        schema::PARTITION_COLUMNS.iter().all(|column| {
            key.value(column)
                .map(|v| self.admits_partition(column, &v))
                .unwrap_or(true)
        })
    }

    /// Non-partition columns referenced by this predicate, deduplicated.
    pub fn leaf_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for clause in &self.clauses {
            let name = clause.column.as_str();
            if !schema::is_partition_column(name) && !columns.contains(&name) {
                columns.push(name);
            }
        }
        columns
    }

    /// Row selection for the leaf-column clauses, `None` when there are none.
    pub fn selection(&self, batch: &RecordBatch) -> Result<Option<BooleanArray>> {
        let mut mask: Option<BooleanArray> = None;
        for clause in self
            .clauses
            .iter()
            .filter(|c| !schema::is_partition_column(&c.column))
        {
            let column = batch.column_by_name(&clause.column).ok_or_else(|| {
                DatasetError::invalid_predicate(format!(
                    "column '{}' missing from decoded batch",
                    clause.column
                ))
            })?;
            let scalar = Scalar::new(clause.value.to_array(1));
            let matched = cmp::eq(column, &scalar)?;
            mask = Some(match mask {
                Some(prev) => boolean::and(&prev, &matched)?,
                None => matched,
            });
        }
        Ok(mask)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "TRUE");
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            match &clause.value {
                Value::Str(s) => write!(f, "{} == '{}'", clause.column, s)?,
                other => write!(f, "{} == {}", clause.column, other)?,
            }
        }
        Ok(())
    }
}
