//! Event schema and the closed set of column value kinds.
//!
//! Every column of the dataset is one of three kinds: integer (`Int64`),
//! string (`Utf8`) or date (`Date32`). Filter values, partition directory
//! values and textual formatting all dispatch on [`ColumnKind`] rather than on
//! arbitrary Arrow types.

use crate::error::{DatasetError, Result};
use arrow::array::{Array, ArrayRef, Date32Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};
use arrow::temporal_conversions::as_date;
use chrono::NaiveDate;
use std::fmt;
use std::sync::{Arc, OnceLock};

pub const EVENT_ID: &str = "event_id";
pub const USER_ID: &str = "user_id";
pub const COUNTRY: &str = "country";
pub const EVENT_DATE: &str = "event_date";
pub const VALUE: &str = "value";

/// Partition columns in directory nesting order.
pub const PARTITION_COLUMNS: [&str; 2] = [EVENT_DATE, COUNTRY];

/// Columns stored inside leaf Parquet files, in file order.
pub const LEAF_COLUMNS: [&str; 3] = [EVENT_ID, USER_ID, VALUE];

/// Country vocabulary cycled through by the generator.
pub const COUNTRIES: [&str; 10] = ["US", "IN", "DE", "FR", "ES", "IT", "BR", "AR", "CL", "MX"];

/// Full logical schema of an event record.
pub fn event_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new(EVENT_ID, DataType::Int64, false),
                Field::new(USER_ID, DataType::Int64, false),
                Field::new(COUNTRY, DataType::Utf8, false),
                Field::new(EVENT_DATE, DataType::Date32, false),
                Field::new(VALUE, DataType::Int64, false),
            ]))
        })
        .clone()
}

/// Schema of a leaf file (partition columns live in the path).
pub fn leaf_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new(EVENT_ID, DataType::Int64, false),
                Field::new(USER_ID, DataType::Int64, false),
                Field::new(VALUE, DataType::Int64, false),
            ]))
        })
        .clone()
}

/// Schema of partial and final aggregates.
pub fn aggregate_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(Schema::new(vec![
                Field::new(USER_ID, DataType::Int64, false),
                Field::new(VALUE, DataType::Int64, false),
            ]))
        })
        .clone()
}

/// Project the event schema onto `columns`, keeping the requested order.
pub fn project_event_schema(columns: &[String]) -> Result<SchemaRef> {
    if columns.is_empty() {
        return Err(DatasetError::invalid_projection(
            "at least one column must be selected",
        ));
    }

    let schema = event_schema();
    let mut fields = Vec::with_capacity(columns.len());
    for name in columns {
        let field = schema.field_with_name(name).map_err(|_| {
            DatasetError::invalid_projection(format!(
                "unknown column '{}' (available: {})",
                name,
                column_names().join(", ")
            ))
        })?;
        if fields.iter().any(|f: &Field| f.name() == name) {
            return Err(DatasetError::invalid_projection(format!(
                "column '{}' selected more than once",
                name
            )));
        }
        fields.push(field.clone());
    }
    Ok(Arc::new(Schema::new(fields)))
}

pub fn column_names() -> Vec<String> {
    event_schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

pub fn is_partition_column(name: &str) -> bool {
    PARTITION_COLUMNS.contains(&name)
}

/// Kind of an event column, if it exists.
pub fn column_kind(name: &str) -> Option<ColumnKind> {
    let schema = event_schema();
    let field = schema.field_with_name(name).ok()?;
    ColumnKind::of(name, field.data_type()).ok()
}

/// Closed set of value kinds handled by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    String,
    Date,
}

impl ColumnKind {
    /// Map an Arrow type onto a kind; anything else is rejected.
    pub fn of(column: &str, data_type: &DataType) -> Result<Self> {
        match data_type {
            DataType::Int64 => Ok(ColumnKind::Integer),
            DataType::Utf8 => Ok(ColumnKind::String),
            DataType::Date32 => Ok(ColumnKind::Date),
            other => Err(DatasetError::unsupported_type(column, other)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::String => DataType::Utf8,
            ColumnKind::Date => DataType::Date32,
        }
    }

    /// Parse a textual literal (CLI filter, directory value) into a value.
    pub fn parse_value(&self, raw: &str) -> Option<Value> {
        match self {
            ColumnKind::Integer => raw.trim().parse::<i64>().ok().map(Value::Int),
            ColumnKind::String => Some(Value::Str(raw.to_string())),
            ColumnKind::Date => raw.trim().parse::<NaiveDate>().ok().map(Value::Date),
        }
    }

    /// Format every cell of `array` with this kind's canonical text rule.
    ///
    /// Integers become decimal digits, strings are kept, dates become
    /// `YYYY-MM-DD`. Nulls stay null.
    pub fn format_array(&self, column: &str, array: &ArrayRef) -> Result<StringArray> {
        if array.data_type() != &self.data_type() {
            return Err(DatasetError::unsupported_type(column, array.data_type()));
        }

        let text = cast(array, &DataType::Utf8)?;
        text.as_any()
            .downcast_ref::<StringArray>()
            .cloned()
            .ok_or_else(|| DatasetError::unsupported_type(column, text.data_type()))
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Integer => write!(f, "integer"),
            ColumnKind::String => write!(f, "string"),
            ColumnKind::Date => write!(f, "date"),
        }
    }
}

/// A single typed value of one of the supported kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(i64),
    Str(String),
    Date(NaiveDate),
}

impl Value {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Int(_) => ColumnKind::Integer,
            Value::Str(_) => ColumnKind::String,
            Value::Date(_) => ColumnKind::Date,
        }
    }

    /// Array of `len` copies of this value.
    pub fn to_array(&self, len: usize) -> ArrayRef {
        match self {
            Value::Int(v) => Arc::new(Int64Array::from(vec![*v; len])),
            Value::Str(s) => Arc::new(StringArray::from_iter_values(
                std::iter::repeat(s.as_str()).take(len),
            )),
            Value::Date(d) => Arc::new(Date32Array::from(vec![date_to_days(*d); len])),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Days since 1970-01-01, the `Date32` representation.
pub fn date_to_days(date: NaiveDate) -> i32 {
    Date32Type::from_naive_date(date)
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    as_date::<Date32Type>(i64::from(days))
}
