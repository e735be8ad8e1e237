//! Read-only tables over JSON records.
//!
//! ```sql
//! CREATE VIRTUAL TABLE people USING records(
//!     columns='name, age',
//!     data='[["ann", 31], {"name": "bob", "age": 40}]'
//! );
//! CREATE VIRTUAL TABLE events USING records(columns='id, kind', file='/var/data/events.json');
//! ```
//!
//! Each record is either an array (positional, missing trailing values are
//! NULL) or an object keyed by column name. Rows are loaded once when the
//! table is constructed; the row identity is the 1-based record position.

use std::fs;
use std::sync::Arc;

use tablebridge_core::{
    Arguments, BridgeError, ChosenPlan, ColumnFilter, ColumnPlanner, Cursor, PlanOutcome,
    PlanRequest, Provider, ProviderOptions, Result, Value,
};
use tracing::debug;

const ROWID: i32 = -1;

const ROWID_EQ_BIT: i32 = 0x01;
const ROWID_ASC_BIT: i32 = 0x02;

const KNOWN_ARGUMENTS: &[&str] = &["columns", "data", "file"];

type Rows = Arc<Vec<Vec<Value>>>;

/// Provider behind the `records` module.
#[derive(Debug, Clone)]
pub struct Records {
    table: String,
    columns: Vec<String>,
    rows: Rows,
    planner: ColumnPlanner,
}

impl Records {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Splits and validates the `columns=` list.
fn parse_columns(raw: &str) -> Result<Vec<String>> {
    let mut columns: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim) {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BridgeError::construction(format!(
                "invalid column name '{name}': must be non-empty and contain only alphanumeric characters and underscores"
            )));
        }
        if columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            return Err(BridgeError::construction(format!("duplicate column '{name}'")));
        }
        columns.push(name.to_string());
    }
    Ok(columns)
}

/// Converts one JSON record into a row of exactly `columns.len()` values.
fn parse_record(position: usize, record: &serde_json::Value, columns: &[String]) -> Result<Vec<Value>> {
    match record {
        serde_json::Value::Array(values) => {
            if values.len() > columns.len() {
                return Err(BridgeError::construction(format!(
                    "record {position} has {} values but the table has {} columns",
                    values.len(),
                    columns.len()
                )));
            }
            let mut row: Vec<Value> = values.iter().map(Value::from_json).collect();
            row.resize(columns.len(), Value::Null);
            Ok(row)
        }
        serde_json::Value::Object(fields) => {
            if let Some(unknown) = fields
                .keys()
                .find(|k| !columns.iter().any(|c| c.eq_ignore_ascii_case(k)))
            {
                return Err(BridgeError::construction(format!(
                    "record {position} has unknown column '{unknown}'"
                )));
            }
            Ok(columns
                .iter()
                .map(|column| {
                    fields
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(column))
                        .map(|(_, v)| Value::from_json(v))
                        .unwrap_or(Value::Null)
                })
                .collect())
        }
        other => Err(BridgeError::construction(format!(
            "record {position} must be an array or an object, got {other}"
        ))),
    }
}

/// Parses a JSON array of records.
fn parse_rows(json: &str, columns: &[String]) -> Result<Vec<Vec<Value>>> {
    let document: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BridgeError::construction(format!("invalid JSON records: {e}")))?;
    let serde_json::Value::Array(records) = document else {
        return Err(BridgeError::construction("records must be a JSON array"));
    };
    records
        .iter()
        .enumerate()
        .map(|(i, record)| parse_record(i + 1, record, columns))
        .collect()
}

impl Provider for Records {
    type Cursor = RecordsCursor;

    fn construct(args: &Arguments) -> Result<Self> {
        args.check_known(KNOWN_ARGUMENTS)?;
        let columns = parse_columns(args.require("columns")?)?;

        let rows = match (args.get("data"), args.get("file")) {
            (Some(data), None) => parse_rows(data, &columns)?,
            (None, Some(path)) => {
                let json = fs::read_to_string(path).map_err(|e| {
                    BridgeError::construction(format!("cannot read records file '{path}': {e}"))
                })?;
                parse_rows(&json, &columns)?
            }
            (Some(_), Some(_)) => {
                return Err(BridgeError::construction(
                    "arguments 'data' and 'file' are mutually exclusive",
                ));
            }
            (None, None) => {
                return Err(BridgeError::construction(
                    "one of the arguments 'data' or 'file' is required",
                ));
            }
        };

        let planner = ColumnPlanner::new(rows.len() as i64)
            .filter(ColumnFilter::equality(ROWID, ROWID_EQ_BIT).unique().omit())
            .ordered_by(ROWID, Some(ROWID_ASC_BIT), None);

        debug!(
            table = args.table(),
            columns = columns.len(),
            rows = rows.len(),
            "records loaded"
        );
        Ok(Records {
            table: args.table().to_string(),
            columns,
            rows: Arc::new(rows),
            planner,
        })
    }

    fn schema(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| format!("\"{c}\"")).collect();
        format!("CREATE TABLE x({})", columns.join(", "))
    }

    fn options(&self) -> ProviderOptions {
        ProviderOptions::default().direct_only()
    }

    fn plan(&self, request: &PlanRequest) -> Result<PlanOutcome> {
        self.planner.plan(request)
    }

    fn open(&self) -> Result<RecordsCursor> {
        Ok(RecordsCursor {
            rows: Arc::clone(&self.rows),
            position: 0,
            end: 0,
        })
    }

    fn destroy(&mut self) -> Result<()> {
        debug!(table = %self.table, "records table dropped");
        Ok(())
    }
}

/// Cursor over a shared snapshot of the loaded rows.
#[derive(Debug, Clone)]
pub struct RecordsCursor {
    rows: Rows,
    position: usize,
    end: usize,
}

impl Cursor for RecordsCursor {
    fn filter(&mut self, args: &[Value], plan: &ChosenPlan<'_>) -> Result<()> {
        self.position = 0;
        self.end = self.rows.len();
        if !plan.id.contains(ROWID_EQ_BIT) {
            return Ok(());
        }
        let Some(target) = args.first() else {
            return Err(BridgeError::execution("rowid lookup without an argument"));
        };
        // Anything that is not an in-range integer matches nothing.
        match target.as_f64().filter(|f| f.fract() == 0.0 && *f >= 1.0) {
            Some(rowid) if (rowid as usize) <= self.rows.len() => {
                self.position = rowid as usize - 1;
                self.end = self.position + 1;
            }
            _ => self.end = 0,
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        self.position += 1;
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.position >= self.end
    }

    fn column(&self, index: usize) -> Result<Value> {
        self.rows
            .get(self.position)
            .and_then(|row| row.get(index))
            .cloned()
            .ok_or_else(|| BridgeError::execution(format!("no column {index}")))
    }

    fn row_identity(&self) -> Result<i64> {
        Ok(self.position as i64 + 1)
    }
}
