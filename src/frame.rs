//! In-memory table for SOLARGIS_JSON documents.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::io;
use std::path::Path;

pub const DATETIME_COLUMN: &str = "DATETIME";

/// Rows indexed by timestamp; one JSON value per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    index: Vec<DateTime<FixedOffset>>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TimeSeriesFrame {
    /// Splits a SOLARGIS_JSON document into its `data` table and the remaining metadata.
    ///
    /// `data` may be a list of records or an object of equally long column arrays.
    pub fn from_solargis_json(document: Value) -> Result<(Self, Value)> {
        let Value::Object(mut metadata) = document else {
            bail!("SOLARGIS_JSON document is not a JSON object");
        };
        let data = metadata
            .shift_remove("data")
            .ok_or_else(|| anyhow!("SOLARGIS_JSON document has no `data` member"))?;

        let frame = match data {
            Value::Array(records) => Self::from_records(records)?,
            Value::Object(columns) => Self::from_columns(columns)?,
            other => bail!("unsupported `data` member: {}", type_name(&other)),
        };
        Ok((frame, Value::Object(metadata)))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<(Self, Value)> {
        let document: Value =
            serde_json::from_slice(bytes).context("payload is not valid JSON")?;
        Self::from_solargis_json(document)
    }

    fn from_records(records: Vec<Value>) -> Result<Self> {
        let records = records
            .into_iter()
            .map(|record| match record {
                Value::Object(obj) => Ok(obj),
                other => bail!("data record is {}, expected object", type_name(&other)),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for k in record.keys() {
                if k != DATETIME_COLUMN && !columns.contains(k) {
                    columns.push(k.clone());
                }
            }
        }

        let mut index = Vec::with_capacity(records.len());
        let mut rows = Vec::with_capacity(records.len());
        for (i, mut record) in records.into_iter().enumerate() {
            let ts = record
                .remove(DATETIME_COLUMN)
                .ok_or_else(|| anyhow!("record {} has no {}", i, DATETIME_COLUMN))?;
            index.push(parse_timestamp_value(&ts).with_context(|| format!("record {}", i))?);
            rows.push(
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect(),
            );
        }

        Ok(Self {
            index,
            columns,
            rows,
        })
    }

    fn from_columns(mut data: Map<String, Value>) -> Result<Self> {
        let timestamps = match data.shift_remove(DATETIME_COLUMN) {
            Some(Value::Array(v)) => v,
            Some(other) => bail!(
                "{} column is {}, expected array",
                DATETIME_COLUMN,
                type_name(&other)
            ),
            None => bail!("data has no {} column", DATETIME_COLUMN),
        };
        let index = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| parse_timestamp_value(ts).with_context(|| format!("row {}", i)))
            .collect::<Result<Vec<_>>>()?;

        let mut columns = Vec::with_capacity(data.len());
        let mut values = Vec::with_capacity(data.len());
        for (name, column) in data {
            let Value::Array(column) = column else {
                bail!("column {} is {}, expected array", name, type_name(&column));
            };
            if column.len() != index.len() {
                bail!(
                    "column {} has {} value(s), {} has {}",
                    name,
                    column.len(),
                    DATETIME_COLUMN,
                    index.len()
                );
            }
            columns.push(name);
            values.push(column);
        }

        let rows = (0..index.len())
            .map(|r| values.iter().map(|col| col[r].clone()).collect())
            .collect();

        Ok(Self {
            index,
            columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<FixedOffset>] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row(&self, i: usize) -> Option<&[Value]> {
        self.rows.get(i).map(Vec::as_slice)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let c = self.columns.iter().position(|n| n == name)?;
        Some(self.rows.iter().map(|row| &row[c]).collect())
    }

    /// Numeric view of a column; non-numeric cells become `None`.
    pub fn column_f64(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name)
            .map(|cells| cells.into_iter().map(Value::as_f64).collect())
    }

    /// Renders the frame as CSV with the timestamp column first.
    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        self.write_records(&mut wtr)?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| anyhow!("failed to flush CSV output: {}", e.error()))?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        self.write_records(&mut wtr)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn write_records<W: io::Write>(&self, wtr: &mut csv::Writer<W>) -> Result<()> {
        wtr.write_record(
            std::iter::once(DATETIME_COLUMN).chain(self.columns.iter().map(String::as_str)),
        )?;
        for (ts, row) in self.index.iter().zip(&self.rows) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(ts.to_rfc3339());
            record.extend(row.iter().map(cell_text));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_timestamp_value(v: &Value) -> Result<DateTime<FixedOffset>> {
    match v {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            // Yearly series sometimes carry a bare year.
            let year = n
                .as_i64()
                .and_then(|y| i32::try_from(y).ok())
                .ok_or_else(|| anyhow!("unsupported numeric timestamp {}", n))?;
            parse_timestamp(&year.to_string())
        }
        other => bail!("timestamp is {}, expected string", type_name(other)),
    }
}

/// Accepts RFC 3339, naive date-times (read as UTC), dates, `YYYY-MM` and `YYYY`.
pub fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(utc(naive));
        }
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01-01", s), "%Y-%m-%d"))
        .map_err(|_| anyhow!("unrecognised timestamp {:?}", s))?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("unrecognised timestamp {:?}", s))?;
    Ok(utc(naive))
}

fn utc(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&naive).into()
}
