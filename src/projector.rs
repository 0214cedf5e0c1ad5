//! Record Projector - applies a confirmed mapping to raw rows
//!
//! Numeric cells are coerced leniently (currency symbols, thousands
//! separators and percent signs are stripped). Anything that still fails to
//! parse, or parses to a negative/non-finite value, becomes 0.0, so a bad
//! cell never fails the upload.

use crate::error::{InsightError, Result};
use crate::schema::{CanonicalField, CanonicalRecord, CellValue, ColumnMapping, RawRecord};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.fZ"];

/// Spreadsheet serial day numbers in this range are treated as dates (1954..2119).
const SERIAL_DATE_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=80_000.0;

/// Parse a metric cell. Never fails: unusable input is 0.0.
pub fn coerce_number(cell: Option<&CellValue>) -> f64 {
    let value = match cell {
        Some(CellValue::Number(n)) => *n,
        Some(CellValue::Text(s)) => parse_lenient(s).unwrap_or(0.0),
        Some(CellValue::Empty) | None => 0.0,
    };
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn parse_lenient(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '%' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parse a dimension cell, falling back to `placeholder` when blank.
pub fn coerce_text(cell: Option<&CellValue>, placeholder: &str) -> String {
    match cell {
        Some(CellValue::Text(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(CellValue::Number(n)) if n.is_finite() => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        _ => placeholder.to_string(),
    }
}

pub fn coerce_date(cell: Option<&CellValue>) -> Option<NaiveDate> {
    match cell? {
        CellValue::Text(s) => parse_date(s),
        CellValue::Number(n) if SERIAL_DATE_RANGE.contains(n) => {
            // Spreadsheet epoch, accounting for the 1900 leap-year bug.
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            epoch.checked_add_signed(Duration::days(n.trunc() as i64))
        }
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            // "2024-03-01 - 2024-03-07" style ranges: keep the start.
            s.get(..10).and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        })
}

pub struct RecordProjector;

impl RecordProjector {
    /// Project one raw row. Unmapped fields keep their defaults.
    pub fn project_row(&self, row: &RawRecord, mapping: &ColumnMapping) -> CanonicalRecord {
        let cell = |field: CanonicalField| mapping.column_for(field).and_then(|c| row.get(c));
        let text = |field: CanonicalField| {
            coerce_text(cell(field), field.placeholder().unwrap_or_default())
        };

        CanonicalRecord {
            campaign: text(CanonicalField::Campaign),
            ad_group: text(CanonicalField::AdGroup),
            creative: text(CanonicalField::Creative),
            spend: coerce_number(cell(CanonicalField::Spend)),
            impressions: coerce_number(cell(CanonicalField::Impressions)),
            clicks: coerce_number(cell(CanonicalField::Clicks)),
            conversions: coerce_number(cell(CanonicalField::Conversions)),
            date: coerce_date(cell(CanonicalField::Date)),
        }
    }

    /// Project every row, preserving order.
    ///
    /// Fails only when nothing was supplied or a required metric is unmapped.
    pub fn project(&self, rows: &[RawRecord], mapping: &ColumnMapping) -> Result<Vec<CanonicalRecord>> {
        if rows.is_empty() {
            return Err(InsightError::EmptyInput("no rows to project".to_string()));
        }
        mapping.ensure_required()?;

        let records: Vec<CanonicalRecord> = rows.iter().map(|r| self.project_row(r, mapping)).collect();
        debug!("Projected {} rows onto the standard schema", records.len());
        Ok(records)
    }
}
