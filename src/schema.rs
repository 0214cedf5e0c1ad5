//! Standard schema shared by every stage of the pipeline.
//!
//! Raw rows arrive as flat `column -> cell` maps with whatever headers the
//! ad platform exported. Everything downstream of projection works on the
//! fixed-shape [`CanonicalRecord`].

use crate::error::{InsightError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const UNKNOWN_CAMPAIGN: &str = "Unknown Campaign";
pub const UNKNOWN_AD_GROUP: &str = "Unknown Ad Set";
pub const UNKNOWN_CREATIVE: &str = "Unknown Ad";

/// One of the fixed standard field names every source column maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Campaign,
    AdGroup,
    Creative,
    Spend,
    Impressions,
    Clicks,
    Conversions,
    Date,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 8] = [
        CanonicalField::Campaign,
        CanonicalField::AdGroup,
        CanonicalField::Creative,
        CanonicalField::Spend,
        CanonicalField::Impressions,
        CanonicalField::Clicks,
        CanonicalField::Conversions,
        CanonicalField::Date,
    ];

    /// Metrics without which classification is meaningless.
    pub const REQUIRED: [CanonicalField; 4] = [
        CanonicalField::Spend,
        CanonicalField::Impressions,
        CanonicalField::Clicks,
        CanonicalField::Conversions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Campaign => "campaign",
            CanonicalField::AdGroup => "adGroup",
            CanonicalField::Creative => "creative",
            CanonicalField::Spend => "spend",
            CanonicalField::Impressions => "impressions",
            CanonicalField::Clicks => "clicks",
            CanonicalField::Conversions => "conversions",
            CanonicalField::Date => "date",
        }
    }

    /// Human-facing label, used in prompts and suggestions.
    pub fn label(&self) -> &'static str {
        match self {
            CanonicalField::Campaign => "Campaign",
            CanonicalField::AdGroup => "Ad Set",
            CanonicalField::Creative => "Ad",
            CanonicalField::Spend => "Cost",
            CanonicalField::Impressions => "Impressions",
            CanonicalField::Clicks => "Clicks",
            CanonicalField::Conversions => "Purchase",
            CanonicalField::Date => "Date",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    pub fn is_dimension(&self) -> bool {
        matches!(
            self,
            CanonicalField::Campaign | CanonicalField::AdGroup | CanonicalField::Creative
        )
    }

    /// Literal value substituted when a dimension cell is missing.
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            CanonicalField::Campaign => Some(UNKNOWN_CAMPAIGN),
            CanonicalField::AdGroup => Some(UNKNOWN_AD_GROUP),
            CanonicalField::Creative => Some(UNKNOWN_CREATIVE),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().to_lowercase() == lower)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar cell from an uploaded sheet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl CellValue {
    /// Cell from a CSV field; blank strings become `Empty`.
    pub fn from_field(raw: &str) -> Self {
        if raw.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(raw.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::from_field(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One uploaded row, keyed by the source column name.
pub type RawRecord = HashMap<String, CellValue>;

/// Fixed-shape record produced by projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub campaign: String,
    pub ad_group: String,
    pub creative: String,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub date: Option<NaiveDate>,
}

impl Default for CanonicalRecord {
    fn default() -> Self {
        Self {
            campaign: UNKNOWN_CAMPAIGN.to_string(),
            ad_group: UNKNOWN_AD_GROUP.to_string(),
            creative: UNKNOWN_CREATIVE.to_string(),
            spend: 0.0,
            impressions: 0.0,
            clicks: 0.0,
            conversions: 0.0,
            date: None,
        }
    }
}

impl CanonicalRecord {
    /// Value of a dimension field, or `None` for metric/date fields.
    pub fn dimension(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::Campaign => Some(&self.campaign),
            CanonicalField::AdGroup => Some(&self.ad_group),
            CanonicalField::Creative => Some(&self.creative),
            _ => None,
        }
    }
}

/// Confirmed mapping: each canonical field is fed by at most one source column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    fields: BTreeMap<CanonicalField, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the UI's `source column -> canonical field | unmapped` form.
    ///
    /// Two source columns accepted for the same field is a conflict the
    /// caller must resolve before aggregation.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Option<CanonicalField>)>,
        S: Into<String>,
    {
        let mut by_field: BTreeMap<CanonicalField, Vec<String>> = BTreeMap::new();
        for (column, field) in assignments {
            if let Some(field) = field {
                by_field.entry(field).or_default().push(column.into());
            }
        }

        let mut mapping = Self::new();
        for (field, mut columns) in by_field {
            if columns.len() > 1 {
                columns.sort();
                return Err(InsightError::ConflictingMapping { field, columns });
            }
            if let Some(column) = columns.pop() {
                mapping.fields.insert(field, column);
            }
        }
        Ok(mapping)
    }

    /// Map `field` to `column`. Remapping a field to a different column is a conflict.
    pub fn insert(&mut self, field: CanonicalField, column: impl Into<String>) -> Result<()> {
        let column = column.into();
        match self.fields.get(&field) {
            Some(existing) if *existing != column => Err(InsightError::ConflictingMapping {
                field,
                columns: vec![existing.clone(), column],
            }),
            _ => {
                self.fields.insert(field, column);
                Ok(())
            }
        }
    }

    pub(crate) fn set(&mut self, field: CanonicalField, column: impl Into<String>) {
        self.fields.insert(field, column.into());
    }

    pub fn column_for(&self, field: CanonicalField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn field_for_column(&self, column: &str) -> Option<CanonicalField> {
        self.fields
            .iter()
            .find(|(_, c)| c.as_str() == column)
            .map(|(f, _)| *f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        self.fields.iter().map(|(f, c)| (*f, c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn missing_required(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| f.is_required() && !self.fields.contains_key(f))
            .collect()
    }

    pub fn ensure_required(&self) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InsightError::UnmappedRequiredField(missing))
        }
    }
}
