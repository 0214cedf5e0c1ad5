//! End-to-end analysis: projection, multi-level rollups, classification,
//! budget advice and trends, plus the summary handed to the narrative
//! collaborator.

use crate::aggregator::{AggregateRow, Aggregator, GroupingDimension};
use crate::budget::{BudgetAction, BudgetAdvisor};
use crate::classifier::{ClassifiedRow, Classifier, PerformanceClass};
use crate::config::EngineConfig;
use crate::error::{InsightError, Result};
use crate::metrics::Totals;
use crate::projector::RecordProjector;
use crate::schema::{CanonicalRecord, ColumnMapping, RawRecord};
use crate::time_series::{Granularity, TimeSeriesBucketer};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Rollup for one entity level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReport {
    pub dimension: GroupingDimension,
    pub rows: Vec<ClassifiedRow>,
}

/// Account-wide totals and archetype counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    pub record_count: usize,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub ctr: f64,
    pub cvr: f64,
    pub cpa: f64,
    pub cpc: f64,
    pub cpm: f64,
    /// Archetype -> entity count at the most granular available level.
    pub class_counts: BTreeMap<PerformanceClass, usize>,
    pub first_date: Option<chrono::NaiveDate>,
    pub last_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub mapping: ColumnMapping,
    pub summary: OverallSummary,
    /// Campaign, ad set and ad levels, in that order; absent levels are omitted.
    pub levels: Vec<LevelReport>,
    pub skipped_dimensions: Vec<GroupingDimension>,
    pub budget_actions: Vec<BudgetAction>,
    pub granularity: Granularity,
    pub trend: Vec<AggregateRow>,
}

impl AnalysisReport {
    pub fn level(&self, dimension: GroupingDimension) -> Option<&LevelReport> {
        self.levels.iter().find(|l| l.dimension == dimension)
    }
}

pub struct AnalysisEngine {
    classifier: Classifier,
    granularity: Granularity,
}

impl AnalysisEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            classifier: Classifier::new(config.thresholds.clone()),
            granularity: config.granularity,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn run(&self, raw: &[RawRecord], mapping: &ColumnMapping) -> Result<AnalysisReport> {
        let records = RecordProjector.project(raw, mapping)?;
        info!("Analyzing {} records", records.len());

        let mut levels = Vec::new();
        let mut skipped_dimensions = Vec::new();
        for dimension in GroupingDimension::ALL {
            match Aggregator.aggregate(&records, dimension) {
                Ok(rows) => levels.push(LevelReport {
                    dimension,
                    rows: self.classifier.classify(&rows),
                }),
                Err(InsightError::InvalidGroupingDimension(reason)) => {
                    warn!("Skipping {} rollup: {}", dimension, reason);
                    skipped_dimensions.push(dimension);
                }
                Err(e) => return Err(e),
            }
        }

        // Budget moves are made at the most granular level present.
        let finest = levels.last();
        let budget_actions = finest
            .map(|level| BudgetAdvisor.recommend(&level.rows))
            .unwrap_or_default();

        let trend = match TimeSeriesBucketer.bucket(&records, self.granularity) {
            Ok(rows) => rows,
            Err(InsightError::EmptyInput(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let summary = summarize(&records, finest.map(|l| l.rows.as_slice()).unwrap_or(&[]));

        Ok(AnalysisReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            mapping: mapping.clone(),
            summary,
            levels,
            skipped_dimensions,
            budget_actions,
            granularity: self.granularity,
            trend,
        })
    }
}

fn summarize(records: &[CanonicalRecord], classified: &[ClassifiedRow]) -> OverallSummary {
    let mut totals = Totals::default();
    for r in records {
        totals.add(r.spend, r.impressions, r.clicks, r.conversions);
    }

    let class_counts: BTreeMap<PerformanceClass, usize> = classified
        .iter()
        .map(|c| c.performance_class)
        .counts()
        .into_iter()
        .collect();

    let (first_date, last_date) = match records.iter().filter_map(|r| r.date).minmax() {
        itertools::MinMaxResult::NoElements => (None, None),
        itertools::MinMaxResult::OneElement(d) => (Some(d), Some(d)),
        itertools::MinMaxResult::MinMax(a, b) => (Some(a), Some(b)),
    };

    OverallSummary {
        record_count: records.len(),
        spend: totals.spend,
        impressions: totals.impressions,
        clicks: totals.clicks,
        conversions: totals.conversions,
        ctr: totals.ctr(),
        cvr: totals.cvr(),
        cpa: totals.cpa(),
        cpc: totals.cpc(),
        cpm: totals.cpm(),
        class_counts,
        first_date,
        last_date,
    }
}

/// Run the full analysis with `config`.
pub fn analyze(raw: &[RawRecord], mapping: &ColumnMapping, config: &EngineConfig) -> Result<AnalysisReport> {
    AnalysisEngine::new(config).run(raw, mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CanonicalField, CellValue};

    fn row(campaign: &str, ad: &str, spend: f64, impressions: f64, clicks: f64, conversions: f64) -> RawRecord {
        let mut r = RawRecord::new();
        r.insert("Campaign".into(), CellValue::Text(campaign.into()));
        r.insert("Ad".into(), CellValue::Text(ad.into()));
        r.insert("Spend".into(), CellValue::Number(spend));
        r.insert("Impressions".into(), CellValue::Number(impressions));
        r.insert("Clicks".into(), CellValue::Number(clicks));
        r.insert("Conversions".into(), CellValue::Number(conversions));
        r
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping::from_assignments(vec![
            ("Campaign", Some(CanonicalField::Campaign)),
            ("Ad", Some(CanonicalField::Creative)),
            ("Spend", Some(CanonicalField::Spend)),
            ("Impressions", Some(CanonicalField::Impressions)),
            ("Clicks", Some(CanonicalField::Clicks)),
            ("Conversions", Some(CanonicalField::Conversions)),
        ])
        .unwrap()
    }

    #[test]
    fn test_unmapped_dimension_is_skipped() {
        let raw = vec![
            row("A", "a1", 50.0, 20_000.0, 600.0, 3.0),
            row("B", "b1", 20.0, 5_000.0, 10.0, 0.0),
        ];
        let report = analyze(&raw, &mapping(), &EngineConfig::default()).unwrap();

        assert_eq!(report.skipped_dimensions, vec![GroupingDimension::AdGroup]);
        assert!(report.level(GroupingDimension::Campaign).is_some());
        assert!(report.level(GroupingDimension::Creative).is_some());
        assert!(report.trend.is_empty());
        assert_eq!(report.summary.record_count, 2);
        assert_eq!(report.summary.spend, 70.0);
        assert_eq!(
            report.summary.class_counts.get(&PerformanceClass::HookingNotConverting),
            Some(&1)
        );
    }

    #[test]
    fn test_granularity_override() {
        let mut raw = vec![
            row("A", "a1", 10.0, 1_000.0, 10.0, 1.0),
            row("A", "a1", 20.0, 1_000.0, 10.0, 1.0),
        ];
        raw[0].insert("Day".into(), CellValue::Text("2024-03-04".into()));
        raw[1].insert("Day".into(), CellValue::Text("2024-03-05".into()));
        let mut mapping = mapping();
        mapping.insert(CanonicalField::Date, "Day").unwrap();

        let engine = AnalysisEngine::new(&EngineConfig::default());
        let weekly = engine.run(&raw, &mapping).unwrap();
        assert_eq!(weekly.granularity, Granularity::Weekly);
        assert_eq!(weekly.trend.len(), 1);

        let daily = engine.with_granularity(Granularity::Daily).run(&raw, &mapping).unwrap();
        assert_eq!(daily.granularity, Granularity::Daily);
        let days: Vec<&str> = daily.trend.iter().map(|r| r.group_key.as_str()).collect();
        assert_eq!(days, vec!["2024-03-04", "2024-03-05"]);
    }
}
