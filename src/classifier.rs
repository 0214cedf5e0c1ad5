//! Classifier - assigns each rollup a performance archetype
//!
//! Classification is two-phase. [`BatchStats`] is computed once over the
//! whole batch (rule 5 compares each row to the batch's average CPA), then
//! every row is run through the ordered rule list against those stats.
//! First matching rule wins; no match means `Neutral`.

use crate::aggregator::AggregateRow;
use crate::error::{InsightError, Result};
use crate::metrics::mean;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Minimum impressions before high CTR with low CVR counts as "hooking".
pub const HOOK_MIN_IMPRESSIONS: f64 = 10_000.0;

/// A row's CPA must exceed the batch average by this factor to be a waster.
pub const WASTE_CPA_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceClass {
    HookingNotConverting,
    TopPerformer,
    LowEngagementGoodQuality,
    Underperformer,
    BudgetWaster,
    Neutral,
}

impl PerformanceClass {
    /// Rule evaluation order. `Neutral` is the fallback, not a rule.
    pub const RULE_ORDER: [PerformanceClass; 5] = [
        PerformanceClass::HookingNotConverting,
        PerformanceClass::TopPerformer,
        PerformanceClass::LowEngagementGoodQuality,
        PerformanceClass::Underperformer,
        PerformanceClass::BudgetWaster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceClass::HookingNotConverting => "hooking-not-converting",
            PerformanceClass::TopPerformer => "top-performer",
            PerformanceClass::LowEngagementGoodQuality => "low-engagement-good-quality",
            PerformanceClass::Underperformer => "underperformer",
            PerformanceClass::BudgetWaster => "budget-waster",
            PerformanceClass::Neutral => "neutral",
        }
    }

    /// Diagnostic strings appended when this class fires.
    pub fn insights(&self) -> &'static [&'static str] {
        match self {
            PerformanceClass::HookingNotConverting => &["High engagement, low conversion"],
            PerformanceClass::TopPerformer => &["High engagement and high conversion"],
            PerformanceClass::LowEngagementGoodQuality => {
                &["Low engagement, but clicks convert well"]
            }
            PerformanceClass::Underperformer => &["Low engagement and low conversion"],
            PerformanceClass::BudgetWaster => &["High spend with CPA well above the batch average"],
            PerformanceClass::Neutral => &[],
        }
    }

    /// Action strings appended when this class fires.
    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            PerformanceClass::HookingNotConverting => &[
                "Review the landing page experience",
                "Check that the creative matches the offer",
            ],
            PerformanceClass::TopPerformer => &[
                "Scale budget while CPA stays profitable",
                "Reuse as a template for new creatives",
            ],
            PerformanceClass::LowEngagementGoodQuality => &[
                "Improve the creative hook",
                "Test new formats to lift click-through",
            ],
            PerformanceClass::Underperformer => &[
                "Pause or rework the creative",
                "Review audience targeting",
            ],
            PerformanceClass::BudgetWaster => &[
                "Cut budget or pause",
                "Move spend to lower-CPA entities",
            ],
            PerformanceClass::Neutral => &[],
        }
    }
}

impl fmt::Display for PerformanceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named classification knobs; each may be overridden on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    #[serde(rename = "highCTR")]
    pub high_ctr: f64,
    #[serde(rename = "lowCTR")]
    pub low_ctr: f64,
    #[serde(rename = "highCVR")]
    pub high_cvr: f64,
    #[serde(rename = "lowCVR")]
    pub low_cvr: f64,
    #[serde(rename = "highSpendThreshold")]
    pub high_spend_threshold: f64,
    #[serde(rename = "minConversions")]
    pub min_conversions: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            high_ctr: 2.0,
            low_ctr: 0.5,
            high_cvr: 3.0,
            low_cvr: 1.0,
            high_spend_threshold: 100.0,
            min_conversions: 5.0,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<()> {
        let knobs = [
            ("highCTR", self.high_ctr),
            ("lowCTR", self.low_ctr),
            ("highCVR", self.high_cvr),
            ("lowCVR", self.low_cvr),
            ("highSpendThreshold", self.high_spend_threshold),
            ("minConversions", self.min_conversions),
        ];
        if let Some((name, value)) = knobs.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(InsightError::Config(format!("{} must be non-negative, got {}", name, value)));
        }
        if self.low_ctr > self.high_ctr {
            return Err(InsightError::Config("lowCTR is above highCTR".to_string()));
        }
        if self.low_cvr > self.high_cvr {
            return Err(InsightError::Config("lowCVR is above highCVR".to_string()));
        }
        Ok(())
    }
}

/// Cross-row statistics, computed once per classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Mean CPA over rows with at least `minConversions`; `None` when no row qualifies.
    pub average_cpa: Option<f64>,
    pub qualifying_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedRow {
    #[serde(flatten)]
    pub row: AggregateRow,
    pub performance_class: PerformanceClass,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

pub struct Classifier {
    thresholds: ThresholdConfig,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

impl Classifier {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Phase one: batch statistics over every row in this pass.
    pub fn batch_stats(&self, rows: &[AggregateRow]) -> BatchStats {
        let cpas: Vec<f64> = rows
            .iter()
            .filter(|r| r.conversions >= self.thresholds.min_conversions)
            .map(|r| r.cpa)
            .collect();

        BatchStats {
            average_cpa: if cpas.is_empty() { None } else { Some(mean(&cpas)) },
            qualifying_rows: cpas.len(),
        }
    }

    fn rule_holds(&self, class: PerformanceClass, row: &AggregateRow, stats: &BatchStats) -> bool {
        let t = &self.thresholds;
        match class {
            PerformanceClass::HookingNotConverting => {
                row.impressions > HOOK_MIN_IMPRESSIONS && row.ctr > t.high_ctr && row.cvr < t.low_cvr
            }
            PerformanceClass::TopPerformer => row.ctr > t.high_ctr && row.cvr > t.high_cvr,
            PerformanceClass::LowEngagementGoodQuality => row.ctr < t.low_ctr && row.cvr > t.high_cvr,
            PerformanceClass::Underperformer => row.ctr < t.low_ctr && row.cvr < t.low_cvr,
            PerformanceClass::BudgetWaster => match stats.average_cpa {
                Some(avg) => row.spend > t.high_spend_threshold && row.cpa > avg * WASTE_CPA_FACTOR,
                None => false,
            },
            PerformanceClass::Neutral => false,
        }
    }

    /// First rule in `RULE_ORDER` whose condition holds, else `Neutral`.
    pub fn archetype(&self, row: &AggregateRow, stats: &BatchStats) -> PerformanceClass {
        PerformanceClass::RULE_ORDER
            .iter()
            .copied()
            .find(|class| self.rule_holds(*class, row, stats))
            .unwrap_or(PerformanceClass::Neutral)
    }

    /// Phase two: label one row against precomputed batch stats.
    pub fn classify_row(&self, row: &AggregateRow, stats: &BatchStats) -> ClassifiedRow {
        let class = self.archetype(row, stats);
        ClassifiedRow {
            row: row.clone(),
            performance_class: class,
            insights: class.insights().iter().map(|s| s.to_string()).collect(),
            recommendations: class.recommendations().iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn classify(&self, rows: &[AggregateRow]) -> Vec<ClassifiedRow> {
        let stats = self.batch_stats(rows);
        debug!(
            "Classifying {} rows (average CPA {:?} over {} qualifying rows)",
            rows.len(),
            stats.average_cpa,
            stats.qualifying_rows
        );
        rows.iter().map(|r| self.classify_row(r, &stats)).collect()
    }
}
