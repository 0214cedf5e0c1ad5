pub mod aggregator;
pub mod analysis;
pub mod budget;
pub mod classifier;
pub mod column_normalizer;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod projector;
pub mod schema;
pub mod semantic_matcher;
pub mod time_series;

pub use aggregator::{AggregateRow, Aggregator, GroupingDimension};
pub use analysis::{analyze, AnalysisEngine, AnalysisReport};
pub use budget::{BudgetAction, BudgetActionType, BudgetAdvisor};
pub use classifier::{ClassifiedRow, Classifier, PerformanceClass, ThresholdConfig};
pub use column_normalizer::{ColumnNormalizer, MappingProposal};
pub use config::EngineConfig;
pub use error::{InsightError, Result};
pub use schema::{CanonicalField, CanonicalRecord, CellValue, ColumnMapping, RawRecord};
pub use semantic_matcher::{SemanticCandidate, SemanticMatcher};
pub use time_series::{Granularity, TimeSeriesBucketer};

// Flat entry points for collaborators that don't need the component structs.

pub fn infer_mapping(source_columns: &[String]) -> MappingProposal {
    ColumnNormalizer::default().infer_mapping(source_columns)
}

pub fn project(raw: &[RawRecord], mapping: &ColumnMapping) -> Result<Vec<CanonicalRecord>> {
    projector::RecordProjector.project(raw, mapping)
}

pub fn aggregate(records: &[CanonicalRecord], dimension: GroupingDimension) -> Result<Vec<AggregateRow>> {
    Aggregator.aggregate(records, dimension)
}

/// Classify with default thresholds when `thresholds` is `None`.
pub fn classify(rows: &[AggregateRow], thresholds: Option<ThresholdConfig>) -> Vec<ClassifiedRow> {
    Classifier::new(thresholds.unwrap_or_default()).classify(rows)
}

pub fn recommend_budget(rows: &[ClassifiedRow]) -> Vec<BudgetAction> {
    BudgetAdvisor.recommend(rows)
}

pub fn bucket_by_time(records: &[CanonicalRecord], granularity: Granularity) -> Result<Vec<AggregateRow>> {
    TimeSeriesBucketer.bucket(records, granularity)
}
