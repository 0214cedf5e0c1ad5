//! Column Normalizer - infers which source column feeds each canonical field
//!
//! Two local strategies are tried in order:
//! 1. Pattern strategy: per-field ordered regex fragments, first match on the
//!    highest-priority fragment wins, assigned columns leave the pool.
//! 2. Keyword scoring: substring tests give each column a score per field;
//!    the best score >= 0.7 wins, anything lower is left unmapped.
//!
//! Columns still unplaced can be sent to a [`SemanticMatcher`]. That call is
//! bounded by a timeout and on any failure the local proposal is returned.

use crate::error::{InsightError, Result};
use crate::schema::{CanonicalField, ColumnMapping};
use crate::semantic_matcher::SemanticMatcher;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use strsim::jaro_winkler;
use tracing::{debug, info, warn};

/// Fields are matched in this order so metric columns such as "Ad Spend"
/// are claimed before the generic dimension patterns run.
const EVALUATION_ORDER: [CanonicalField; 8] = [
    CanonicalField::Spend,
    CanonicalField::Impressions,
    CanonicalField::Clicks,
    CanonicalField::Conversions,
    CanonicalField::Date,
    CanonicalField::AdGroup,
    CanonicalField::Campaign,
    CanonicalField::Creative,
];

const PATTERN_CONFIDENCE: f64 = 0.9;
const EXACT_CONFIDENCE: f64 = 1.0;

struct FieldPatterns {
    field: CanonicalField,
    patterns: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl FieldPatterns {
    fn new(field: CanonicalField, patterns: &[&str], exclude: &[&str]) -> Self {
        Self {
            field,
            patterns: patterns.iter().map(|p| ci_regex(p)).collect(),
            exclude: exclude.iter().map(|p| ci_regex(p)).collect(),
        }
    }

    fn is_excluded(&self, column: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(column))
    }
}

fn ci_regex(pattern: &str) -> Regex {
    // Patterns are compile-time literals.
    Regex::new(&format!("(?i){}", pattern)).expect("invalid column pattern")
}

lazy_static! {
    static ref FIELD_PATTERNS: Vec<FieldPatterns> = vec![
        FieldPatterns::new(
            CanonicalField::Spend,
            &[r"^spend$", r"amount.?spent", r"spend", r"spent", r"^cost$", r"cost"],
            &[r"\bper\b", r"/", r"\bcp[acm]\b", r"roas"],
        ),
        FieldPatterns::new(
            CanonicalField::Impressions,
            &[r"^impressions?$", r"impression", r"\bimpr"],
            &[r"\bper\b", r"\bcpm\b", r"cost", r"share"],
        ),
        FieldPatterns::new(
            CanonicalField::Clicks,
            &[r"^clicks?$", r"link.?clicks?", r"clicks?"],
            &[r"rate", r"\bctr\b", r"\bper\b", r"\bcpc\b", r"cost", r"through"],
        ),
        FieldPatterns::new(
            CanonicalField::Conversions,
            &[
                r"^conversions?$",
                r"purchases?",
                r"conversions?",
                r"results?",
                r"orders?",
                r"leads?",
                r"acquisitions?",
            ],
            &[r"cost", r"\bper\b", r"rate", r"value", r"roas", r"\bcpa\b", r"type"],
        ),
        FieldPatterns::new(
            CanonicalField::Date,
            &[r"^date$", r"^day$", r"reporting.?starts?", r"date", r"^day\b"],
            &[r"\bend", r"stops?"],
        ),
        FieldPatterns::new(CanonicalField::AdGroup, &[r"ad.?group", r"ad.?set"], &[]),
        FieldPatterns::new(
            CanonicalField::Campaign,
            &[r"^campaign$", r"campaign.?name", r"campaign", r"\bcamp\b"],
            &[],
        ),
        FieldPatterns::new(
            CanonicalField::Creative,
            &[r"^ads?$", r"ad.?name", r"creative", r"\bads?\b"],
            &[r"ad.?group", r"ad.?set"],
        ),
    ];
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").expect("invalid regex");
}

/// Keyword table for the scoring strategy, highest-scoring entries first.
fn keyword_scores(field: CanonicalField) -> &'static [(&'static str, f64)] {
    match field {
        CanonicalField::Spend => &[("spend", 0.8), ("spent", 0.8), ("cost", 0.8), ("budget", 0.8)],
        CanonicalField::Impressions => &[("impression", 0.8), ("impr", 0.75)],
        CanonicalField::Clicks => &[("click", 0.8)],
        CanonicalField::Conversions => &[
            ("purchase", 0.8),
            ("conversion", 0.8),
            ("order", 0.8),
            ("result", 0.75),
            ("lead", 0.7),
        ],
        CanonicalField::Date => &[("date", 0.8), ("day", 0.7)],
        CanonicalField::AdGroup => &[
            ("ad set", 0.9),
            ("adset", 0.9),
            ("ad group", 0.9),
            ("adgroup", 0.9),
        ],
        CanonicalField::Campaign => &[("campaign", 0.8), ("camp", 0.7)],
        CanonicalField::Creative => &[("creative", 0.8), ("ad name", 0.8)],
    }
}

/// Aliases used to rank suggestions for columns nothing could place.
fn aliases(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::Campaign => &["campaign", "campaign name"],
        CanonicalField::AdGroup => &["ad set", "ad group", "ad set name"],
        CanonicalField::Creative => &["ad", "ad name", "creative"],
        CanonicalField::Spend => &["spend", "cost", "amount spent"],
        CanonicalField::Impressions => &["impressions", "impr"],
        CanonicalField::Clicks => &["clicks", "link clicks"],
        CanonicalField::Conversions => &["conversions", "purchases", "results"],
        CanonicalField::Date => &["date", "day", "reporting starts"],
    }
}

/// True when `field`'s exclusion list rejects `column` (ratio and rate columns).
fn excluded_for(field: CanonicalField, column: &str) -> bool {
    FIELD_PATTERNS
        .iter()
        .find(|p| p.field == field)
        .map_or(false, |p| p.is_excluded(column))
}

/// Lowercased, punctuation collapsed to single spaces.
fn normalize_column(column: &str) -> String {
    NON_ALNUM
        .replace_all(&column.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Scoring-strategy verdict for one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScore {
    pub column: String,
    /// `None` when the best score stayed below the threshold.
    pub field: Option<CanonicalField>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub column: String,
    pub field: CanonicalField,
    pub score: f64,
}

/// Output of `infer_mapping`: a proposal for the caller to review and confirm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingProposal {
    pub mapping: ColumnMapping,
    /// Source column -> confidence of its assignment.
    pub confidence: BTreeMap<String, f64>,
    /// Source columns left without a canonical field, in source order.
    pub unmapped: Vec<String>,
    pub suggestions: Vec<MappingSuggestion>,
    pub missing_required: Vec<CanonicalField>,
}

impl MappingProposal {
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }

    /// Accept the proposal as-is; fails if a required metric is still unmapped.
    pub fn into_confirmed(self) -> Result<ColumnMapping> {
        if self.missing_required.is_empty() {
            Ok(self.mapping)
        } else {
            Err(InsightError::UnmappedRequiredField(self.missing_required))
        }
    }
}

/// Column Normalizer - maps arbitrary spreadsheet headers onto the standard schema
pub struct ColumnNormalizer {
    /// Minimum keyword score for the scoring strategy to assign a field
    pub score_threshold: f64,
    /// Minimum similarity for an entry in `suggestions`
    pub suggestion_threshold: f64,
    pub max_suggestions: usize,
}

impl Default for ColumnNormalizer {
    fn default() -> Self {
        Self {
            score_threshold: 0.7,
            suggestion_threshold: 0.5,
            max_suggestions: 3,
        }
    }
}

impl ColumnNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pattern strategy only: hard picks, no confidence.
    pub fn match_patterns(&self, columns: &[String], known: &[CanonicalField]) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        let mut taken: HashSet<&str> = HashSet::new();

        for field_patterns in FIELD_PATTERNS.iter() {
            if known.contains(&field_patterns.field) {
                continue;
            }
            let hit = field_patterns.patterns.iter().find_map(|re| {
                columns.iter().find(|c| {
                    !taken.contains(c.as_str())
                        && re.is_match(c)
                        && !field_patterns.is_excluded(c)
                })
            });
            if let Some(column) = hit {
                debug!("Pattern match: '{}' -> {}", column, field_patterns.field);
                taken.insert(column.as_str());
                mapping.set(field_patterns.field, column.clone());
            }
        }

        mapping
    }

    /// Scoring strategy for a single column.
    pub fn score_column(&self, column: &str) -> ColumnScore {
        let normalized = normalize_column(column);
        let mut best: Option<(CanonicalField, f64)> = None;

        for field in EVALUATION_ORDER {
            if excluded_for(field, column) {
                continue;
            }
            let score = if normalized == normalize_column(field.as_str())
                || normalized == normalize_column(field.label())
            {
                EXACT_CONFIDENCE
            } else {
                keyword_scores(field)
                    .iter()
                    .filter(|(kw, _)| normalized.contains(kw))
                    .map(|(_, s)| *s)
                    .fold(0.0, f64::max)
            };
            if score > best.map(|(_, s)| s).unwrap_or(0.0) {
                best = Some((field, score));
            }
        }

        match best {
            Some((field, score)) if score >= self.score_threshold => ColumnScore {
                column: column.to_string(),
                field: Some(field),
                score,
            },
            other => ColumnScore {
                column: column.to_string(),
                field: None,
                score: other.map(|(_, s)| s).unwrap_or(0.0),
            },
        }
    }

    /// Scoring strategy over every column, for UI review.
    pub fn score_columns(&self, columns: &[String]) -> Vec<ColumnScore> {
        columns.iter().map(|c| self.score_column(c)).collect()
    }

    pub fn infer_mapping(&self, columns: &[String]) -> MappingProposal {
        self.infer_mapping_with_known(columns, &[])
    }

    /// Infer a mapping, skipping canonical fields the caller already has.
    pub fn infer_mapping_with_known(
        &self,
        columns: &[String],
        known: &[CanonicalField],
    ) -> MappingProposal {
        let mut mapping = self.match_patterns(columns, known);
        let mut confidence = BTreeMap::new();

        for (field, column) in mapping.iter() {
            let score = self.score_column(column);
            let value = if score.field == Some(field) && score.score >= EXACT_CONFIDENCE {
                EXACT_CONFIDENCE
            } else {
                PATTERN_CONFIDENCE
            };
            confidence.insert(column.to_string(), value);
        }

        for column in columns {
            if mapping.field_for_column(column).is_some() {
                continue;
            }
            let score = self.score_column(column);
            if let Some(field) = score.field {
                if !known.contains(&field) && !mapping.contains(field) {
                    debug!("Keyword match: '{}' -> {} ({:.2})", column, field, score.score);
                    mapping.set(field, column.clone());
                    confidence.insert(column.clone(), score.score);
                }
            }
        }

        let proposal = self.finish(columns, known, mapping, confidence);
        info!(
            "Inferred mapping for {} of {} columns ({} unmapped, missing required: {:?})",
            proposal.mapping.len(),
            columns.len(),
            proposal.unmapped.len(),
            proposal.missing_required
        );
        proposal
    }

    /// Local inference, then consult `matcher` for columns that are still
    /// unplaced while required fields are missing.
    ///
    /// Errors and timeouts from the matcher are logged and the local
    /// proposal is returned unchanged.
    pub async fn infer_mapping_with_matcher(
        &self,
        columns: &[String],
        known: &[CanonicalField],
        matcher: &dyn SemanticMatcher,
        timeout: Duration,
    ) -> MappingProposal {
        let proposal = self.infer_mapping_with_known(columns, known);
        if proposal.is_complete() || proposal.unmapped.is_empty() {
            return proposal;
        }

        match tokio::time::timeout(timeout, self.consult_matcher(columns, known, &proposal, matcher))
            .await
        {
            Ok(Ok(improved)) => improved,
            Ok(Err(e)) => {
                warn!("Semantic matcher failed, keeping pattern mapping: {}", e);
                proposal
            }
            Err(_) => {
                warn!(
                    "Semantic matcher timed out after {:?}, keeping pattern mapping",
                    timeout
                );
                proposal
            }
        }
    }

    async fn consult_matcher(
        &self,
        columns: &[String],
        known: &[CanonicalField],
        proposal: &MappingProposal,
        matcher: &dyn SemanticMatcher,
    ) -> Result<MappingProposal> {
        let mut mapping = proposal.mapping.clone();
        let mut confidence = proposal.confidence.clone();

        for column in &proposal.unmapped {
            if mapping.missing_required().iter().all(|f| known.contains(f)) {
                break;
            }
            let mut candidates = matcher.suggest(column).await?;
            candidates.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let accepted = candidates.into_iter().find(|c| {
                c.confidence >= self.score_threshold
                    && !known.contains(&c.field)
                    && !mapping.contains(c.field)
            });
            if let Some(candidate) = accepted {
                info!(
                    "Semantic match: '{}' -> {} ({:.2})",
                    column, candidate.field, candidate.confidence
                );
                mapping.set(candidate.field, column.clone());
                confidence.insert(column.clone(), candidate.confidence.min(1.0));
            }
        }

        Ok(self.finish(columns, known, mapping, confidence))
    }

    fn finish(
        &self,
        columns: &[String],
        known: &[CanonicalField],
        mapping: ColumnMapping,
        confidence: BTreeMap<String, f64>,
    ) -> MappingProposal {
        let unmapped: Vec<String> = columns
            .iter()
            .filter(|c| mapping.field_for_column(c).is_none())
            .cloned()
            .collect();

        let open_fields: Vec<CanonicalField> = CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| !mapping.contains(*f) && !known.contains(f))
            .collect();

        let suggestions = unmapped
            .iter()
            .flat_map(|c| self.suggest_for(c, &open_fields))
            .collect();

        let missing_required = mapping
            .missing_required()
            .into_iter()
            .filter(|f| !known.contains(f))
            .collect();

        MappingProposal {
            mapping,
            confidence,
            unmapped,
            suggestions,
            missing_required,
        }
    }

    fn suggest_for(&self, column: &str, open_fields: &[CanonicalField]) -> Vec<MappingSuggestion> {
        let normalized = normalize_column(column);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<MappingSuggestion> = open_fields
            .iter()
            .map(|field| {
                let score = aliases(*field)
                    .iter()
                    .map(|alias| jaro_winkler(&normalized, alias))
                    .fold(0.0, f64::max);
                MappingSuggestion {
                    column: column.to_string(),
                    field: *field,
                    score,
                }
            })
            .filter(|s| s.score >= self.suggestion_threshold)
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.max_suggestions);
        ranked
    }
}
