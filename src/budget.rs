use crate::classifier::{ClassifiedRow, PerformanceClass};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Rows need at least this many conversions to take part in reallocation.
pub const MIN_CONVERSIONS_FOR_BUDGET: f64 = 5.0;

/// Share of eligible rows considered on each end of the ranking.
pub const CANDIDATE_SHARE: f64 = 0.3;

pub const MAX_SCALE_INCREASE: f64 = 0.5;
pub const MIN_SCALE_INCREASE: f64 = 0.2;
pub const CUT_SHARE: f64 = 0.5;
pub const REALLOCATION_TARGETS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetActionType {
    Increase,
    Decrease,
    Reallocate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAction {
    #[serde(rename = "type")]
    pub action_type: BudgetActionType,
    pub target: String,
    pub current_spend: f64,
    /// Signed spend delta in currency units.
    pub suggested_change: f64,
    pub reason: String,
    pub priority: Priority,
}

/// `(ctr * cvr) / max(cpa, 1)`; higher is better.
pub fn performance_score(row: &ClassifiedRow) -> f64 {
    (row.row.ctr * row.row.cvr) / row.row.cpa.max(1.0)
}

pub struct BudgetAdvisor;

impl BudgetAdvisor {
    /// Propose scale/cut/reallocate actions.
    ///
    /// Eligible rows are ranked by [`performance_score`]; the top and bottom
    /// `ceil(n * 0.3)` are candidates. Only top candidates already labelled
    /// `top-performer` get an increase, only bottom candidates labelled
    /// `underperformer` or `budget-waster` get a decrease. A single
    /// reallocation of half of every cut row's spend follows any cut, aimed
    /// at up to three scale candidates that were not themselves cut.
    pub fn recommend(&self, rows: &[ClassifiedRow]) -> Vec<BudgetAction> {
        let mut ranked: Vec<(&ClassifiedRow, f64)> = rows
            .iter()
            .filter(|r| r.row.conversions >= MIN_CONVERSIONS_FOR_BUDGET)
            .map(|r| (r, performance_score(r)))
            .collect();
        if ranked.is_empty() {
            return Vec::new();
        }
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let candidates = (ranked.len() as f64 * CANDIDATE_SHARE).ceil() as usize;
        let scale = &ranked[..candidates];
        let cut = &ranked[ranked.len() - candidates..];

        let mut actions = Vec::new();

        for (rank, (row, score)) in scale.iter().enumerate() {
            if row.performance_class != PerformanceClass::TopPerformer {
                continue;
            }
            let pct = scale_increase(rank, candidates);
            actions.push(BudgetAction {
                action_type: BudgetActionType::Increase,
                target: row.row.group_key.clone(),
                current_spend: row.row.spend,
                suggested_change: row.row.spend * pct,
                reason: format!(
                    "Top performer (score {:.2}, CPA {:.2}): scale budget by {:.0}%",
                    score,
                    row.row.cpa,
                    pct * 100.0
                ),
                priority: if rank == 0 { Priority::High } else { Priority::Medium },
            });
        }

        let mut freed = 0.0;
        let mut cut_spend = 0.0;
        let mut cut_keys: HashSet<&str> = HashSet::new();
        for (row, score) in cut.iter().rev() {
            let reason = match row.performance_class {
                PerformanceClass::Underperformer => format!(
                    "Underperformer (score {:.2}): cut budget by 50% or pause",
                    score
                ),
                PerformanceClass::BudgetWaster => format!(
                    "Budget waster (CPA {:.2}): cut budget by 50% or pause",
                    row.row.cpa
                ),
                _ => continue,
            };
            let change = row.row.spend * CUT_SHARE;
            freed += change;
            cut_spend += row.row.spend;
            cut_keys.insert(row.row.group_key.as_str());
            actions.push(BudgetAction {
                action_type: BudgetActionType::Decrease,
                target: row.row.group_key.clone(),
                current_spend: row.row.spend,
                suggested_change: -change,
                reason,
                priority: Priority::High,
            });
        }

        // With a single eligible row it is both the scale and the cut candidate.
        let targets: Vec<&str> = scale
            .iter()
            .map(|(r, _)| r.row.group_key.as_str())
            .filter(|key| !cut_keys.contains(key))
            .take(REALLOCATION_TARGETS)
            .collect();
        let cut_count = cut_keys.len();
        if cut_count > 0 && !targets.is_empty() {
            actions.push(BudgetAction {
                action_type: BudgetActionType::Reallocate,
                target: targets.join(", "),
                current_spend: cut_spend,
                suggested_change: freed,
                reason: format!(
                    "Move {:.2} freed from {} cut entit{} to the strongest performers",
                    freed,
                    cut_count,
                    if cut_count == 1 { "y" } else { "ies" }
                ),
                priority: Priority::Medium,
            });
        }

        info!(
            "Budget advisor: {} eligible rows, {} candidates per side, {} actions",
            ranked.len(),
            candidates,
            actions.len()
        );
        actions
    }
}

/// Best-ranked candidate gets +50%, the last one +20%, linear in between.
fn scale_increase(rank: usize, candidates: usize) -> f64 {
    if candidates <= 1 {
        return MAX_SCALE_INCREASE;
    }
    let step = (MAX_SCALE_INCREASE - MIN_SCALE_INCREASE) / (candidates - 1) as f64;
    MAX_SCALE_INCREASE - step * rank as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateRow;
    use crate::metrics::Totals;

    fn classified(
        key: &str,
        spend: f64,
        impressions: f64,
        clicks: f64,
        conversions: f64,
        class: PerformanceClass,
    ) -> ClassifiedRow {
        let mut totals = Totals::default();
        totals.add(spend, impressions, clicks, conversions);
        ClassifiedRow {
            row: AggregateRow::from_totals(key.to_string(), totals, 1),
            performance_class: class,
            insights: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Ten eligible rows with strictly decreasing scores: r0 best, r9 worst.
    fn ten_rows() -> Vec<ClassifiedRow> {
        (0..10)
            .map(|i| {
                let class = match i {
                    0 | 1 => PerformanceClass::TopPerformer,
                    8 => PerformanceClass::Underperformer,
                    9 => PerformanceClass::BudgetWaster,
                    _ => PerformanceClass::Neutral,
                };
                // Same clicks and conversions, rising spend: falling score.
                classified(&format!("r{}", i), 100.0 * (i + 1) as f64, 10_000.0, 100.0, 10.0, class)
            })
            .collect()
    }

    #[test]
    fn test_three_candidates_per_side_of_ten() {
        let actions = BudgetAdvisor.recommend(&ten_rows());

        let increases: Vec<&BudgetAction> = actions
            .iter()
            .filter(|a| a.action_type == BudgetActionType::Increase)
            .collect();
        let decreases: Vec<&BudgetAction> = actions
            .iter()
            .filter(|a| a.action_type == BudgetActionType::Decrease)
            .collect();

        assert_eq!(increases.len(), 2);
        assert_eq!(increases[0].target, "r0");
        assert!((increases[0].suggested_change - 50.0).abs() < 1e-9);
        assert!((increases[1].suggested_change - 200.0 * 0.35).abs() < 1e-9);

        assert_eq!(decreases.len(), 2);
        assert_eq!(decreases[0].target, "r9");
        assert_eq!(decreases[1].target, "r8");
        assert!((decreases[0].suggested_change + 500.0).abs() < 1e-9);

        let realloc = actions.last().unwrap();
        assert_eq!(realloc.action_type, BudgetActionType::Reallocate);
        assert_eq!(realloc.target, "r0, r1, r2");
        assert!((realloc.suggested_change - (500.0 + 450.0)).abs() < 1e-9);
    }

    #[test]
    fn test_no_reallocation_without_cuts() {
        let mut rows = ten_rows();
        for row in rows.iter_mut() {
            if row.performance_class != PerformanceClass::TopPerformer {
                row.performance_class = PerformanceClass::Neutral;
            }
        }
        let actions = BudgetAdvisor.recommend(&rows);
        assert!(actions.iter().all(|a| a.action_type == BudgetActionType::Increase));
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn test_ineligible_rows_are_ignored() {
        let rows = vec![
            classified("few", 1000.0, 10_000.0, 5.0, 4.0, PerformanceClass::BudgetWaster),
            classified("ok", 100.0, 10_000.0, 300.0, 20.0, PerformanceClass::TopPerformer),
        ];
        let actions = BudgetAdvisor.recommend(&rows);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target, "ok");
        assert!(BudgetAdvisor.recommend(&rows[..1]).is_empty());
    }

    #[test]
    fn test_score_floors_cpa_at_one() {
        let row = classified("cheap", 1.0, 1_000.0, 50.0, 10.0, PerformanceClass::Neutral);
        // ctr 5, cvr 20, cpa 0.1 -> divided by 1
        assert!((performance_score(&row) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_row_is_not_reallocated_to_itself() {
        let rows = vec![classified("only", 500.0, 100_000.0, 100.0, 5.0, PerformanceClass::Underperformer)];
        let actions = BudgetAdvisor.recommend(&rows);

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, BudgetActionType::Decrease);
        assert_eq!(actions[0].target, "only");
        assert!((actions[0].suggested_change + 250.0).abs() < 1e-9);
    }
}
