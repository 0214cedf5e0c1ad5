use crate::error::{InsightError, Result};
use crate::metrics::Totals;
use crate::schema::{CanonicalField, CanonicalRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Key used when a caller-supplied selector yields nothing.
pub const UNKNOWN_GROUP: &str = "Unknown";

/// Entity level a rollup is grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupingDimension {
    Campaign,
    AdGroup,
    Creative,
}

impl GroupingDimension {
    pub const ALL: [GroupingDimension; 3] = [
        GroupingDimension::Campaign,
        GroupingDimension::AdGroup,
        GroupingDimension::Creative,
    ];

    pub fn field(&self) -> CanonicalField {
        match self {
            GroupingDimension::Campaign => CanonicalField::Campaign,
            GroupingDimension::AdGroup => CanonicalField::AdGroup,
            GroupingDimension::Creative => CanonicalField::Creative,
        }
    }

    pub fn key<'a>(&self, record: &'a CanonicalRecord) -> &'a str {
        record.dimension(self.field()).unwrap_or_default()
    }

    pub fn placeholder(&self) -> &'static str {
        self.field().placeholder().unwrap_or(UNKNOWN_GROUP)
    }
}

impl fmt::Display for GroupingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field().as_str())
    }
}

impl FromStr for GroupingDimension {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "campaign" => Ok(GroupingDimension::Campaign),
            "adgroup" | "adset" | "ad_set" | "ad-set" => Ok(GroupingDimension::AdGroup),
            "creative" | "ad" => Ok(GroupingDimension::Creative),
            other => Err(InsightError::InvalidGroupingDimension(format!(
                "unknown dimension '{}'",
                other
            ))),
        }
    }
}

/// Summary statistics for one group of records sharing a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub group_key: String,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub ctr: f64,
    pub cvr: f64,
    pub cpa: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub row_count: usize,
}

impl AggregateRow {
    /// Row whose ratios are all derived from the summed counters.
    pub fn from_totals(group_key: String, totals: Totals, row_count: usize) -> Self {
        Self {
            group_key,
            spend: totals.spend,
            impressions: totals.impressions,
            clicks: totals.clicks,
            conversions: totals.conversions,
            ctr: totals.ctr(),
            cvr: totals.cvr(),
            cpa: totals.cpa(),
            cpc: totals.cpc(),
            cpm: totals.cpm(),
            row_count,
        }
    }
}

struct Group {
    key: String,
    totals: Totals,
    row_count: usize,
}

pub struct Aggregator;

impl Aggregator {
    /// Roll records up by an entity dimension.
    ///
    /// Fails with `InvalidGroupingDimension` when every record carries the
    /// placeholder for that dimension, i.e. the column was never mapped or is
    /// blank throughout.
    pub fn aggregate(
        &self,
        records: &[CanonicalRecord],
        dimension: GroupingDimension,
    ) -> Result<Vec<AggregateRow>> {
        if records.is_empty() {
            return Err(InsightError::EmptyInput("no records to aggregate".to_string()));
        }
        let placeholder = dimension.placeholder();
        if records.iter().all(|r| dimension.key(r) == placeholder) {
            return Err(InsightError::InvalidGroupingDimension(format!(
                "'{}' is absent from every record",
                dimension
            )));
        }

        self.aggregate_by(records, |r| Some(dimension.key(r).to_string()))
    }

    /// Roll records up by an arbitrary key. `None` keys collapse into one
    /// `"Unknown"` group.
    ///
    /// Output is sorted by summed spend, descending; ties keep the order in
    /// which each key was first seen.
    pub fn aggregate_by<F>(&self, records: &[CanonicalRecord], selector: F) -> Result<Vec<AggregateRow>>
    where
        F: Fn(&CanonicalRecord) -> Option<String>,
    {
        if records.is_empty() {
            return Err(InsightError::EmptyInput("no records to aggregate".to_string()));
        }

        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in records {
            let key = selector(record).unwrap_or_else(|| UNKNOWN_GROUP.to_string());
            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(Group {
                        key,
                        totals: Totals::default(),
                        row_count: 0,
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[slot];
            group
                .totals
                .add(record.spend, record.impressions, record.clicks, record.conversions);
            group.row_count += 1;
        }

        let mut rows: Vec<AggregateRow> = groups
            .into_iter()
            .map(|g| AggregateRow::from_totals(g.key, g.totals, g.row_count))
            .collect();

        // `sort_by` is stable, so equal spend keeps first-seen order.
        rows.sort_by(|a, b| b.spend.partial_cmp(&a.spend).unwrap_or(std::cmp::Ordering::Equal));

        debug!("Aggregated {} records into {} groups", records.len(), rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::UNKNOWN_AD_GROUP;

    fn record(campaign: &str, spend: f64, impressions: f64, clicks: f64, conversions: f64) -> CanonicalRecord {
        CanonicalRecord {
            campaign: campaign.to_string(),
            spend,
            impressions,
            clicks,
            conversions,
            ..CanonicalRecord::default()
        }
    }

    #[test]
    fn test_ratios_come_from_sums() {
        let records = vec![
            record("A", 10.0, 1000.0, 10.0, 1.0),
            record("A", 30.0, 3000.0, 60.0, 2.0),
        ];
        let rows = Aggregator.aggregate(&records, GroupingDimension::Campaign).unwrap();

        assert_eq!(rows.len(), 1);
        let a = &rows[0];
        assert_eq!(a.impressions, 4000.0);
        assert_eq!(a.clicks, 70.0);
        assert!((a.ctr - 1.75).abs() < 1e-9);
        assert!((a.cpa - 40.0 / 3.0).abs() < 1e-9);
        assert!((a.cpm - 10.0).abs() < 1e-9);
        assert_eq!(a.row_count, 2);
    }

    #[test]
    fn test_sorted_by_spend_with_stable_ties() {
        let records = vec![
            record("first", 5.0, 0.0, 0.0, 0.0),
            record("big", 50.0, 0.0, 0.0, 0.0),
            record("second", 5.0, 0.0, 0.0, 0.0),
        ];
        let rows = Aggregator.aggregate(&records, GroupingDimension::Campaign).unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.group_key.as_str()).collect();
        assert_eq!(keys, vec!["big", "first", "second"]);
    }

    #[test]
    fn test_zero_impressions_never_nan() {
        let rows = Aggregator
            .aggregate(&[record("A", 10.0, 0.0, 0.0, 0.0)], GroupingDimension::Campaign)
            .unwrap();
        let a = &rows[0];
        assert_eq!(a.ctr, 0.0);
        assert_eq!(a.cvr, 0.0);
        assert_eq!(a.cpa, 0.0);
        assert_eq!(a.cpc, 0.0);
        assert_eq!(a.cpm, 0.0);
    }

    #[test]
    fn test_partition_covers_every_record_once() {
        let records: Vec<CanonicalRecord> = (0..25)
            .map(|i| record(&format!("c{}", i % 4), i as f64, 100.0, 1.0, 0.0))
            .collect();
        let rows = Aggregator.aggregate(&records, GroupingDimension::Campaign).unwrap();

        assert_eq!(rows.iter().map(|r| r.row_count).sum::<usize>(), records.len());
        for row in &rows {
            let expected = records.iter().filter(|r| r.campaign == row.group_key).count();
            assert_eq!(row.row_count, expected);
        }
    }

    #[test]
    fn test_unknowns_collapse_but_all_unknown_is_invalid() {
        let mut records = vec![record("A", 1.0, 0.0, 0.0, 0.0)];
        records.push(CanonicalRecord::default());
        records.push(CanonicalRecord::default());

        let rows = Aggregator.aggregate(&records, GroupingDimension::Campaign).unwrap();
        assert_eq!(rows.len(), 2);

        let err = Aggregator
            .aggregate(&records, GroupingDimension::AdGroup)
            .unwrap_err();
        assert!(matches!(err, InsightError::InvalidGroupingDimension(_)));
        assert_eq!(GroupingDimension::AdGroup.placeholder(), UNKNOWN_AD_GROUP);
    }

    #[test]
    fn test_empty_input() {
        let err = Aggregator.aggregate(&[], GroupingDimension::Campaign).unwrap_err();
        assert!(matches!(err, InsightError::EmptyInput(_)));
    }

    #[test]
    fn test_custom_selector() {
        let records = vec![
            record("Brand - US", 1.0, 0.0, 0.0, 0.0),
            record("Brand - UK", 2.0, 0.0, 0.0, 0.0),
            record("Promo", 3.0, 0.0, 0.0, 0.0),
        ];
        let rows = Aggregator
            .aggregate_by(&records, |r| r.campaign.split(" - ").nth(1).map(str::to_string))
            .unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.group_key.as_str()).collect();
        assert_eq!(keys, vec![UNKNOWN_GROUP, "UK", "US"]);
    }

    #[test]
    fn test_dimension_parsing() {
        assert_eq!("adSet".parse::<GroupingDimension>().unwrap(), GroupingDimension::AdGroup);
        assert_eq!("Ad".parse::<GroupingDimension>().unwrap(), GroupingDimension::Creative);
        assert!("region".parse::<GroupingDimension>().is_err());
    }
}
