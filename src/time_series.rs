//! Time-series bucketing for trend analysis
//!
//! Groups dated records by calendar period instead of by entity. Counters
//! are summed as in the aggregator, but `ctr`, `cvr` and `cpa` are the mean
//! of per-record ratios within the bucket, not ratios of the sums, so the
//! two paths disagree for multi-row buckets. `cpc` and `cpm` come from the
//! sums.

use crate::aggregator::AggregateRow;
use crate::error::{InsightError, Result};
use crate::metrics::{self, mean, Totals};
use crate::schema::CanonicalRecord;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl Granularity {
    /// Sortable period key: ISO date, the week's Sunday, or `YYYY-MM`.
    pub fn period_key(&self, date: NaiveDate) -> String {
        match self {
            Granularity::Daily => date.format("%Y-%m-%d").to_string(),
            Granularity::Weekly => week_start(date).format("%Y-%m-%d").to_string(),
            Granularity::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for Granularity {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Granularity::Daily),
            "weekly" | "week" => Ok(Granularity::Weekly),
            "monthly" | "month" => Ok(Granularity::Monthly),
            other => Err(InsightError::Config(format!("unknown granularity '{}'", other))),
        }
    }
}

/// Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

#[derive(Default)]
struct Bucket {
    totals: Totals,
    ctrs: Vec<f64>,
    cvrs: Vec<f64>,
    cpas: Vec<f64>,
}

pub struct TimeSeriesBucketer;

impl TimeSeriesBucketer {
    /// One row per period, ascending. Undated records are skipped; if none
    /// carry a date the input is treated as empty.
    pub fn bucket(&self, records: &[CanonicalRecord], granularity: Granularity) -> Result<Vec<AggregateRow>> {
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

        for record in records {
            let Some(date) = record.date else {
                continue;
            };
            let bucket = buckets.entry(granularity.period_key(date)).or_default();
            bucket
                .totals
                .add(record.spend, record.impressions, record.clicks, record.conversions);
            bucket.ctrs.push(metrics::ctr(record.clicks, record.impressions));
            bucket.cvrs.push(metrics::cvr(record.conversions, record.clicks));
            bucket.cpas.push(metrics::cpa(record.spend, record.conversions));
        }

        if buckets.is_empty() {
            return Err(InsightError::EmptyInput("no dated records to bucket".to_string()));
        }
        debug!("Bucketed {} records into {} {} periods", records.len(), buckets.len(), granularity);

        Ok(buckets
            .into_iter()
            .map(|(key, b)| {
                let row_count = b.ctrs.len();
                AggregateRow {
                    ctr: mean(&b.ctrs),
                    cvr: mean(&b.cvrs),
                    cpa: mean(&b.cpas),
                    ..AggregateRow::from_totals(key, b.totals, row_count)
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(date: &str, spend: f64, impressions: f64, clicks: f64, conversions: f64) -> CanonicalRecord {
        CanonicalRecord {
            spend,
            impressions,
            clicks,
            conversions,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
            ..CanonicalRecord::default()
        }
    }

    #[test]
    fn test_week_starts_on_sunday() {
        // 2024-03-06 is a Wednesday.
        let wed = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        assert_eq!(week_start(wed), NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        let sun = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        assert_eq!(week_start(sun), sun);
    }

    #[test]
    fn test_period_keys() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        assert_eq!(Granularity::Daily.period_key(d), "2024-03-06");
        assert_eq!(Granularity::Weekly.period_key(d), "2024-03-03");
        assert_eq!(Granularity::Monthly.period_key(d), "2024-03");
    }

    #[test]
    fn test_ratios_are_mean_of_record_ratios() {
        let records = vec![
            dated("2024-03-04", 10.0, 1000.0, 10.0, 1.0),
            dated("2024-03-05", 30.0, 3000.0, 60.0, 2.0),
        ];
        let rows = TimeSeriesBucketer.bucket(&records, Granularity::Weekly).unwrap();
        assert_eq!(rows.len(), 1);
        let w = &rows[0];
        assert_eq!(w.group_key, "2024-03-03");
        assert_eq!(w.impressions, 4000.0);
        // (1.0 + 2.0) / 2, not 70 / 4000.
        assert!((w.ctr - 1.5).abs() < 1e-9);
        // (10 + 15) / 2
        assert!((w.cpa - 12.5).abs() < 1e-9);
        // cpc from sums: 40 / 70
        assert!((w.cpc - 40.0 / 70.0).abs() < 1e-9);
        assert_eq!(w.row_count, 2);
    }

    #[test]
    fn test_ascending_and_skips_undated() {
        let mut records = vec![
            dated("2024-02-10", 1.0, 10.0, 1.0, 0.0),
            dated("2024-01-15", 2.0, 10.0, 1.0, 0.0),
            dated("2024-02-01", 3.0, 10.0, 1.0, 0.0),
        ];
        records.push(CanonicalRecord::default());

        let rows = TimeSeriesBucketer.bucket(&records, Granularity::Monthly).unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.group_key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-02"]);
        assert_eq!(rows[1].spend, 4.0);
        assert_eq!(rows.iter().map(|r| r.row_count).sum::<usize>(), 3);
    }

    #[test]
    fn test_no_dates_is_empty_input() {
        let err = TimeSeriesBucketer
            .bucket(&[CanonicalRecord::default()], Granularity::Daily)
            .unwrap_err();
        assert!(matches!(err, InsightError::EmptyInput(_)));
    }

    #[test]
    fn test_granularity_parsing() {
        assert_eq!("Monthly".parse::<Granularity>().unwrap(), Granularity::Monthly);
        assert!("hourly".parse::<Granularity>().is_err());
    }
}
