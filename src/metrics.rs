//! Derived ad metrics. Every division guards a zero denominator by returning 0.

pub fn ctr(clicks: f64, impressions: f64) -> f64 {
    if impressions > 0.0 {
        clicks / impressions * 100.0
    } else {
        0.0
    }
}

pub fn cvr(conversions: f64, clicks: f64) -> f64 {
    if clicks > 0.0 {
        conversions / clicks * 100.0
    } else {
        0.0
    }
}

pub fn cpa(spend: f64, conversions: f64) -> f64 {
    if conversions > 0.0 {
        spend / conversions
    } else {
        0.0
    }
}

pub fn cpc(spend: f64, clicks: f64) -> f64 {
    if clicks > 0.0 {
        spend / clicks
    } else {
        0.0
    }
}

pub fn cpm(spend: f64, impressions: f64) -> f64 {
    if impressions > 0.0 {
        spend / impressions * 1000.0
    } else {
        0.0
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Summed raw counters for a group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
}

impl Totals {
    pub fn add(&mut self, spend: f64, impressions: f64, clicks: f64, conversions: f64) {
        self.spend += spend;
        self.impressions += impressions;
        self.clicks += clicks;
        self.conversions += conversions;
    }

    pub fn ctr(&self) -> f64 {
        ctr(self.clicks, self.impressions)
    }

    pub fn cvr(&self) -> f64 {
        cvr(self.conversions, self.clicks)
    }

    pub fn cpa(&self) -> f64 {
        cpa(self.spend, self.conversions)
    }

    pub fn cpc(&self) -> f64 {
        cpc(self.spend, self.clicks)
    }

    pub fn cpm(&self) -> f64 {
        cpm(self.spend, self.impressions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_denominators() {
        assert_eq!(ctr(5.0, 0.0), 0.0);
        assert_eq!(cvr(5.0, 0.0), 0.0);
        assert_eq!(cpa(10.0, 0.0), 0.0);
        assert_eq!(cpc(10.0, 0.0), 0.0);
        assert_eq!(cpm(10.0, 0.0), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_ratios_from_totals() {
        let mut totals = Totals::default();
        totals.add(50.0, 20_000.0, 600.0, 3.0);
        assert!((totals.ctr() - 3.0).abs() < 1e-9);
        assert!((totals.cvr() - 0.5).abs() < 1e-9);
        assert!((totals.cpa() - 50.0 / 3.0).abs() < 1e-9);
        assert!((totals.cpm() - 2.5).abs() < 1e-9);
    }
}
