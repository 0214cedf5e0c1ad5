//! Engine configuration: classifier thresholds, semantic matcher settings and
//! the default trend granularity. Loaded from a JSON file or the environment.

use crate::classifier::ThresholdConfig;
use crate::error::{InsightError, Result};
use crate::time_series::Granularity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl MatcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: ThresholdConfig,
    pub matcher: MatcherConfig,
    pub granularity: Granularity,
}

impl EngineConfig {
    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.thresholds.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `ADINSIGHT_*` variables (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`. Split out so tests don't touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let t = &mut self.thresholds;
        override_parsed(&lookup, "ADINSIGHT_HIGH_CTR", &mut t.high_ctr)?;
        override_parsed(&lookup, "ADINSIGHT_LOW_CTR", &mut t.low_ctr)?;
        override_parsed(&lookup, "ADINSIGHT_HIGH_CVR", &mut t.high_cvr)?;
        override_parsed(&lookup, "ADINSIGHT_LOW_CVR", &mut t.low_cvr)?;
        override_parsed(&lookup, "ADINSIGHT_HIGH_SPEND", &mut t.high_spend_threshold)?;
        override_parsed(&lookup, "ADINSIGHT_MIN_CONVERSIONS", &mut t.min_conversions)?;
        override_parsed(&lookup, "ADINSIGHT_GRANULARITY", &mut self.granularity)?;
        override_parsed(&lookup, "ADINSIGHT_MATCHER_TIMEOUT_MS", &mut self.matcher.timeout_ms)?;

        if let Some(model) = lookup("ADINSIGHT_MATCHER_MODEL") {
            self.matcher.model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.matcher.api_key = Some(key);
        }

        self.thresholds.validate()
    }
}

fn override_parsed<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| InsightError::Config(format!("{} has invalid value '{}'", key, raw)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides_single_knob() {
        let vars = env(&[("ADINSIGHT_HIGH_CTR", "2.5"), ("ADINSIGHT_GRANULARITY", "monthly")]);
        let mut config = EngineConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.thresholds.high_ctr, 2.5);
        assert_eq!(config.thresholds.low_ctr, 0.5);
        assert_eq!(config.granularity, Granularity::Monthly);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let vars = env(&[("ADINSIGHT_MIN_CONVERSIONS", "five")]);
        let mut config = EngineConfig::default();
        let err = config.apply_env(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, InsightError::Config(_)));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"thresholds": {"highSpendThreshold": 250}, "granularity": "weekly"}"#)
                .unwrap();
        assert_eq!(config.thresholds.high_spend_threshold, 250.0);
        assert_eq!(config.thresholds.high_cvr, 3.0);
        assert_eq!(config.granularity, Granularity::Weekly);
        assert_eq!(config.matcher.timeout_ms, 5000);
    }
}
