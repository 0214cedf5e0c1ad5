use crate::config::MatcherConfig;
use crate::error::{InsightError, Result};
use crate::schema::CanonicalField;
use crate::semantic_matcher::{SemanticCandidate, SemanticMatcher};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DUMMY_API_KEY: &str = "dummy-api-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnSuggestionResponse {
    #[serde(default)]
    candidates: Vec<RawCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCandidate {
    field: String,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

/// OpenAI-compatible chat client used as the semantic column matcher.
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &MatcherConfig) -> Self {
        Self {
            api_key: config
                .api_key
                .clone()
                .unwrap_or_else(|| DUMMY_API_KEY.to_string()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            http: reqwest::Client::new(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.api_key == DUMMY_API_KEY
    }

    fn build_prompt(column: &str) -> String {
        let fields: Vec<String> = CanonicalField::ALL
            .iter()
            .map(|f| format!("- {} ({})", f.as_str(), f.label()))
            .collect();

        format!(
            r#"You map spreadsheet columns from advertising platform exports onto a standard schema.
Standard fields:
{}

Column header: "{}"

Return JSON in this exact format, best candidate first, at most 3 candidates:
{{
  "candidates": [
    {{"field": "spend", "confidence": 0.85, "reasoning": "Amount charged by the platform"}}
  ]
}}

Use an empty list if no field fits. Only return the JSON, no other text."#,
            fields.join("\n"),
            column
        )
    }

    fn parse_candidates(content: &str) -> Result<Vec<SemanticCandidate>> {
        let trimmed = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let response: ColumnSuggestionResponse = serde_json::from_str(trimmed)
            .map_err(|e| InsightError::Matcher(format!("Failed to parse LLM response: {}", e)))?;

        Ok(response
            .candidates
            .into_iter()
            .filter_map(|c| {
                CanonicalField::parse(&c.field).map(|field| SemanticCandidate {
                    field,
                    confidence: c.confidence.clamp(0.0, 1.0),
                    reasoning: c.reasoning,
                })
            })
            .collect())
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a precise JSON-only responder. Always return valid JSON, no other text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
            "max_tokens": 300
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Matcher(format!("LLM API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InsightError::Matcher(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| InsightError::Matcher("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl SemanticMatcher for LlmClient {
    async fn suggest(&self, column: &str) -> Result<Vec<SemanticCandidate>> {
        // Without a key there is nothing to ask.
        if self.is_offline() {
            return Ok(Vec::new());
        }

        let response = self.call_llm(&Self::build_prompt(column)).await?;
        Self::parse_candidates(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candidates_drops_unknown_fields() {
        let content = r#"```json
{"candidates": [
  {"field": "spend", "confidence": 0.9, "reasoning": "money"},
  {"field": "revenue", "confidence": 0.8},
  {"field": "adGroup", "confidence": 1.4}
]}
```"#;
        let candidates = LlmClient::parse_candidates(content).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].field, CanonicalField::Spend);
        assert_eq!(candidates[1].field, CanonicalField::AdGroup);
        assert_eq!(candidates[1].confidence, 1.0);
    }

    #[test]
    fn test_parse_candidates_rejects_prose() {
        let err = LlmClient::parse_candidates("I think it is spend").unwrap_err();
        assert!(matches!(err, InsightError::Matcher(_)));
    }

    #[test]
    fn test_prompt_lists_every_field() {
        let prompt = LlmClient::build_prompt("Amt Spent");
        for field in CanonicalField::ALL {
            assert!(prompt.contains(field.as_str()));
        }
        assert!(prompt.contains("\"Amt Spent\""));
    }

    #[tokio::test]
    async fn test_offline_client_suggests_nothing() {
        let client = LlmClient::new(DUMMY_API_KEY.to_string());
        assert!(client.suggest("Whatever").await.unwrap().is_empty());
    }
}
