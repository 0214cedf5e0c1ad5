use crate::error::Result;
use crate::schema::CanonicalField;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A canonical field proposed for a source column by an external matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCandidate {
    pub field: CanonicalField,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// External capability that suggests canonical fields for a column name
/// the local strategies could not place (usually a hosted language model).
#[async_trait]
pub trait SemanticMatcher: Send + Sync {
    async fn suggest(&self, column: &str) -> Result<Vec<SemanticCandidate>>;
}
