use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fragment {
    pub source: String,
    pub source_id: String,
    pub content: String,
    pub token_estimate: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl Fragment {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>, content: String, chars_per_token: usize) -> Self {
        let token_estimate = estimate_tokens(&content, chars_per_token);
        Self {
            source: source.into(),
            source_id: source_id.into(),
            content,
            token_estimate,
            relevance_score: None,
        }
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// A short prefix of this fragment's content used by the structuring
    /// stage to spot near-duplicate fragments cheaply before falling back to
    /// a full substring check.
    pub fn hash_prefix(&self, chars_per_token: usize) -> String {
        let _ = chars_per_token;
        helm_hash::hash_string(&self.content)[..16].to_string()
    }
}

pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    let chars_per_token = chars_per_token.max(1);
    text.chars().count().div_ceil(chars_per_token).max(if text.is_empty() { 0 } else { 1 })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Truncated,
    Timeout,
    Empty,
    Skipped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageTrace {
    pub stage: String,
    pub status: StageStatus,
    pub tokens_produced: usize,
    pub queries_executed: usize,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssembledContext {
    pub context_text: String,
    pub context_hash: String,
    pub fragments: Vec<Fragment>,
    pub pipeline_trace: Vec<StageTrace>,
}
