use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Clone, Debug)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: Usage,
    pub finish_reason: String,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider call failed: {0}")]
    Failed(String),
}

/// The seam between the gateway and whatever model backend is actually
/// wired up. Implementations live outside the core runtime; only
/// [`MockProvider`] ships here, for tests and `DEV_MODE` local development.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send(&self, prompt: &str, contract_id: &str, dev_mode: bool) -> Result<ProviderResponse, ProviderError>;
}

/// A deterministic provider for tests: returns a fixed response, estimating
/// token usage the same way the attention budget does (`chars / 4`), or
/// fails every call if `fail` is set (to drive circuit-breaker tests).
pub struct MockProvider {
    pub fixed_response: String,
    pub fail: bool,
}

impl MockProvider {
    pub fn responding(content: impl Into<String>) -> Self {
        Self {
            fixed_response: content.into(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fixed_response: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn send(&self, prompt: &str, _contract_id: &str, _dev_mode: bool) -> Result<ProviderResponse, ProviderError> {
        if self.fail {
            return Err(ProviderError::Failed("mock provider configured to fail".to_string()));
        }
        Ok(ProviderResponse {
            content: self.fixed_response.clone(),
            usage: Usage {
                input_tokens: (prompt.len() as u64 / 4).max(1),
                output_tokens: (self.fixed_response.len() as u64 / 4).max(1),
            },
            finish_reason: "stop".to_string(),
            error: None,
        })
    }
}
