use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use helm_budget::TokenBudgeter;
use helm_ledger::LedgerClient;
use helm_types::config::GatewayConfig;
use helm_types::{ContextFingerprint, Metadata, Outcome, Provenance, ScopeKey, Tier, TokensUsed};

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::error::GatewayError;
use crate::provider::{Provider, Usage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    Success,
    Rejected,
    Timeout,
    Error,
}

#[derive(Clone, Debug)]
pub struct PromptRequest {
    pub prompt: String,
    pub contract_id: String,
    pub scope_key: ScopeKey,
    pub tier: Tier,
    pub provider_id: String,
    pub requested_tokens: u64,
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct PromptResponse {
    pub outcome: PromptOutcome,
    pub content: String,
    pub usage: Usage,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub ledger_entry_ids: Vec<String>,
}

impl PromptResponse {
    fn rejected(code: &str, message: impl Into<String>, ledger_entry_ids: Vec<String>) -> Self {
        Self {
            outcome: PromptOutcome::Rejected,
            content: String::new(),
            usage: Usage::default(),
            error_code: Some(code.to_string()),
            error_message: Some(message.into()),
            ledger_entry_ids,
        }
    }
}

/// The single LLM gateway every tier routes through. Owns the per-provider
/// circuit breakers and debits the caller's token budget on every completed
/// (non-rejected) call. One instance is constructed per caller-tier ledger,
/// since `PROMPT_SENT`/`PROMPT_RECEIVED` entries land in the caller's ledger.
pub struct LLMGateway {
    config: GatewayConfig,
    budgeter: Arc<TokenBudgeter>,
    ledger: Arc<LedgerClient>,
    providers: DashMap<String, Arc<dyn Provider>>,
    breakers: CircuitBreakerRegistry,
}

impl LLMGateway {
    pub fn new(config: GatewayConfig, budgeter: Arc<TokenBudgeter>, ledger: Arc<LedgerClient>) -> Self {
        let breakers = CircuitBreakerRegistry::new(config.clone());
        Self {
            config,
            budgeter,
            ledger,
            providers: DashMap::new(),
            breakers,
        }
    }

    pub fn register_provider(&self, provider_id: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(provider_id.into(), provider);
    }

    fn metadata(&self, tier: Tier, scope_key: &ScopeKey) -> Metadata {
        Metadata {
            provenance: Provenance {
                session_id: Some(scope_key.session_id.clone()),
                work_order_id: scope_key.wo_id.clone(),
                ..Default::default()
            },
            scope: helm_types::Scope { tier },
            ..Default::default()
        }
    }

    async fn log(&self, event_type: &str, metadata: Metadata) -> Result<String, GatewayError> {
        self.ledger
            .append(event_type, metadata)
            .await
            .map_err(|e| GatewayError::LedgerWriteFailed(e.to_string()))
    }

    /// The 10-step route pipeline. All rejection paths return `content=""`;
    /// callers must inspect `outcome`, never `content` alone.
    pub async fn route(&self, request: PromptRequest) -> Result<PromptResponse, GatewayError> {
        // 1. Validate request shape.
        if request.prompt.trim().is_empty() {
            return Ok(PromptResponse::rejected("INVALID_INPUT", "prompt must not be empty", vec![]));
        }

        // 2. Auth — skipped in dev mode. No external auth backend is wired
        // into this reference implementation; a real deployment plugs one in
        // here before step 3.
        let _auth_skipped = self.config.dev_mode;

        // 3. Budget check against request.scope_key.
        let remaining = self.budgeter.check(&request.scope_key)?;
        if remaining < request.requested_tokens {
            return Ok(PromptResponse::rejected(
                "BUDGET_EXHAUSTED",
                format!("requested {} exceeds remaining {remaining}", request.requested_tokens),
                vec![],
            ));
        }

        // 4. Pre-log PROMPT_SENT with prompt hash and scope.
        let prompt_hash = helm_hash::hash_string(&request.prompt);
        let mut sent_metadata = self.metadata(request.tier, &request.scope_key);
        sent_metadata.context_fingerprint = ContextFingerprint {
            context_hash: Some(prompt_hash),
            prompt_pack_id: Some(request.contract_id.clone()),
            ..Default::default()
        };
        let sent_id = self.log("PROMPT_SENT", sent_metadata).await?;

        // 5. Circuit breaker.
        if !self.breakers.allow_request(&request.provider_id) {
            let mut metadata = self.metadata(request.tier, &request.scope_key);
            metadata.outcome = Outcome {
                status: Some("rejected".to_string()),
                error: Some("CIRCUIT_OPEN".to_string()),
                ..Default::default()
            };
            self.log("PROMPT_RECEIVED", metadata).await?;
            return Ok(PromptResponse::rejected("CIRCUIT_OPEN", "provider circuit is open", vec![sent_id]));
        }

        // 6. Dispatch to provider.
        let Some(provider) = self.providers.get(&request.provider_id).map(|p| p.clone()) else {
            return Ok(PromptResponse::rejected(
                "PROVIDER_NOT_FOUND",
                format!("no provider registered for {}", request.provider_id),
                vec![sent_id],
            ));
        };

        // 7. Enforce timeout_seconds.
        let dispatch = tokio::time::timeout(
            Duration::from_secs(request.timeout_seconds),
            provider.send(&request.prompt, &request.contract_id, self.config.dev_mode),
        )
        .await;

        let outcome = match dispatch {
            Err(_elapsed) => {
                self.breakers.record_failure(&request.provider_id);
                let mut metadata = self.metadata(request.tier, &request.scope_key);
                metadata.outcome = Outcome {
                    status: Some("timeout".to_string()),
                    ..Default::default()
                };
                let received_id = self.log("PROMPT_RECEIVED", metadata).await?;
                return Ok(PromptResponse {
                    outcome: PromptOutcome::Timeout,
                    content: String::new(),
                    usage: Usage::default(),
                    error_code: Some("TIMEOUT".to_string()),
                    error_message: Some(format!("provider exceeded {}s", request.timeout_seconds)),
                    ledger_entry_ids: vec![sent_id, received_id],
                });
            }
            Ok(Err(provider_error)) => {
                self.breakers.record_failure(&request.provider_id);
                let mut metadata = self.metadata(request.tier, &request.scope_key);
                metadata.outcome = Outcome {
                    status: Some("error".to_string()),
                    error: Some(provider_error.to_string()),
                    ..Default::default()
                };
                let received_id = self.log("PROMPT_RECEIVED", metadata).await?;
                return Ok(PromptResponse {
                    outcome: PromptOutcome::Error,
                    content: String::new(),
                    usage: Usage::default(),
                    error_code: Some("PROVIDER_ERROR".to_string()),
                    error_message: Some(provider_error.to_string()),
                    ledger_entry_ids: vec![sent_id, received_id],
                });
            }
            Ok(Ok(response)) => response,
        };

        self.breakers.record_success(&request.provider_id);

        // 8. Post-log PROMPT_RECEIVED with token counts and outcome.
        let mut metadata = self.metadata(request.tier, &request.scope_key);
        metadata.outcome = Outcome {
            status: Some("success".to_string()),
            ..Default::default()
        };
        metadata.context_fingerprint = ContextFingerprint {
            tokens_used: TokensUsed {
                input: outcome.usage.input_tokens,
                output: outcome.usage.output_tokens,
            },
            ..Default::default()
        };
        let received_id = self.log("PROMPT_RECEIVED", metadata).await?;

        // 9. Budget debit the actual tokens returned.
        self.budgeter.debit(&request.scope_key, outcome.usage.total())?;

        // 10. Circuit-breaker counters already updated above; return success.
        Ok(PromptResponse {
            outcome: PromptOutcome::Success,
            content: outcome.content,
            usage: outcome.usage,
            error_code: None,
            error_message: None,
            ledger_entry_ids: vec![sent_id, received_id],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::config::LedgerConfig;
    use helm_types::ScopeKey;

    async fn gateway() -> (LLMGateway, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(
            LedgerClient::open(dir.path().join("ho1"), LedgerConfig::default())
                .await
                .unwrap(),
        );
        let budgeter = Arc::new(TokenBudgeter::new());
        (LLMGateway::new(GatewayConfig::default(), budgeter, ledger), dir)
    }

    fn request(scope: ScopeKey) -> PromptRequest {
        PromptRequest {
            prompt: "hello".to_string(),
            contract_id: "contract-1".to_string(),
            scope_key: scope,
            tier: Tier::Ho1,
            provider_id: "mock".to_string(),
            requested_tokens: 10,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn rejects_when_budget_exhausted() {
        let (gw, _dir) = gateway().await;
        let scope = ScopeKey::session("s1");
        gw.budgeter.allocate_root(scope.clone(), 5);
        gw.register_provider("mock", Arc::new(crate::provider::MockProvider::responding("hi")));

        let resp = gw.route(request(scope)).await.unwrap();
        assert_eq!(resp.outcome, PromptOutcome::Rejected);
        assert_eq!(resp.error_code.as_deref(), Some("BUDGET_EXHAUSTED"));
        assert_eq!(resp.content, "");
    }

    #[tokio::test]
    async fn successful_call_debits_actual_usage() {
        let (gw, _dir) = gateway().await;
        let scope = ScopeKey::session("s1");
        gw.budgeter.allocate_root(scope.clone(), 1000);
        gw.register_provider("mock", Arc::new(crate::provider::MockProvider::responding("hi there")));

        let resp = gw.route(request(scope.clone())).await.unwrap();
        assert_eq!(resp.outcome, PromptOutcome::Success);
        assert_eq!(resp.ledger_entry_ids.len(), 2);

        let snapshot = gw.budgeter.snapshot(&scope).unwrap();
        assert_eq!(snapshot.consumed, resp.usage.total());
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let (gw, _dir) = gateway().await;
        let scope = ScopeKey::session("s1");
        gw.budgeter.allocate_root(scope.clone(), 1000);

        let resp = gw.route(request(scope)).await.unwrap();
        assert_eq!(resp.error_code.as_deref(), Some("PROVIDER_NOT_FOUND"));
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_provider_failures() {
        let (gw, _dir) = gateway().await;
        let scope = ScopeKey::session("s1");
        gw.budgeter.allocate_root(scope.clone(), 10_000);
        gw.register_provider("mock", Arc::new(crate::provider::MockProvider::failing()));

        for _ in 0..gw.config.circuit_failure_threshold {
            let resp = gw.route(request(scope.clone())).await.unwrap();
            assert_eq!(resp.outcome, PromptOutcome::Error);
        }

        let resp = gw.route(request(scope)).await.unwrap();
        assert_eq!(resp.error_code.as_deref(), Some("CIRCUIT_OPEN"));
    }
}
