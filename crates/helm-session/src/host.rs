use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use helm_budget::TokenBudgeter;
use helm_gateway::{LLMGateway, PromptRequest};
use helm_ledger::LedgerClient;
use helm_sandbox::{SandboxError, TurnSandbox};
use helm_supervisor::CognitiveStack;
use helm_types::{Metadata, Outcome, Provenance, Scope, ScopeKey, SandboxConfig, Tier};

use crate::error::SessionError;
use crate::turn::{TurnRequest, TurnResult, TurnStatus};

#[derive(Clone, Debug)]
struct SessionState {
    agent_class: String,
    budget_ceiling: u64,
}

/// Top-level entry point a user-facing interface calls once per turn. Owns
/// no cognitive logic itself — it resolves which [`CognitiveStack`] handles
/// a session, wraps the turn in a [`TurnSandbox`], and guarantees a
/// [`TurnResult`] comes back even when every layer below it fails.
pub struct SessionHost {
    sandbox_config: SandboxConfig,
    budgeter: Arc<TokenBudgeter>,
    gateway: Arc<LLMGateway>,
    fallback_ledger: Arc<LedgerClient>,
    provider_id: String,
    stacks: DashMap<String, Arc<CognitiveStack>>,
    sessions: DashMap<String, SessionState>,
}

impl SessionHost {
    pub fn new(
        sandbox_config: SandboxConfig,
        budgeter: Arc<TokenBudgeter>,
        gateway: Arc<LLMGateway>,
        fallback_ledger: Arc<LedgerClient>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            sandbox_config,
            budgeter,
            gateway,
            fallback_ledger,
            provider_id: provider_id.into(),
            stacks: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn register_stack(&self, agent_class: impl Into<String>, stack: Arc<CognitiveStack>) {
        self.stacks.insert(agent_class.into(), stack);
    }

    /// Allocate a session's root budget scope and record which agent class
    /// owns it. Must be called before `handle_turn` for that session.
    pub fn open_session(
        &self,
        session_id: impl Into<String>,
        agent_class: impl Into<String>,
        budget_ceiling: u64,
    ) {
        let session_id = session_id.into();
        self.budgeter
            .allocate_root(ScopeKey::session(&session_id), budget_ceiling);
        self.sessions.insert(
            session_id,
            SessionState {
                agent_class: agent_class.into(),
                budget_ceiling,
            },
        );
    }

    /// Never returns `Err` — every internal failure is folded into a
    /// `TurnResult` with `status: Failure` (or the more specific status the
    /// failure implies) so the caller always gets a well-formed result.
    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResult {
        let started = Instant::now();

        let Some(state) = self.sessions.get(&request.session_id).map(|s| s.clone()) else {
            return TurnResult::rejected("unknown session", elapsed_ms(started));
        };

        let sandbox = match TurnSandbox::enter(
            &self.sandbox_config,
            request.session_id.clone(),
            request.declared_outputs.clone(),
        ) {
            Ok(sandbox) => sandbox,
            Err(err) => {
                return TurnResult::failure(format!("sandbox entry failed: {err}"), elapsed_ms(started));
            }
        };

        let stack = self.stacks.get(&state.agent_class).map(|s| s.clone());

        let mut result = match stack {
            Some(stack) => match stack.handle_turn(&request.session_id, &request.user_message).await {
                Ok(outcome) => TurnResult {
                    status: TurnStatus::Success,
                    response: Some(outcome.response_text),
                    tokens_used: outcome.tokens_used,
                    ledger_entry_ids: outcome.wo_ids,
                    error: if outcome.degraded {
                        Some("degraded: quality gate did not pass".to_string())
                    } else {
                        None
                    },
                    duration_ms: elapsed_ms(started),
                },
                Err(err) => match self
                    .degrade(&request.session_id, &request.user_message, &err.to_string())
                    .await
                {
                    Ok(text) => TurnResult {
                        status: TurnStatus::Success,
                        response: Some(text),
                        tokens_used: helm_types::TokensUsed::default(),
                        ledger_entry_ids: vec![],
                        error: Some(format!("degraded after stack error: {err}")),
                        duration_ms: elapsed_ms(started),
                    },
                    Err(degrade_err) => TurnResult::failure(
                        format!("stack failed ({err}) and fallback degrade also failed ({degrade_err})"),
                        elapsed_ms(started),
                    ),
                },
            },
            None => match self
                .degrade(&request.session_id, &request.user_message, "no stack registered for agent class")
                .await
            {
                Ok(text) => TurnResult {
                    status: TurnStatus::Success,
                    response: Some(text),
                    tokens_used: helm_types::TokensUsed::default(),
                    ledger_entry_ids: vec![],
                    error: Some("degraded: no cognitive stack registered".to_string()),
                    duration_ms: elapsed_ms(started),
                },
                Err(err) => TurnResult::failure(format!("no stack registered and degrade failed: {err}"), elapsed_ms(started)),
            },
        };

        match sandbox.verify_and_log(&self.fallback_ledger).await {
            Ok(_) => {}
            Err(SandboxError::CapabilityViolation { missing, undeclared, .. }) => {
                result.status = TurnStatus::Failure;
                result.error = Some(format!(
                    "capability violation: missing={missing:?} undeclared={undeclared:?}"
                ));
            }
            Err(err) => {
                result.status = TurnStatus::Failure;
                result.error = Some(format!("sandbox verification error: {err}"));
            }
        }

        result.duration_ms = elapsed_ms(started);
        result
    }

    async fn degrade(&self, session_id: &str, user_message: &str, reason: &str) -> Result<String, SessionError> {
        let scope = ScopeKey::session(session_id);
        let remaining = self.budgeter.check(&scope)?;
        let response = self
            .gateway
            .route(PromptRequest {
                prompt: user_message.to_string(),
                contract_id: "degraded-direct".to_string(),
                scope_key: scope,
                tier: Tier::Ho1,
                provider_id: self.provider_id.clone(),
                requested_tokens: remaining.min(500),
                timeout_seconds: 30,
            })
            .await?;

        let mut metadata = Metadata {
            provenance: Provenance {
                session_id: Some(session_id.to_string()),
                ..Default::default()
            },
            scope: Scope { tier: Tier::Ho1 },
            ..Default::default()
        };
        metadata.outcome = Outcome {
            status: Some(format!("{:?}", response.outcome).to_lowercase()),
            error: Some(reason.to_string()),
            ..Default::default()
        };
        self.fallback_ledger.append("DEGRADED", metadata).await?;

        Ok(response.content)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
