use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use helm_attention::{AttentionRequest, AttentionService};
use helm_budget::TokenBudgeter;
use helm_gateway::{LLMGateway, PromptOutcome, PromptRequest};
use helm_ledger::LedgerClient;
use helm_types::{
    Metadata, Outcome, PromptContract, Provenance, Relational, Scope, ScopeKey, Tier, TokensUsed,
    WoState, WoType, WorkOrder,
};
use helm_workorder::{fail, validate_output, validate_tool_call};

use crate::error::ExecutorError;
use crate::render::render_prompt;
use crate::tool::ToolInvoker;

/// Identity of the agent and session a WO executes under, plus the prior
/// ledger entry this execution's entries should chain off for provenance.
pub struct ExecuteContext {
    pub agent_id: String,
    pub agent_class: String,
    pub framework_id: Option<String>,
    pub provider_id: String,
    pub dispatched_event_id: Option<String>,
    /// The chain's origin entry id (the turn's first `WO_PLANNED`), scoped
    /// with `session_id` so `LedgerQuery` can isolate one chain's HO1 entries.
    pub root_event_id: Option<String>,
}

/// HO1: consumes a `dispatched` work order and drives it to `completed` or
/// `failed`, logging every step to the HO1 ledger. Never returns an `Err`
/// for a WO-level failure — those are folded into `wo.state`/`wo.error` and
/// reported via a successful `Ok(())`. An `Err` here means the executor
/// itself could not run the pipeline (missing contract/tool registration,
/// an infra-level budget/ledger error).
pub struct Executor {
    budgeter: Arc<TokenBudgeter>,
    gateway: Arc<LLMGateway>,
    attention: Arc<AttentionService>,
    ledger: Arc<LedgerClient>,
    contracts: HashMap<String, PromptContract>,
    tools: DashMap<String, Arc<dyn ToolInvoker>>,
}

impl Executor {
    pub fn new(
        budgeter: Arc<TokenBudgeter>,
        gateway: Arc<LLMGateway>,
        attention: Arc<AttentionService>,
        ledger: Arc<LedgerClient>,
        contracts: HashMap<String, PromptContract>,
    ) -> Self {
        Self {
            budgeter,
            gateway,
            attention,
            ledger,
            contracts,
            tools: DashMap::new(),
        }
    }

    pub fn register_tool(&self, name: impl Into<String>, tool: Arc<dyn ToolInvoker>) {
        self.tools.insert(name.into(), tool);
    }

    fn base_metadata(&self, wo: &WorkOrder, ctx: &ExecuteContext) -> Metadata {
        Metadata {
            provenance: Provenance {
                agent_id: Some(ctx.agent_id.clone()),
                agent_class: Some(ctx.agent_class.clone()),
                framework_id: ctx.framework_id.clone(),
                work_order_id: Some(wo.wo_id.clone()),
                session_id: Some(wo.session_id.clone()),
                ..Default::default()
            },
            scope: Scope { tier: Tier::Ho1 },
            relational: Relational {
                parent_event_id: ctx.dispatched_event_id.clone(),
                root_event_id: ctx.root_event_id.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn log(&self, event_type: &str, metadata: Metadata) -> Result<String, ExecutorError> {
        Ok(self.ledger.append(event_type, metadata).await?)
    }

    /// Run `wo` through execution. `wo` must already be `dispatched`.
    pub async fn execute(&self, wo: &mut WorkOrder, ctx: ExecuteContext) -> Result<(), ExecutorError> {
        wo.transition(WoState::Executing)?;
        self.log("WO_EXECUTING", self.base_metadata(wo, &ctx)).await?;

        match wo.wo_type {
            WoType::ToolCall => self.execute_tool(wo, &ctx).await,
            WoType::Classify | WoType::Synthesize | WoType::Execute => self.execute_llm(wo, &ctx).await,
        }
    }

    async fn fail_wo(&self, wo: &mut WorkOrder, ctx: &ExecuteContext, code: &str, message: impl Into<String>) -> Result<(), ExecutorError> {
        let message = message.into();
        fail(wo, code, message.clone())?;
        let mut metadata = self.base_metadata(wo, ctx);
        metadata.outcome = Outcome {
            status: Some("failed".to_string()),
            error: Some(format!("{code}: {message}")),
            ..Default::default()
        };
        self.log("WO_FAILED", metadata).await?;
        Ok(())
    }

    async fn complete_wo(&self, wo: &mut WorkOrder, ctx: &ExecuteContext, output: serde_json::Value) -> Result<(), ExecutorError> {
        wo.transition(WoState::Completed)?;
        wo.output_result = Some(output);
        wo.completed_at = Some(chrono::Utc::now());
        let mut metadata = self.base_metadata(wo, ctx);
        metadata.outcome = Outcome {
            status: Some("completed".to_string()),
            ..Default::default()
        };
        self.log("WO_COMPLETED", metadata).await?;
        Ok(())
    }

    async fn execute_tool(&self, wo: &mut WorkOrder, ctx: &ExecuteContext) -> Result<(), ExecutorError> {
        let tool_name = wo.input_context.user_input.clone();

        if let Err(e) = validate_tool_call(wo, &tool_name) {
            return self.fail_wo(wo, ctx, "TOOL_NOT_ALLOWED", e.to_string()).await;
        }

        let Some(tool) = self.tools.get(&tool_name).map(|t| t.clone()) else {
            return self.fail_wo(wo, ctx, "TOOL_NOT_FOUND", format!("no tool registered for {tool_name}")).await;
        };

        let started = Instant::now();
        let result = tool.invoke(wo).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut metadata = self.base_metadata(wo, ctx);
        match result {
            Ok(value) => {
                metadata.outcome = Outcome {
                    status: Some("success".to_string()),
                    ..Default::default()
                };
                self.log("TOOL_CALL", metadata).await?;
                wo.cost.record_tool_call(elapsed_ms);
                self.complete_wo(wo, ctx, value).await
            }
            Err(e) => {
                metadata.outcome = Outcome {
                    status: Some("error".to_string()),
                    error: Some(e.to_string()),
                    ..Default::default()
                };
                self.log("TOOL_CALL", metadata).await?;
                self.fail_wo(wo, ctx, "TOOL_ERROR", e.to_string()).await
            }
        }
    }

    async fn execute_llm(&self, wo: &mut WorkOrder, ctx: &ExecuteContext) -> Result<(), ExecutorError> {
        let Some(contract_id) = wo.constraints.prompt_contract_id.clone() else {
            return Err(ExecutorError::ContractNotFound("<none>".to_string()));
        };
        let Some(contract) = self.contracts.get(&contract_id).cloned() else {
            return Err(ExecutorError::ContractNotFound(contract_id));
        };

        let call_scope = ScopeKey::call(wo.session_id.clone(), wo.wo_id.clone(), uuid::Uuid::new_v4().to_string());
        let wo_scope = ScopeKey::work_order(wo.session_id.clone(), wo.wo_id.clone());
        let call_budget = self.budgeter.check(&wo_scope)?;
        self.budgeter.allocate(wo_scope, call_scope.clone(), call_budget)?;

        let needs_attention = !contract.required_context.ledger_queries.is_empty()
            || !contract.required_context.framework_refs.is_empty()
            || !contract.required_context.file_refs.is_empty();

        let assembled = if needs_attention {
            let request = AttentionRequest {
                agent_id: ctx.agent_id.clone(),
                agent_class: ctx.agent_class.clone(),
                framework_id: ctx.framework_id.clone(),
                tier: Tier::Ho1,
                work_order_id: wo.wo_id.clone(),
                session_id: wo.session_id.clone(),
                prompt_contract: contract.clone(),
                template_override: None,
            };
            Some(self.attention.assemble(&request).await?)
        } else {
            None
        };

        let prompt = render_prompt(&contract, assembled.as_ref().map(|a| a.context_text.as_str()), &wo.input_context);

        let started = Instant::now();
        let response = self
            .gateway
            .route(PromptRequest {
                prompt,
                contract_id: contract_id.clone(),
                scope_key: call_scope,
                tier: Tier::Ho1,
                provider_id: ctx.provider_id.clone(),
                requested_tokens: call_budget,
                timeout_seconds: wo.constraints.timeout_seconds,
            })
            .await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut llm_metadata = self.base_metadata(wo, ctx);
        llm_metadata.context_fingerprint = helm_types::ContextFingerprint {
            context_hash: assembled.as_ref().map(|a| a.context_hash.clone()),
            prompt_pack_id: Some(contract_id.clone()),
            tokens_used: TokensUsed {
                input: response.usage.input_tokens,
                output: response.usage.output_tokens,
            },
            ..Default::default()
        };
        llm_metadata.outcome = Outcome {
            status: Some(format!("{:?}", response.outcome).to_lowercase()),
            error: response.error_message.clone(),
            ..Default::default()
        };
        self.log("LLM_CALL", llm_metadata).await?;

        if response.outcome != PromptOutcome::Success {
            return self
                .fail_wo(
                    wo,
                    ctx,
                    response.error_code.as_deref().unwrap_or("GATEWAY_ERROR"),
                    response.error_message.clone().unwrap_or_else(|| "gateway call did not succeed".to_string()),
                )
                .await;
        }

        let output_value = match serde_json::from_str::<serde_json::Value>(&response.content) {
            Ok(v) if v.is_object() || v.is_array() => v,
            _ => serde_json::json!({ "response_text": response.content }),
        };

        if let Err(e) = validate_output(&contract, &output_value) {
            return self.fail_wo(wo, ctx, "OUTPUT_INVALID", e.to_string()).await;
        }

        wo.cost.record_llm_call(response.usage.input_tokens, response.usage.output_tokens, elapsed_ms);
        self.complete_wo(wo, ctx, output_value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_attention::AttentionService;
    use helm_budget::TokenBudgeter;
    use helm_gateway::provider::MockProvider;
    use helm_gateway::LLMGateway;
    use helm_ledger::LedgerClient;
    use helm_query::LedgerQuery;
    use helm_types::config::{GatewayConfig, LedgerConfig};
    use helm_types::{Cost, InputContext, WoConstraints};
    use std::collections::HashMap as Map;

    async fn harness(dir: &std::path::Path) -> (Executor, Arc<TokenBudgeter>) {
        let ledger = Arc::new(LedgerClient::open(dir.join("ho1"), LedgerConfig::default()).await.unwrap());
        let budgeter = Arc::new(TokenBudgeter::new());
        let gateway = Arc::new(LLMGateway::new(GatewayConfig::default(), budgeter.clone(), ledger.clone()));

        let query = Arc::new(LedgerQuery::new(Map::new(), Default::default()));
        let attention = Arc::new(AttentionService::new(
            vec![],
            query,
            std::time::Duration::from_secs(60),
            dir.join("registry"),
            dir.join("files"),
        ));

        let mut contracts = HashMap::new();
        contracts.insert(
            "c1".to_string(),
            PromptContract {
                contract_id: "c1".to_string(),
                input_schema: serde_json::json!({}),
                output_schema: serde_json::json!({
                    "type": "object",
                    "required": ["response_text"]
                }),
                template: "{{input}}".to_string(),
                required_context: Default::default(),
                tools: vec![],
                budget_defaults: Default::default(),
            },
        );

        let executor = Executor::new(budgeter.clone(), gateway.clone(), attention, ledger, contracts);
        gateway.register_provider("mock", Arc::new(MockProvider::responding("ok")));
        (executor, budgeter)
    }

    fn llm_wo(session_id: &str, wo_id: &str) -> WorkOrder {
        WorkOrder {
            wo_id: wo_id.to_string(),
            session_id: session_id.to_string(),
            parent_wo_id: None,
            wo_type: WoType::Classify,
            tier_target: "HO1".to_string(),
            state: WoState::Dispatched,
            created_by: "ho2".to_string(),
            input_context: InputContext {
                user_input: "classify this".to_string(),
                ..Default::default()
            },
            constraints: WoConstraints {
                prompt_contract_id: Some("c1".to_string()),
                token_budget: 1000,
                turn_limit: 1,
                timeout_seconds: 10,
                tools_allowed: vec![],
            },
            output_result: None,
            error: None,
            completed_at: None,
            cost: Cost::default(),
        }
    }

    fn exec_ctx() -> ExecuteContext {
        ExecuteContext {
            agent_id: "agent-1".to_string(),
            agent_class: "classifier".to_string(),
            framework_id: None,
            provider_id: "mock".to_string(),
            dispatched_event_id: None,
            root_event_id: None,
        }
    }

    #[tokio::test]
    async fn successful_llm_call_completes_wo() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, budgeter) = harness(dir.path()).await;
        budgeter.allocate_root(ScopeKey::session("s-1"), 1000);
        budgeter
            .allocate(ScopeKey::session("s-1"), ScopeKey::work_order("s-1", "WO-s-1-001"), 1000)
            .unwrap();

        let mut wo = llm_wo("s-1", "WO-s-1-001");
        executor.execute(&mut wo, exec_ctx()).await.unwrap();

        assert_eq!(wo.state, WoState::Completed);
        assert_eq!(wo.output_result.unwrap()["response_text"], "ok");
    }

    #[tokio::test]
    async fn gateway_rejection_fails_wo_without_silent_content() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, budgeter) = harness(dir.path()).await;
        budgeter.allocate_root(ScopeKey::session("s-2"), 1000);
        budgeter
            .allocate(ScopeKey::session("s-2"), ScopeKey::work_order("s-2", "WO-s-2-001"), 1000)
            .unwrap();

        let mut wo = llm_wo("s-2", "WO-s-2-001");
        wo.input_context.user_input = "".to_string(); // gateway rejects empty prompts
        executor.execute(&mut wo, exec_ctx()).await.unwrap();

        assert_eq!(wo.state, WoState::Failed);
        assert_eq!(wo.error.as_ref().unwrap().code, "INVALID_INPUT");
        assert!(wo.output_result.is_none());
    }

    #[tokio::test]
    async fn unregistered_tool_fails_wo() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, budgeter) = harness(dir.path()).await;
        budgeter.allocate_root(ScopeKey::session("s-3"), 1000);
        budgeter
            .allocate(ScopeKey::session("s-3"), ScopeKey::work_order("s-3", "WO-s-3-001"), 1000)
            .unwrap();

        let mut wo = WorkOrder {
            wo_id: "WO-s-3-001".to_string(),
            session_id: "s-3".to_string(),
            parent_wo_id: None,
            wo_type: WoType::ToolCall,
            tier_target: "HO1".to_string(),
            state: WoState::Dispatched,
            created_by: "ho2".to_string(),
            input_context: InputContext {
                user_input: "search".to_string(),
                ..Default::default()
            },
            constraints: WoConstraints {
                prompt_contract_id: None,
                token_budget: 100,
                turn_limit: 1,
                timeout_seconds: 10,
                tools_allowed: vec!["search".to_string()],
            },
            output_result: None,
            error: None,
            completed_at: None,
            cost: Cost::default(),
        };

        executor.execute(&mut wo, exec_ctx()).await.unwrap();
        assert_eq!(wo.state, WoState::Failed);
        assert_eq!(wo.error.as_ref().unwrap().code, "TOOL_NOT_FOUND");
    }
}
