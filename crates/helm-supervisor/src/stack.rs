use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use helm_attention::AttentionService;
use helm_budget::TokenBudgeter;
use helm_executor::{ExecuteContext, Executor};
use helm_gateway::{LLMGateway, PromptRequest};
use helm_ledger::LedgerClient;
use helm_query::{LedgerQuery, QueryRequest, SortOrder};
use helm_types::config::LedgerConfig;
use helm_types::{
    InputContext, Metadata, Outcome, PromptContract, Provenance, Relational, Scope, ScopeKey, Tier,
    WoConstraints, WoState, WoType, WorkOrder,
};
use helm_workorder::{plan, PlanRequest};

use crate::dispatch::DispatchPattern;
use crate::error::SupervisorError;

/// Construction inputs for a per-agent-class cognitive stack. `root` is the
/// plane root `HO2/ledger/<agent_class>` and `HO1/ledger/<agent_class>` are
/// created under.
pub struct StackConfig {
    pub root: PathBuf,
    pub classify_contract: PromptContract,
    pub synthesize_contract: PromptContract,
    pub probe_contracts: Vec<PromptContract>,
    pub provider_id: String,
    pub ledger_config: LedgerConfig,
}

/// Outcome of one `handleTurn` call.
pub struct TurnOutcome {
    pub response_text: String,
    pub quality_ok: bool,
    pub degraded: bool,
    pub wo_ids: Vec<String>,
    pub trace_hash: String,
    pub tokens_used: helm_types::TokensUsed,
}

/// One agent class' isolated HO2 + HO1 pair: shared code (the same
/// `Executor`/`AttentionService`/`LLMGateway` types every stack uses),
/// isolated state (its own ledger partitions and WO sequence counters). No
/// stack holds a reference to another stack's `LedgerClient`.
pub struct CognitiveStack {
    pub agent_class: String,
    ho1: Arc<Executor>,
    ho2_ledger: Arc<LedgerClient>,
    ho1_ledger: Arc<LedgerClient>,
    ho1_query: Arc<LedgerQuery>,
    budgeter: Arc<TokenBudgeter>,
    gateway: Arc<LLMGateway>,
    classify_contract: PromptContract,
    synthesize_contract: PromptContract,
    probe_contracts: Vec<PromptContract>,
    provider_id: String,
    dispatch_pattern: DispatchPattern,
    session_seq: DashMap<String, u32>,
}

fn contract_constraints(contract: &PromptContract, tools_allowed: Vec<String>) -> WoConstraints {
    WoConstraints {
        prompt_contract_id: Some(contract.contract_id.clone()),
        token_budget: contract.budget_defaults.token_budget.unwrap_or(500),
        turn_limit: 1,
        timeout_seconds: contract.budget_defaults.timeout_seconds.unwrap_or(30),
        tools_allowed,
    }
}

impl CognitiveStack {
    fn next_seq(&self, session_id: &str) -> u32 {
        let mut entry = self.session_seq.entry(session_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    fn ho2_metadata(&self, wo: &WorkOrder, parent_event_id: Option<String>, root_event_id: Option<String>) -> Metadata {
        Metadata {
            provenance: Provenance {
                agent_class: Some(self.agent_class.clone()),
                work_order_id: Some(wo.wo_id.clone()),
                session_id: Some(wo.session_id.clone()),
                ..Default::default()
            },
            scope: Scope { tier: Tier::Ho2 },
            relational: Relational {
                parent_event_id,
                root_event_id,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn log_ho2(&self, event_type: &str, metadata: Metadata) -> Result<String, SupervisorError> {
        Ok(self.ho2_ledger.append(event_type, metadata).await?)
    }

    /// Plan, dispatch, and execute one work order, logging `WO_PLANNED`/
    /// `WO_DISPATCHED` to HO2 before handing it to HO1. `root_event_id` is the
    /// turn's chain origin: `None` means this call's own `WO_PLANNED` entry
    /// *is* the origin (its id becomes the root returned for subsequent calls
    /// in the same turn to pass back in), `Some` means it is a descendant.
    async fn run_wo(
        &self,
        session_id: &str,
        parent: Option<&WorkOrder>,
        wo_type: WoType,
        contract: &PromptContract,
        input_context: InputContext,
        root_event_id: Option<String>,
    ) -> Result<(WorkOrder, String), SupervisorError> {
        let seq = self.next_seq(session_id);
        let mut wo = plan(
            &self.budgeter,
            PlanRequest {
                session_id: session_id.to_string(),
                seq,
                parent,
                wo_type,
                created_by: format!("ho2:{}", self.agent_class),
                input_context,
                constraints: contract_constraints(contract, vec![]),
            },
        )?;

        let planned_id = self.log_ho2("WO_PLANNED", self.ho2_metadata(&wo, None, root_event_id.clone())).await?;
        let root = root_event_id.unwrap_or_else(|| planned_id.clone());

        wo.transition(WoState::Dispatched)?;
        let dispatched_id = self
            .log_ho2("WO_DISPATCHED", self.ho2_metadata(&wo, Some(planned_id), Some(root.clone())))
            .await?;

        self.ho1
            .execute(
                &mut wo,
                ExecuteContext {
                    agent_id: format!("{}-ho1", self.agent_class),
                    agent_class: self.agent_class.clone(),
                    framework_id: None,
                    provider_id: self.provider_id.clone(),
                    dispatched_event_id: Some(dispatched_id),
                    root_event_id: Some(root.clone()),
                },
            )
            .await?;

        Ok((wo, root))
    }

    fn response_text(wo: &WorkOrder) -> Option<String> {
        wo.output_result
            .as_ref()
            .and_then(|v| v.get("response_text"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    fn quality_ok(wo: &WorkOrder) -> bool {
        wo.state == WoState::Completed
            && Self::response_text(wo).map(|s| !s.trim().is_empty()).unwrap_or(false)
    }

    /// Merkle root over the HO1 entries belonging to the single chain rooted
    /// at `root_event_id`, not the whole session's history.
    async fn trace_hash(&self, session_id: &str, root_event_id: &str) -> Result<String, SupervisorError> {
        let result = self
            .ho1_query
            .query(&QueryRequest {
                session_id: Some(session_id.to_string()),
                root_event_id: Some(root_event_id.to_string()),
                sort: SortOrder::TimestampAsc,
                ..Default::default()
            })
            .await?;
        let mut hashes: Vec<String> = result.entries.iter().map(|e| e.entry_hash.clone()).collect();
        hashes.sort();
        Ok(helm_hash::merkle_root(&hashes))
    }

    async fn degrade(
        &self,
        session_id: &str,
        user_message: &str,
        reason: &str,
        root_event_id: Option<String>,
    ) -> Result<String, SupervisorError> {
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
                agent_class: Some(self.agent_class.clone()),
                session_id: Some(session_id.to_string()),
                ..Default::default()
            },
            scope: Scope { tier: Tier::Ho1 },
            relational: Relational {
                root_event_id,
                ..Default::default()
            },
            ..Default::default()
        };
        metadata.outcome = Outcome {
            status: Some(format!("{:?}", response.outcome).to_lowercase()),
            error: Some(reason.to_string()),
            ..Default::default()
        };
        self.ho1_ledger.append("DEGRADED", metadata).await?;

        Ok(response.content)
    }

    /// Classify → optional probes → synthesize → quality gate, per the
    /// sequential dispatch pattern. A failed quality gate retries the
    /// synthesize step once before degrading to a direct gateway call.
    pub async fn handle_turn(&self, session_id: &str, user_message: &str) -> Result<TurnOutcome, SupervisorError> {
        // Only Sequential is implemented; see DispatchPattern.
        let DispatchPattern::Sequential = self.dispatch_pattern;

        let mut wo_ids = Vec::new();
        let mut tokens = helm_types::TokensUsed::default();

        let (classify_wo, root_event_id) = self
            .run_wo(
                session_id,
                None,
                WoType::Classify,
                &self.classify_contract,
                InputContext {
                    user_input: user_message.to_string(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        wo_ids.push(classify_wo.wo_id.clone());
        tokens.input += classify_wo.cost.input_tokens;
        tokens.output += classify_wo.cost.output_tokens;

        if classify_wo.state != WoState::Completed {
            let text = self
                .degrade(session_id, user_message, "classify work order failed", Some(root_event_id.clone()))
                .await?;
            return Ok(TurnOutcome {
                response_text: text,
                quality_ok: false,
                degraded: true,
                wo_ids,
                trace_hash: self.trace_hash(session_id, &root_event_id).await?,
                tokens_used: tokens,
            });
        }

        let mut prior_results = vec![classify_wo
            .output_result
            .clone()
            .unwrap_or_else(|| serde_json::json!({}))];

        for probe_contract in &self.probe_contracts {
            let (probe_wo, _) = self
                .run_wo(
                    session_id,
                    Some(&classify_wo),
                    WoType::Execute,
                    probe_contract,
                    InputContext {
                        user_input: user_message.to_string(),
                        prior_results: prior_results.clone(),
                        ..Default::default()
                    },
                    Some(root_event_id.clone()),
                )
                .await?;
            wo_ids.push(probe_wo.wo_id.clone());
            tokens.input += probe_wo.cost.input_tokens;
            tokens.output += probe_wo.cost.output_tokens;
            if probe_wo.state == WoState::Completed {
                if let Some(output) = probe_wo.output_result.clone() {
                    prior_results.push(output);
                }
            }
        }

        let synth_input = InputContext {
            user_input: user_message.to_string(),
            prior_results: prior_results.clone(),
            ..Default::default()
        };

        let (mut synth_wo, _) = self
            .run_wo(
                session_id,
                Some(&classify_wo),
                WoType::Synthesize,
                &self.synthesize_contract,
                synth_input.clone(),
                Some(root_event_id.clone()),
            )
            .await?;
        wo_ids.push(synth_wo.wo_id.clone());
        tokens.input += synth_wo.cost.input_tokens;
        tokens.output += synth_wo.cost.output_tokens;

        if !Self::quality_ok(&synth_wo) {
            tracing::warn!(session_id, wo_id = %synth_wo.wo_id, "quality gate failed, retrying synthesize once");
            (synth_wo, _) = self
                .run_wo(
                    session_id,
                    Some(&classify_wo),
                    WoType::Synthesize,
                    &self.synthesize_contract,
                    synth_input,
                    Some(root_event_id.clone()),
                )
                .await?;
            wo_ids.push(synth_wo.wo_id.clone());
            tokens.input += synth_wo.cost.input_tokens;
            tokens.output += synth_wo.cost.output_tokens;
        }

        let trace_hash = self.trace_hash(session_id, &root_event_id).await?;

        if !Self::quality_ok(&synth_wo) {
            let text = self
                .degrade(session_id, user_message, "quality gate failed after retry", Some(root_event_id.clone()))
                .await?;
            let mut metadata = self.ho2_metadata(&synth_wo, None, Some(root_event_id.clone()));
            metadata.outcome = Outcome {
                status: Some("degraded".to_string()),
                quality_signal: Some(0.0),
                ..Default::default()
            };
            metadata.context_fingerprint.context_hash = Some(trace_hash.clone());
            self.log_ho2("WO_QUALITY_GATE", metadata).await?;
            return Ok(TurnOutcome {
                response_text: text,
                quality_ok: false,
                degraded: true,
                wo_ids,
                trace_hash,
                tokens_used: tokens,
            });
        }

        let response_text = Self::response_text(&synth_wo).unwrap_or_default();

        let mut quality_metadata = self.ho2_metadata(&synth_wo, None, Some(root_event_id.clone()));
        quality_metadata.outcome = Outcome {
            status: Some("pass".to_string()),
            quality_signal: Some(1.0),
            ..Default::default()
        };
        quality_metadata.context_fingerprint.context_hash = Some(trace_hash.clone());
        self.log_ho2("WO_QUALITY_GATE", quality_metadata).await?;

        let mut complete_metadata = self.ho2_metadata(&synth_wo, None, Some(root_event_id.clone()));
        complete_metadata.context_fingerprint.context_hash = Some(trace_hash.clone());
        self.log_ho2("WO_CHAIN_COMPLETE", complete_metadata).await?;

        Ok(TurnOutcome {
            response_text,
            quality_ok: true,
            degraded: false,
            wo_ids,
            trace_hash,
            tokens_used: tokens,
        })
    }
}

/// Builds isolated per-agent-class stacks sharing the process-wide executor
/// infrastructure (attention, gateway, budgeter) but owning their own ledger
/// partitions under `HO2/ledger/<agent_class>` and `HO1/ledger/<agent_class>`.
pub struct CognitiveStackFactory {
    root: PathBuf,
    budgeter: Arc<TokenBudgeter>,
    gateway: Arc<LLMGateway>,
    attention: Arc<AttentionService>,
}

impl CognitiveStackFactory {
    pub fn new(root: impl Into<PathBuf>, budgeter: Arc<TokenBudgeter>, gateway: Arc<LLMGateway>, attention: Arc<AttentionService>) -> Self {
        Self {
            root: root.into(),
            budgeter,
            gateway,
            attention,
        }
    }

    fn ho2_path(&self, agent_class: &str) -> PathBuf {
        Path::new(&self.root).join("HO2").join("ledger").join(agent_class)
    }

    fn ho1_path(&self, agent_class: &str) -> PathBuf {
        Path::new(&self.root).join("HO1").join("ledger").join(agent_class)
    }

    pub async fn new_stack(&self, agent_class: impl Into<String>, config: StackConfig) -> Result<CognitiveStack, SupervisorError> {
        let agent_class = agent_class.into();
        let ho2_path = self.ho2_path(&agent_class);
        let ho1_path = self.ho1_path(&agent_class);

        let ho2_ledger = Arc::new(LedgerClient::open(ho2_path, config.ledger_config.clone()).await?);
        let ho1_ledger = Arc::new(LedgerClient::open(ho1_path, config.ledger_config.clone()).await?);

        let mut query_ledgers = std::collections::HashMap::new();
        query_ledgers.insert(Tier::Ho1, ho1_ledger.clone());
        let ho1_query = Arc::new(LedgerQuery::new(query_ledgers, Default::default()));

        let mut contracts = std::collections::HashMap::new();
        contracts.insert(config.classify_contract.contract_id.clone(), config.classify_contract.clone());
        contracts.insert(config.synthesize_contract.contract_id.clone(), config.synthesize_contract.clone());
        for probe in &config.probe_contracts {
            contracts.insert(probe.contract_id.clone(), probe.clone());
        }

        let ho1 = Arc::new(Executor::new(
            self.budgeter.clone(),
            self.gateway.clone(),
            self.attention.clone(),
            ho1_ledger.clone(),
            contracts,
        ));

        Ok(CognitiveStack {
            agent_class,
            ho1,
            ho2_ledger,
            ho1_ledger,
            ho1_query,
            budgeter: self.budgeter.clone(),
            gateway: self.gateway.clone(),
            classify_contract: config.classify_contract,
            synthesize_contract: config.synthesize_contract,
            probe_contracts: config.probe_contracts,
            provider_id: config.provider_id,
            dispatch_pattern: DispatchPattern::Sequential,
            session_seq: DashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_gateway::provider::MockProvider;
    use helm_types::config::GatewayConfig;

    fn contract(id: &str) -> PromptContract {
        PromptContract {
            contract_id: id.to_string(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({
                "type": "object",
                "required": ["response_text"]
            }),
            template: "{{input}}".to_string(),
            required_context: Default::default(),
            tools: vec![],
            budget_defaults: Default::default(),
        }
    }

    async fn factory(dir: &Path, provider: Arc<dyn helm_gateway::Provider>) -> (CognitiveStackFactory, Arc<TokenBudgeter>) {
        let budgeter = Arc::new(TokenBudgeter::new());
        let gw_ledger = Arc::new(LedgerClient::open(dir.join("gw"), LedgerConfig::default()).await.unwrap());
        let gateway = Arc::new(LLMGateway::new(GatewayConfig::default(), budgeter.clone(), gw_ledger));
        gateway.register_provider("mock", provider);

        let query: Arc<LedgerQuery> = Arc::new(LedgerQuery::new(std::collections::HashMap::new(), Default::default()));
        let attention = Arc::new(AttentionService::new(
            vec![],
            query,
            std::time::Duration::from_secs(60),
            dir.join("registry"),
            dir.join("files"),
        ));

        (CognitiveStackFactory::new(dir, budgeter.clone(), gateway, attention), budgeter)
    }

    #[tokio::test]
    async fn happy_path_completes_and_sets_quality_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, budgeter) = factory(dir.path(), Arc::new(MockProvider::responding("looks good"))).await;

        let stack = factory
            .new_stack(
                "classifier",
                StackConfig {
                    root: dir.path().to_path_buf(),
                    classify_contract: contract("classify-1"),
                    synthesize_contract: contract("synth-1"),
                    probe_contracts: vec![],
                    provider_id: "mock".to_string(),
                    ledger_config: LedgerConfig::default(),
                },
            )
            .await
            .unwrap();

        budgeter.allocate_root(ScopeKey::session("s-1"), 10_000);

        let outcome = stack.handle_turn("s-1", "hello there").await.unwrap();
        assert!(outcome.quality_ok);
        assert!(!outcome.degraded);
        assert_eq!(outcome.response_text, "looks good");
        assert_eq!(outcome.wo_ids.len(), 2);
        assert!(!outcome.trace_hash.is_empty());
    }

    #[tokio::test]
    async fn failing_classify_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, budgeter) = factory(dir.path(), Arc::new(MockProvider::failing())).await;

        let stack = factory
            .new_stack(
                "classifier",
                StackConfig {
                    root: dir.path().to_path_buf(),
                    classify_contract: contract("classify-1"),
                    synthesize_contract: contract("synth-1"),
                    probe_contracts: vec![],
                    provider_id: "mock".to_string(),
                    ledger_config: LedgerConfig::default(),
                },
            )
            .await
            .unwrap();

        budgeter.allocate_root(ScopeKey::session("s-2"), 10_000);

        let outcome = stack.handle_turn("s-2", "hello").await.unwrap();
        assert!(outcome.degraded);
        assert!(!outcome.quality_ok);
    }
}
