use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use helm_query::{LedgerQuery, QueryRequest, Recency};
use helm_types::{AttentionTemplate, FallbackAction, StageSpec, StageType, Tier};
use serde_json::Value;

use crate::cache::{CacheKey, ContextCache};
use crate::custom::CustomStageHandler;
use crate::error::AttentionError;
use crate::fragment::{AssembledContext, Fragment, StageStatus, StageTrace};
use crate::request::AttentionRequest;
use crate::template::{merge_required_context, resolve_template};

struct PipelineState {
    fragments: Vec<Fragment>,
    tokens_assembled: usize,
    queries_executed: usize,
    elapsed_ms: u64,
    tier_scope: Option<Tier>,
    traces: Vec<StageTrace>,
    last_search_stage: Option<StageSpec>,
    relaxed_retry_used: bool,
}

impl PipelineState {
    fn new() -> Self {
        Self {
            fragments: Vec::new(),
            tokens_assembled: 0,
            queries_executed: 0,
            elapsed_ms: 0,
            tier_scope: None,
            traces: Vec::new(),
            last_search_stage: None,
            relaxed_retry_used: false,
        }
    }

    fn push_fragments(&mut self, new: Vec<Fragment>) -> usize {
        let tokens: usize = new.iter().map(|f| f.token_estimate).sum();
        self.fragments.extend(new);
        self.tokens_assembled += tokens;
        tokens
    }

    fn within_budget(&self, template: &AttentionTemplate) -> bool {
        self.tokens_assembled < template.budget.max_context_tokens
            && self.queries_executed < template.budget.max_queries
            && self.elapsed_ms < template.budget.timeout_ms
    }
}

fn is_search_stage(stage_type: StageType) -> bool {
    matches!(
        stage_type,
        StageType::LedgerQuery | StageType::RegistryQuery | StageType::FileRead | StageType::HorizontalSearch
    )
}

/// Config-driven context-assembly service. `assemble` resolves a template,
/// fills pipeline gaps from the prompt contract, runs the pipeline stage by
/// stage under budget enforcement, and caches the result.
pub struct AttentionService {
    templates: Vec<AttentionTemplate>,
    query: Arc<LedgerQuery>,
    cache: ContextCache,
    custom_handlers: DashMap<String, Arc<dyn CustomStageHandler>>,
    registry_root: std::path::PathBuf,
    file_root: std::path::PathBuf,
}

impl AttentionService {
    pub fn new(
        templates: Vec<AttentionTemplate>,
        query: Arc<LedgerQuery>,
        cache_ttl: Duration,
        registry_root: impl Into<std::path::PathBuf>,
        file_root: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            templates,
            query,
            cache: ContextCache::new(cache_ttl),
            custom_handlers: DashMap::new(),
            registry_root: registry_root.into(),
            file_root: file_root.into(),
        }
    }

    pub fn register_custom_handler(&self, stage_name: impl Into<String>, handler: Arc<dyn CustomStageHandler>) {
        self.custom_handlers.insert(stage_name.into(), handler);
    }

    pub async fn assemble(&self, request: &AttentionRequest) -> Result<AssembledContext, AttentionError> {
        let template = resolve_template(
            &self.templates,
            request.template_override.as_deref(),
            &request.agent_class,
            request.framework_id.as_deref(),
            request.tier,
        )?;
        let template = merge_required_context(template, &request.prompt_contract.required_context);

        let cache_key = CacheKey {
            template_id: template.template_id.clone(),
            agent_class: request.agent_class.clone(),
            work_order_id: request.work_order_id.clone(),
            session_id: request.session_id.clone(),
        };
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let started = Instant::now();
        let mut state = PipelineState::new();
        let mut fallback_triggered: Option<FallbackAction> = None;

        let mut i = 0usize;
        while i < template.pipeline.len() {
            let stage = template.pipeline[i].clone();
            state.elapsed_ms = started.elapsed().as_millis() as u64;

            if !stage.enabled {
                state.traces.push(StageTrace {
                    stage: stage.stage.clone(),
                    status: StageStatus::Skipped,
                    tokens_produced: 0,
                    queries_executed: 0,
                    elapsed_ms: state.elapsed_ms,
                });
                i += 1;
                continue;
            }

            if !state.within_budget(&template) {
                fallback_triggered = Some(template.fallback.on_timeout);
                break;
            }

            let before_tokens = state.tokens_assembled;
            let before_queries = state.queries_executed;
            let status = self.run_stage(request, &template, &stage, &mut state).await?;
            state.elapsed_ms = started.elapsed().as_millis() as u64;
            state.traces.push(StageTrace {
                stage: stage.stage.clone(),
                status,
                tokens_produced: state.tokens_assembled - before_tokens,
                queries_executed: state.queries_executed - before_queries,
                elapsed_ms: state.elapsed_ms,
            });

            if is_search_stage(stage.stage_type) {
                state.last_search_stage = Some(stage.clone());
            }
            i += 1;
        }

        if state.fragments.is_empty() && fallback_triggered.is_none() {
            fallback_triggered = Some(template.fallback.on_empty);
        }

        let context = match fallback_triggered {
            None | Some(FallbackAction::ReturnPartial) => self.finish(&state),
            Some(FallbackAction::Fail) => return Err(AttentionError::BudgetExhausted(template.template_id.clone())),
            Some(FallbackAction::UseCached) => match self.cache.get(&cache_key) {
                Some(cached) => cached,
                None => self.finish(&state),
            },
        };

        self.cache.insert(cache_key, context.clone());
        Ok(context)
    }

    fn finish(&self, state: &PipelineState) -> AssembledContext {
        let context_text = state
            .fragments
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        AssembledContext {
            context_hash: helm_hash::hash_string(&context_text),
            context_text,
            fragments: state.fragments.clone(),
            pipeline_trace: state.traces.clone(),
        }
    }

    async fn run_stage(
        &self,
        request: &AttentionRequest,
        template: &AttentionTemplate,
        stage: &StageSpec,
        state: &mut PipelineState,
    ) -> Result<StageStatus, AttentionError> {
        let chars_per_token = template.budget.chars_per_token;
        match stage.stage_type {
            StageType::TierSelect => {
                if let Some(tier_str) = stage.config.get("tier").and_then(Value::as_str) {
                    state.tier_scope = serde_json::from_value(Value::String(tier_str.to_string())).ok();
                }
                Ok(StageStatus::Ok)
            }
            StageType::LedgerQuery => self.run_ledger_query(request, stage, state, chars_per_token).await,
            StageType::RegistryQuery => self.run_registry_query(stage, state, chars_per_token),
            StageType::FileRead => self.run_file_read(stage, state, chars_per_token).await,
            StageType::HorizontalSearch => Ok(self.run_horizontal_search(stage, state)),
            StageType::Structuring => Ok(self.run_structuring(template, stage, state)),
            StageType::Halting => self.run_halting(request, template, stage, state).await,
            StageType::Custom => self.run_custom(request, stage, state, chars_per_token).await,
        }
    }

    async fn run_ledger_query(
        &self,
        request: &AttentionRequest,
        stage: &StageSpec,
        state: &mut PipelineState,
        chars_per_token: usize,
    ) -> Result<StageStatus, AttentionError> {
        let event_types: Vec<String> = stage
            .config
            .get("event_types")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let max_entries = stage.config.get("max_entries").and_then(Value::as_u64).unwrap_or(20) as usize;
        let recency = match stage.config.get("recency").and_then(Value::as_str) {
            Some("today") => Recency::Today,
            Some("session") => Recency::Session,
            _ => Recency::All,
        };

        let mut req = QueryRequest {
            event_types,
            session_id: Some(request.session_id.clone()),
            recency,
            limit: Some(max_entries),
            ..Default::default()
        };
        if let Some(tier) = state.tier_scope {
            req.tiers = vec![tier];
        }

        let result = self.query.query(&req).await?;
        state.queries_executed += 1;

        let fragments: Vec<Fragment> = result
            .entries
            .iter()
            .map(|entry| {
                let content = serde_json::to_string(entry).unwrap_or_default();
                Fragment::new("ledger_query", entry.entry_id.clone(), content, chars_per_token)
            })
            .collect();
        let truncated = result.total_matched > result.entries.len();
        let empty = fragments.is_empty();
        state.push_fragments(fragments);
        Ok(if empty {
            StageStatus::Empty
        } else if truncated {
            StageStatus::Truncated
        } else {
            StageStatus::Ok
        })
    }

    fn run_registry_query(&self, stage: &StageSpec, state: &mut PipelineState, chars_per_token: usize) -> Result<StageStatus, AttentionError> {
        let Some(path_str) = stage.config.get("path").and_then(Value::as_str) else {
            return Ok(StageStatus::Skipped);
        };
        let path = self.registry_root.join(path_str);
        if !path.exists() {
            return Ok(StageStatus::Empty);
        }

        let filters: Vec<(String, String)> = stage
            .config
            .get("filters")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let mut reader = csv::Reader::from_path(&path)?;
        let headers = reader.headers()?.clone();
        let mut fragments = Vec::new();
        for record in reader.records() {
            let record = record?;
            let matches = filters.iter().all(|(col, val)| {
                headers
                    .iter()
                    .position(|h| h == col)
                    .and_then(|idx| record.get(idx))
                    .map(|cell| cell == val)
                    .unwrap_or(false)
            });
            if !matches {
                continue;
            }
            let row_json: serde_json::Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            let content = serde_json::to_string(&row_json).unwrap_or_default();
            fragments.push(Fragment::new("registry_query", path_str.to_string(), content, chars_per_token));
        }
        state.queries_executed += 1;
        let empty = fragments.is_empty();
        state.push_fragments(fragments);
        Ok(if empty { StageStatus::Empty } else { StageStatus::Ok })
    }

    async fn run_file_read(&self, stage: &StageSpec, state: &mut PipelineState, chars_per_token: usize) -> Result<StageStatus, AttentionError> {
        let paths: Vec<String> = stage
            .config
            .get("paths")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let max_size_bytes = stage.config.get("max_size_bytes").and_then(Value::as_u64).unwrap_or(1_000_000);

        let mut fragments = Vec::new();
        let mut any_missing = false;
        for rel in &paths {
            let path = self.file_root.join(rel);
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                tracing::warn!(path = %path.display(), "file_read: missing file, skipping");
                any_missing = true;
                continue;
            };
            if metadata.len() > max_size_bytes {
                tracing::warn!(path = %path.display(), size = metadata.len(), max_size_bytes, "file_read: file exceeds max_size_bytes, skipping");
                any_missing = true;
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => fragments.push(Fragment::new("file_read", rel.clone(), content, chars_per_token)),
                Err(_) => any_missing = true,
            }
        }
        let empty = fragments.is_empty();
        state.push_fragments(fragments);
        Ok(if empty {
            StageStatus::Empty
        } else if any_missing {
            StageStatus::Truncated
        } else {
            StageStatus::Ok
        })
    }

    fn run_horizontal_search(&self, stage: &StageSpec, state: &mut PipelineState) -> StageStatus {
        let keywords: Vec<String> = stage
            .config
            .get("keywords")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(|s| s.to_lowercase())).collect())
            .unwrap_or_default();
        let threshold = stage.config.get("relevance_threshold").and_then(Value::as_f64).unwrap_or(0.0);

        if keywords.is_empty() {
            return StageStatus::Skipped;
        }

        let mut kept = Vec::new();
        for fragment in state.fragments.drain(..) {
            let lower = fragment.content.to_lowercase();
            let hits = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
            let score = hits as f64 / keywords.len() as f64;
            if score >= threshold {
                kept.push(fragment.with_relevance(score));
            }
        }
        let empty = kept.is_empty();
        state.tokens_assembled = kept.iter().map(|f| f.token_estimate).sum();
        state.fragments = kept;
        if empty {
            StageStatus::Empty
        } else {
            StageStatus::Ok
        }
    }

    fn run_structuring(&self, template: &AttentionTemplate, stage: &StageSpec, state: &mut PipelineState) -> StageStatus {
        let chars_per_token = template.budget.chars_per_token;

        let mut deduped: Vec<Fragment> = Vec::new();
        let mut seen_prefixes: Vec<String> = Vec::new();
        for fragment in state.fragments.drain(..) {
            let prefix = fragment.hash_prefix(chars_per_token);
            let is_dup = seen_prefixes.contains(&prefix)
                || deduped.iter().any(|f: &Fragment| f.content.contains(&fragment.content) || fragment.content.contains(&f.content));
            if !is_dup {
                seen_prefixes.push(prefix);
                deduped.push(fragment);
            }
        }

        let max_tokens = template.budget.max_context_tokens;
        let mut truncated = false;
        loop {
            let total: usize = deduped.iter().map(|f| f.token_estimate).sum();
            if total <= max_tokens || deduped.is_empty() {
                break;
            }
            if let Some((idx, _)) = deduped
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let ra = a.relevance_score.unwrap_or(0.5);
                    let rb = b.relevance_score.unwrap_or(0.5);
                    ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
                })
            {
                deduped.remove(idx);
                truncated = true;
            } else {
                break;
            }
        }

        match stage.config.get("strategy").and_then(Value::as_str) {
            Some("relevance_desc") => deduped.sort_by(|a, b| {
                b.relevance_score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.relevance_score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            _ => {}
        }

        state.tokens_assembled = deduped.iter().map(|f| f.token_estimate).sum();
        state.fragments = deduped;
        if truncated {
            StageStatus::Truncated
        } else if state.fragments.is_empty() {
            StageStatus::Empty
        } else {
            StageStatus::Ok
        }
    }

    async fn run_halting(
        &self,
        request: &AttentionRequest,
        template: &AttentionTemplate,
        stage: &StageSpec,
        state: &mut PipelineState,
    ) -> Result<StageStatus, AttentionError> {
        let min_fragments = stage.config.get("min_fragments").and_then(Value::as_u64).unwrap_or(0) as usize;
        let min_tokens = stage.config.get("min_tokens").and_then(Value::as_u64).unwrap_or(0) as usize;
        let under_minima = state.fragments.len() < min_fragments || state.tokens_assembled < min_tokens;

        if !under_minima || state.relaxed_retry_used || !state.within_budget(template) {
            return Ok(StageStatus::Ok);
        }

        let Some(mut prior) = state.last_search_stage.clone() else {
            return Ok(StageStatus::Ok);
        };
        if let Some(relaxed) = stage.config.get("relaxed").and_then(Value::as_object) {
            if let Some(prior_obj) = prior.config.as_object_mut() {
                for (k, v) in relaxed {
                    prior_obj.insert(k.clone(), v.clone());
                }
            }
        }
        state.relaxed_retry_used = true;
        self.run_stage(request, template, &prior, state).await
    }

    async fn run_custom(
        &self,
        request: &AttentionRequest,
        stage: &StageSpec,
        state: &mut PipelineState,
        chars_per_token: usize,
    ) -> Result<StageStatus, AttentionError> {
        let _ = chars_per_token;
        let handler = self
            .custom_handlers
            .get(&stage.stage)
            .ok_or_else(|| AttentionError::NoCustomHandler(stage.stage.clone()))?
            .clone();
        let fragments = handler.run(request, &stage.config).await?;
        let empty = fragments.is_empty();
        state.push_fragments(fragments);
        Ok(if empty { StageStatus::Empty } else { StageStatus::Ok })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::config::QueryConfig;
    use helm_types::{AppliesTo, AttentionBudget, AttentionFallback, PromptContract, RequiredContext};
    use std::collections::HashMap;

    fn request(contract_required: RequiredContext) -> AttentionRequest {
        AttentionRequest {
            agent_id: "agent-1".to_string(),
            agent_class: "classifier".to_string(),
            framework_id: None,
            tier: Tier::Ho1,
            work_order_id: "WO-1".to_string(),
            session_id: "S-1".to_string(),
            prompt_contract: PromptContract {
                contract_id: "contract-1".to_string(),
                input_schema: serde_json::json!({}),
                output_schema: serde_json::json!({}),
                template: "{{input}}".to_string(),
                required_context: contract_required,
                tools: vec![],
                budget_defaults: Default::default(),
            },
            template_override: None,
        }
    }

    fn empty_query() -> Arc<LedgerQuery> {
        Arc::new(LedgerQuery::new(HashMap::new(), QueryConfig::default()))
    }

    #[tokio::test]
    async fn synthetic_template_reads_required_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello world").unwrap();

        let service = AttentionService::new(vec![], empty_query(), Duration::from_secs(60), dir.path(), dir.path());
        let required = RequiredContext {
            ledger_queries: vec![],
            framework_refs: vec![],
            file_refs: vec!["notes.txt".to_string()],
        };
        let result = service.assemble(&request(required)).await.unwrap();
        assert!(result.context_text.contains("hello world"));
        assert_eq!(result.context_hash, helm_hash::hash_string(&result.context_text));
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "version-1").unwrap();

        let service = AttentionService::new(vec![], empty_query(), Duration::from_secs(60), dir.path(), dir.path());
        let required = RequiredContext {
            ledger_queries: vec![],
            framework_refs: vec![],
            file_refs: vec!["notes.txt".to_string()],
        };
        let first = service.assemble(&request(required.clone())).await.unwrap();
        assert!(first.context_text.contains("version-1"));

        std::fs::write(dir.path().join("notes.txt"), "version-2").unwrap();
        let second = service.assemble(&request(required)).await.unwrap();
        assert!(second.context_text.contains("version-1"));
    }

    #[tokio::test]
    async fn zero_token_budget_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "content").unwrap();

        let template = AttentionTemplate {
            template_id: "strict".to_string(),
            applies_to: AppliesTo::default(),
            pipeline: vec![StageSpec {
                stage: "read".to_string(),
                stage_type: StageType::FileRead,
                enabled: true,
                config: serde_json::json!({ "paths": ["notes.txt"] }),
            }],
            budget: AttentionBudget {
                max_context_tokens: 0,
                max_queries: 10,
                timeout_ms: 5_000,
                chars_per_token: 4,
            },
            fallback: AttentionFallback {
                on_empty: FallbackAction::ReturnPartial,
                on_timeout: FallbackAction::Fail,
            },
        };

        let service = AttentionService::new(vec![template], empty_query(), Duration::from_secs(60), dir.path(), dir.path());
        let required = RequiredContext::default();
        let err = service.assemble(&request(required)).await.unwrap_err();
        assert!(matches!(err, AttentionError::BudgetExhausted(_)));
    }
}
