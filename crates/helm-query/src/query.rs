use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use helm_ledger::LedgerClient;
use helm_types::config::QueryConfig;
use helm_types::{LedgerEntry, Tier};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::index::TierIndex;
use crate::request::{Aggregation, QueryRequest, SortOrder};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationResult {
    Count(usize),
    TokenSum(u64),
    QualityAvg(f64),
    GroupBy(HashMap<String, usize>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResult {
    pub entries: Vec<LedgerEntry>,
    pub tiers_searched: Vec<Tier>,
    pub total_matched: usize,
    pub aggregation: Option<AggregationResult>,
}

/// Provenance-indexed, cross-tier query engine over a set of per-tier
/// ledgers. One instance typically wraps every tier's primary ledger.
pub struct LedgerQuery {
    ledgers: HashMap<Tier, Arc<LedgerClient>>,
    config: QueryConfig,
    cache: Mutex<HashMap<Tier, TierIndex>>,
}

impl LedgerQuery {
    pub fn new(ledgers: HashMap<Tier, Arc<LedgerClient>>, config: QueryConfig) -> Self {
        Self {
            ledgers,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn indexed_snapshot(&self, tier: Tier) -> Result<(), QueryError> {
        let client = self.ledgers.get(&tier).ok_or(QueryError::UnknownTier(tier))?;
        let current_len = client.read_all().await?.len();

        let needs_rebuild = {
            let cache = self.cache.lock();
            match cache.get(&tier) {
                Some(index) => index.is_stale(
                    current_len,
                    self.config.index_rebuild_threshold,
                    Duration::from_secs(self.config.index_ttl_seconds),
                ),
                None => true,
            }
        };

        if needs_rebuild {
            let entries = client.read_all().await?;
            self.cache.lock().insert(tier, TierIndex::build(entries));
        }

        Ok(())
    }

    /// Run `request` across the requested tiers (all registered tiers if
    /// `request.tiers` is empty), merging by timestamp and applying the
    /// requested sort, pagination, and optional aggregation.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResult, QueryError> {
        if let Some(limit) = request.limit {
            if limit > self.config.max_page_size {
                return Err(QueryError::LimitExceedsPageSize {
                    requested: limit,
                    max: self.config.max_page_size,
                });
            }
        }

        let tiers_searched: Vec<Tier> = if request.tiers.is_empty() {
            self.ledgers.keys().copied().collect()
        } else {
            for t in &request.tiers {
                if !self.ledgers.contains_key(t) {
                    return Err(QueryError::UnknownTier(*t));
                }
            }
            request.tiers.clone()
        };

        let mut candidate_entries: Vec<LedgerEntry> = Vec::new();
        for tier in &tiers_searched {
            self.indexed_snapshot(*tier).await?;
            let cache = self.cache.lock();
            let index = cache.get(tier).expect("just populated");
            match index.candidates_for_event_types(&request.event_types) {
                Some(positions) => candidate_entries.extend(positions.into_iter().map(|i| index.snapshot[i].clone())),
                None => candidate_entries.extend(index.snapshot.iter().cloned()),
            }
        }

        let session_start = request.session_id.as_ref().and_then(|sid| {
            candidate_entries
                .iter()
                .filter(|e| e.metadata.provenance.session_id.as_deref() == Some(sid.as_str()))
                .map(|e| e.timestamp)
                .min()
        });
        let (since, until) = request.resolve_window(session_start)?;

        let mut matched: Vec<LedgerEntry> = candidate_entries
            .into_iter()
            .filter(|e| request.matches_without_window(e))
            .filter(|e| since.map(|s| e.timestamp >= s).unwrap_or(true))
            .filter(|e| until.map(|u| e.timestamp < u).unwrap_or(true))
            .collect();

        match request.sort {
            SortOrder::TimestampDesc => matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            SortOrder::TimestampAsc => matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
            SortOrder::QualityDesc => matched.sort_by(|a, b| {
                let qa = a.metadata.outcome.quality_signal.unwrap_or(f64::MIN);
                let qb = b.metadata.outcome.quality_signal.unwrap_or(f64::MIN);
                qb.partial_cmp(&qa).unwrap_or(std::cmp::Ordering::Equal)
            }),
        }

        let total_matched = matched.len();
        let aggregation = request.aggregation.as_ref().map(|agg| aggregate(agg, &matched));

        let page: Vec<LedgerEntry> = matched
            .into_iter()
            .skip(request.offset)
            .take(request.limit.unwrap_or(self.config.max_page_size))
            .collect();

        Ok(QueryResult {
            entries: page,
            tiers_searched,
            total_matched,
            aggregation,
        })
    }

    /// All entries carrying `parent_event_id` or `root_event_id` equal to
    /// `wo_id`, across every registered tier.
    pub async fn query_provenance(&self, wo_id: &str) -> Result<QueryResult, QueryError> {
        self.query(&QueryRequest {
            work_order_id: Some(wo_id.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn query_agent_history(&self, agent_id: &str, limit: usize) -> Result<QueryResult, QueryError> {
        self.query(&QueryRequest {
            agent_id: Some(agent_id.to_string()),
            limit: Some(limit.min(self.config.max_page_size)),
            sort: SortOrder::TimestampDesc,
            ..Default::default()
        })
        .await
    }

    pub async fn query_session(&self, session_id: &str) -> Result<QueryResult, QueryError> {
        self.query(&QueryRequest {
            session_id: Some(session_id.to_string()),
            sort: SortOrder::TimestampAsc,
            ..Default::default()
        })
        .await
    }

    pub async fn query_outcomes(&self, framework_id: &str, since: &str) -> Result<QueryResult, QueryError> {
        self.query(&QueryRequest {
            framework_id: Some(framework_id.to_string()),
            since: Some(since.to_string()),
            ..Default::default()
        })
        .await
    }
}

fn aggregate(aggregation: &Aggregation, entries: &[LedgerEntry]) -> AggregationResult {
    match aggregation {
        Aggregation::Count => AggregationResult::Count(entries.len()),
        Aggregation::TokenSum => {
            let sum: u64 = entries
                .iter()
                .map(|e| e.metadata.context_fingerprint.tokens_used.input + e.metadata.context_fingerprint.tokens_used.output)
                .sum();
            AggregationResult::TokenSum(sum)
        }
        Aggregation::QualityAvg => {
            let signals: Vec<f64> = entries.iter().filter_map(|e| e.metadata.outcome.quality_signal).collect();
            let avg = if signals.is_empty() {
                0.0
            } else {
                signals.iter().sum::<f64>() / signals.len() as f64
            };
            AggregationResult::QualityAvg(avg)
        }
        Aggregation::GroupBy(field) => {
            let mut groups: HashMap<String, usize> = HashMap::new();
            for entry in entries {
                let key = group_key(field, entry);
                *groups.entry(key).or_insert(0) += 1;
            }
            AggregationResult::GroupBy(groups)
        }
    }
}

fn group_key(field: &str, entry: &LedgerEntry) -> String {
    match field {
        "event_type" => entry.event_type.clone(),
        "agent_class" => entry.metadata.provenance.agent_class.clone().unwrap_or_default(),
        "status" => entry.metadata.outcome.status.clone().unwrap_or_default(),
        "tier" => format!("{}", entry.metadata.scope.tier),
        other => format!("unknown_field:{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::config::LedgerConfig;
    use helm_types::{Metadata, Outcome, Provenance, Scope};

    async fn seeded_ledger(dir: &std::path::Path, tier: Tier) -> Arc<LedgerClient> {
        let client = LedgerClient::open(dir.join("ledger"), LedgerConfig::default()).await.unwrap();
        for i in 0..3 {
            let metadata = Metadata {
                provenance: Provenance {
                    agent_id: Some("agent-1".into()),
                    session_id: Some("sess-1".into()),
                    ..Default::default()
                },
                scope: Scope { tier },
                outcome: Outcome {
                    status: Some("success".into()),
                    quality_signal: Some(0.5 + i as f64 * 0.1),
                    ..Default::default()
                },
                ..Default::default()
            };
            client.append(if i == 0 { "WO_PLANNED" } else { "WO_COMPLETED" }, metadata).await.unwrap();
        }
        Arc::new(client)
    }

    #[tokio::test]
    async fn filters_by_event_type_and_agent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = seeded_ledger(dir.path(), Tier::Ho1).await;
        let mut ledgers = HashMap::new();
        ledgers.insert(Tier::Ho1, ledger);
        let query = LedgerQuery::new(ledgers, QueryConfig::default());

        let request = QueryRequest {
            event_types: vec!["WO_COMPLETED".to_string()],
            agent_id: Some("agent-1".to_string()),
            ..Default::default()
        };
        let result = query.query(&request).await.unwrap();
        assert_eq!(result.total_matched, 2);
        assert!(result.entries.iter().all(|e| e.event_type == "WO_COMPLETED"));
    }

    #[tokio::test]
    async fn quality_avg_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = seeded_ledger(dir.path(), Tier::Ho1).await;
        let mut ledgers = HashMap::new();
        ledgers.insert(Tier::Ho1, ledger);
        let query = LedgerQuery::new(ledgers, QueryConfig::default());

        let request = QueryRequest {
            aggregation: Some(Aggregation::QualityAvg),
            ..Default::default()
        };
        let result = query.query(&request).await.unwrap();
        match result.aggregation {
            Some(AggregationResult::QualityAvg(avg)) => assert!((avg - 0.6).abs() < 1e-9),
            other => panic!("unexpected aggregation result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cross_tier_merge_reports_tiers_searched() {
        let dir_ho1 = tempfile::tempdir().unwrap();
        let dir_ho2 = tempfile::tempdir().unwrap();
        let mut ledgers = HashMap::new();
        ledgers.insert(Tier::Ho1, seeded_ledger(dir_ho1.path(), Tier::Ho1).await);
        ledgers.insert(Tier::Ho2, seeded_ledger(dir_ho2.path(), Tier::Ho2).await);
        let query = LedgerQuery::new(ledgers, QueryConfig::default());

        let result = query.query(&QueryRequest::default()).await.unwrap();
        assert_eq!(result.total_matched, 6);
        let mut tiers = result.tiers_searched.clone();
        tiers.sort_by_key(|t| t.rank());
        assert_eq!(tiers, vec![Tier::Ho1, Tier::Ho2]);
    }

    #[tokio::test]
    async fn limit_over_max_page_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = seeded_ledger(dir.path(), Tier::Ho1).await;
        let mut ledgers = HashMap::new();
        ledgers.insert(Tier::Ho1, ledger);
        let mut config = QueryConfig::default();
        config.max_page_size = 2;
        let query = LedgerQuery::new(ledgers, config);

        let request = QueryRequest {
            limit: Some(10),
            ..Default::default()
        };
        let err = query.query(&request).await.unwrap_err();
        assert!(matches!(err, QueryError::LimitExceedsPageSize { .. }));
    }
}
