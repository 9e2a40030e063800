use chrono::{DateTime, Duration, Utc};
use helm_types::{LedgerEntry, Tier};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    Session,
    Today,
    #[default]
    All,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    TimestampDesc,
    TimestampAsc,
    QualityDesc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    TokenSum,
    QualityAvg,
    GroupBy(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    // Provenance filters
    pub agent_id: Option<String>,
    pub agent_class: Option<String>,
    pub framework_id: Option<String>,
    pub package_id: Option<String>,
    pub work_order_id: Option<String>,
    pub session_id: Option<String>,

    // Event filter
    pub event_types: Vec<String>,

    // Outcome filters
    pub status: Option<String>,
    pub min_quality_signal: Option<f64>,

    // Scope filters
    pub tiers: Vec<Tier>,
    /// Reserved: the ledger schema does not yet carry a domain-tag field, so
    /// this filter currently matches unconditionally. Kept in the request
    /// shape so callers (and a future schema revision) have somewhere to put it.
    pub domain_tags: Vec<String>,

    // Time filters
    pub since: Option<String>,
    pub until: Option<String>,
    pub recency: Recency,

    // Relational filters
    pub parent_event_id: Option<String>,
    pub root_event_id: Option<String>,

    // Pagination and sort
    pub offset: usize,
    pub limit: Option<usize>,
    pub sort: SortOrder,

    pub aggregation: Option<Aggregation>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `since`/`until`/`recency` against `session_start` (the time the
    /// query's `session_id` began) into a concrete, inclusive-start/exclusive-end
    /// window. `None` on either side means unbounded on that side.
    pub fn resolve_window(&self, session_start: Option<DateTime<Utc>>) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), QueryError> {
        let since = match &self.since {
            Some(s) => Some(parse_time(s, session_start)?),
            None => match self.recency {
                Recency::Session => session_start,
                Recency::Today => Some(Utc::now() - Duration::hours(24)),
                Recency::All => None,
            },
        };
        let until = match &self.until {
            Some(s) => Some(parse_time(s, session_start)?),
            None => None,
        };
        Ok((since, until))
    }

    /// Whether `entry` satisfies every filter on this request except time
    /// bounds, which `resolve_window` handles separately since they need the
    /// session's start time.
    pub fn matches_without_window(&self, entry: &LedgerEntry) -> bool {
        let meta = &entry.metadata;

        if let Some(id) = &self.agent_id {
            if meta.provenance.agent_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(class) = &self.agent_class {
            if meta.provenance.agent_class.as_deref() != Some(class.as_str()) {
                return false;
            }
        }
        if let Some(fid) = &self.framework_id {
            if meta.provenance.framework_id.as_deref() != Some(fid.as_str()) {
                return false;
            }
        }
        if let Some(pid) = &self.package_id {
            if meta.provenance.package_id.as_deref() != Some(pid.as_str()) {
                return false;
            }
        }
        if let Some(wo) = &self.work_order_id {
            if meta.provenance.work_order_id.as_deref() != Some(wo.as_str()) {
                return false;
            }
        }
        if let Some(sid) = &self.session_id {
            if meta.provenance.session_id.as_deref() != Some(sid.as_str()) {
                return false;
            }
        }
        if !self.event_types.is_empty() && !self.event_types.iter().any(|t| t == &entry.event_type) {
            return false;
        }
        if let Some(status) = &self.status {
            if meta.outcome.status.as_deref() != Some(status.as_str()) {
                return false;
            }
        }
        if let Some(min_q) = self.min_quality_signal {
            if meta.outcome.quality_signal.unwrap_or(f64::MIN) < min_q {
                return false;
            }
        }
        if !self.tiers.is_empty() && !self.tiers.contains(&meta.scope.tier) {
            return false;
        }
        if let Some(parent) = &self.parent_event_id {
            if meta.relational.parent_event_id.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(root) = &self.root_event_id {
            if meta.relational.root_event_id.as_deref() != Some(root.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Accepts ISO-8601 timestamps, relative duration strings (`7d`, `24h`,
/// `30m`), and the literal `"session"` which resolves to the query's session
/// start time.
fn parse_time(s: &str, session_start: Option<DateTime<Utc>>) -> Result<DateTime<Utc>, QueryError> {
    if s == "session" {
        return session_start.ok_or_else(|| QueryError::BadTimeExpression(s.to_string()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Some(duration) = parse_duration(s) {
        return Ok(Utc::now() - duration);
    }
    Err(QueryError::BadTimeExpression(s.to_string()))
}

fn parse_duration(s: &str) -> Option<Duration> {
    let (digits, unit) = s.split_at(s.len().checked_sub(1)?);
    let n: i64 = digits.parse().ok()?;
    match unit {
        "d" => Some(Duration::days(n)),
        "h" => Some(Duration::hours(n)),
        "m" => Some(Duration::minutes(n)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_strings() {
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
        assert_eq!(parse_duration("24h"), Some(Duration::hours(24)));
        assert_eq!(parse_duration("30m"), Some(Duration::minutes(30)));
        assert_eq!(parse_duration("bogus"), None);
    }

    #[test]
    fn session_recency_resolves_to_session_start() {
        let request = QueryRequest {
            recency: Recency::Session,
            ..Default::default()
        };
        let start = Utc::now() - Duration::hours(1);
        let (since, until) = request.resolve_window(Some(start)).unwrap();
        assert_eq!(since, Some(start));
        assert_eq!(until, None);
    }
}
