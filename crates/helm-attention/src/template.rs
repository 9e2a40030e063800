use helm_types::{AppliesTo, AttentionBudget, AttentionFallback, AttentionTemplate, FallbackAction, StageSpec, StageType, Tier};

use crate::error::AttentionError;

/// Resolve which template governs this request. An explicit override always
/// wins. Otherwise the most specific matching template wins, where
/// specificity is `framework_id > agent_class > tier` (a declared,
/// non-wildcard constraint on a higher-priority field outweighs any number of
/// lower-priority ones). A tie at the winning specificity is a fail-closed
/// error rather than an arbitrary pick.
pub fn resolve_template<'a>(
    templates: &'a [AttentionTemplate],
    override_id: Option<&str>,
    agent_class: &str,
    framework_id: Option<&str>,
    tier: Tier,
) -> Result<AttentionTemplate, AttentionError> {
    if let Some(id) = override_id {
        return templates
            .iter()
            .find(|t| t.template_id == id)
            .cloned()
            .ok_or_else(|| AttentionError::TemplateNotFound(id.to_string()));
    }

    let mut best: Vec<(&'a AttentionTemplate, u32)> = Vec::new();
    let mut best_score = -1i64;

    for template in templates {
        if let Some(score) = match_score(&template.applies_to, agent_class, framework_id, tier) {
            let score = score as i64;
            if score > best_score {
                best_score = score;
                best.clear();
                best.push((template, score as u32));
            } else if score == best_score {
                best.push((template, score as u32));
            }
        }
    }

    match best.len() {
        0 => Ok(synthetic_minimal_template()),
        1 => Ok(best[0].0.clone()),
        _ => Err(AttentionError::AmbiguousTemplateMatch {
            agent_class: Some(agent_class.to_string()),
            framework_id: framework_id.map(|s| s.to_string()),
            tier: format!("{tier}"),
        }),
    }
}

/// `None` if `applies_to` declares a constraint the request doesn't satisfy.
/// Otherwise the weighted count of constraints actually declared, so that a
/// template narrowed on more/higher-priority fields scores higher.
fn match_score(applies_to: &AppliesTo, agent_class: &str, framework_id: Option<&str>, tier: Tier) -> Option<u32> {
    let mut score = 0u32;

    if !applies_to.framework_id.is_empty() {
        let fid = framework_id?;
        if !applies_to.framework_id.iter().any(|f| f == fid) {
            return None;
        }
        score += 4;
    }
    if !applies_to.agent_class.is_empty() {
        if !applies_to.agent_class.iter().any(|c| c == agent_class) {
            return None;
        }
        score += 2;
    }
    if !applies_to.tier.is_empty() {
        if !applies_to.tier.contains(&tier) {
            return None;
        }
        score += 1;
    }
    Some(score)
}

fn synthetic_minimal_template() -> AttentionTemplate {
    AttentionTemplate {
        template_id: "synthetic-minimal".to_string(),
        applies_to: AppliesTo::default(),
        // Empty on purpose: merge_required_context fills it from the prompt
        // contract's required_context, so this only ever reads what was asked for.
        pipeline: vec![],
        budget: AttentionBudget {
            max_context_tokens: 8_000,
            max_queries: 10,
            timeout_ms: 5_000,
            chars_per_token: 4,
        },
        fallback: AttentionFallback {
            on_empty: FallbackAction::ReturnPartial,
            on_timeout: FallbackAction::ReturnPartial,
        },
    }
}

/// Fill gaps in `template`'s pipeline from the prompt contract's
/// `required_context`, never duplicating a stage type the template already
/// runs.
pub fn merge_required_context(mut template: AttentionTemplate, required: &helm_types::RequiredContext) -> AttentionTemplate {
    let has = |stage_type: StageType| template.pipeline.iter().any(|s| s.stage_type == stage_type);

    if !required.ledger_queries.is_empty() && !has(StageType::LedgerQuery) {
        template.pipeline.push(StageSpec {
            stage: "required_ledger_query".to_string(),
            stage_type: StageType::LedgerQuery,
            enabled: true,
            config: serde_json::json!({ "queries": required.ledger_queries }),
        });
    }
    if !required.framework_refs.is_empty() && !has(StageType::RegistryQuery) {
        template.pipeline.push(StageSpec {
            stage: "required_registry_query".to_string(),
            stage_type: StageType::RegistryQuery,
            enabled: true,
            config: serde_json::json!({ "framework_refs": required.framework_refs }),
        });
    }
    if !required.file_refs.is_empty() && !has(StageType::FileRead) {
        template.pipeline.push(StageSpec {
            stage: "required_file_read".to_string(),
            stage_type: StageType::FileRead,
            enabled: true,
            config: serde_json::json!({ "paths": required.file_refs }),
        });
    }

    template
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_types::AttentionBudget;

    fn template(id: &str, applies_to: AppliesTo) -> AttentionTemplate {
        AttentionTemplate {
            template_id: id.to_string(),
            applies_to,
            pipeline: vec![],
            budget: AttentionBudget {
                max_context_tokens: 1000,
                max_queries: 5,
                timeout_ms: 1000,
                chars_per_token: 4,
            },
            fallback: AttentionFallback::default(),
        }
    }

    #[test]
    fn framework_specific_beats_agent_class_specific() {
        let generic = template(
            "generic",
            AppliesTo {
                agent_class: vec!["classifier".into()],
                framework_id: vec![],
                tier: vec![],
            },
        );
        let specific = template(
            "specific",
            AppliesTo {
                agent_class: vec![],
                framework_id: vec!["fw-1".into()],
                tier: vec![],
            },
        );
        let templates = vec![generic, specific];
        let resolved = resolve_template(&templates, None, "classifier", Some("fw-1"), Tier::Ho1).unwrap();
        assert_eq!(resolved.template_id, "specific");
    }

    #[test]
    fn no_match_falls_back_to_synthetic_minimal() {
        let templates = vec![template(
            "other",
            AppliesTo {
                agent_class: vec!["synthesizer".into()],
                framework_id: vec![],
                tier: vec![],
            },
        )];
        let resolved = resolve_template(&templates, None, "classifier", None, Tier::Ho1).unwrap();
        assert_eq!(resolved.template_id, "synthetic-minimal");
    }

    #[test]
    fn tie_at_same_specificity_is_ambiguous() {
        let a = template(
            "a",
            AppliesTo {
                agent_class: vec!["classifier".into()],
                framework_id: vec![],
                tier: vec![],
            },
        );
        let b = template(
            "b",
            AppliesTo {
                agent_class: vec!["classifier".into()],
                framework_id: vec![],
                tier: vec![],
            },
        );
        let templates = vec![a, b];
        let err = resolve_template(&templates, None, "classifier", None, Tier::Ho1).unwrap_err();
        assert!(matches!(err, AttentionError::AmbiguousTemplateMatch { .. }));
    }

    #[test]
    fn explicit_override_always_wins() {
        let a = template("a", AppliesTo::default());
        let b = template("b", AppliesTo::default());
        let templates = vec![a, b];
        let resolved = resolve_template(&templates, Some("b"), "classifier", None, Tier::Ho1).unwrap();
        assert_eq!(resolved.template_id, "b");
    }
}
