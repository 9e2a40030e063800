use helm_types::{InputContext, PromptContract};

/// Render a contract's template against assembled context and the WO's
/// input. Placeholders are literal `{{input}}`/`{{context}}` substrings, the
/// same flat style the contract fixtures elsewhere in the workspace use —
/// no templating engine, since contracts are short, operator-authored
/// strings rather than general documents.
pub fn render_prompt(contract: &PromptContract, assembled_context: Option<&str>, input: &InputContext) -> String {
    contract
        .template
        .replace("{{input}}", &input.user_input)
        .replace("{{context}}", assembled_context.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_input_and_context() {
        let contract = PromptContract {
            contract_id: "c1".to_string(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            template: "context:\n{{context}}\n\nuser:\n{{input}}".to_string(),
            required_context: Default::default(),
            tools: vec![],
            budget_defaults: Default::default(),
        };
        let input = InputContext {
            user_input: "hello".to_string(),
            ..Default::default()
        };
        let rendered = render_prompt(&contract, Some("some facts"), &input);
        assert_eq!(rendered, "context:\nsome facts\n\nuser:\nhello");
    }

    #[test]
    fn missing_context_substitutes_empty() {
        let contract = PromptContract {
            contract_id: "c1".to_string(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            template: "[{{context}}] {{input}}".to_string(),
            required_context: Default::default(),
            tools: vec![],
            budget_defaults: Default::default(),
        };
        let input = InputContext {
            user_input: "hi".to_string(),
            ..Default::default()
        };
        assert_eq!(render_prompt(&contract, None, &input), "[] hi");
    }
}
