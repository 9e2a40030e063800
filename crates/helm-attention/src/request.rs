use helm_types::{PromptContract, Tier};

#[derive(Clone, Debug)]
pub struct AttentionRequest {
    pub agent_id: String,
    pub agent_class: String,
    pub framework_id: Option<String>,
    pub tier: Tier,
    pub work_order_id: String,
    pub session_id: String,
    pub prompt_contract: PromptContract,
    pub template_override: Option<String>,
}
