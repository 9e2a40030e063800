use async_trait::async_trait;

use crate::error::AttentionError;
use crate::fragment::Fragment;
use crate::request::AttentionRequest;

/// Handler for a `custom` pipeline stage, registered under the stage's
/// `stage` name and looked up at execution time.
#[async_trait]
pub trait CustomStageHandler: Send + Sync {
    async fn run(&self, request: &AttentionRequest, config: &serde_json::Value) -> Result<Vec<Fragment>, AttentionError>;
}
