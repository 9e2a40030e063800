mod cache;
mod custom;
mod error;
mod fragment;
mod request;
mod service;
mod template;

pub use cache::CacheKey;
pub use custom::CustomStageHandler;
pub use error::AttentionError;
pub use fragment::{estimate_tokens, AssembledContext, Fragment, StageStatus, StageTrace};
pub use request::AttentionRequest;
pub use service::AttentionService;
pub use template::resolve_template;
