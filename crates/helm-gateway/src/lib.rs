//! LLMGateway + Provider interface (C6): the single chokepoint every tier
//! routes LLM calls through — auth, budget, circuit breaker, dispatch,
//! logging, and debit, in that order.

pub mod circuit_breaker;
pub mod error;
pub mod gateway;
pub mod provider;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use error::GatewayError;
pub use gateway::{LLMGateway, PromptOutcome, PromptRequest, PromptResponse};
pub use provider::{MockProvider, Provider, ProviderError, ProviderResponse, Usage};
