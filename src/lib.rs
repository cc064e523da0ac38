pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod logging;
pub mod providers;
pub mod retry;
pub mod storage;
pub mod usage;

pub use config::{GatewayConfig, Provider, Settings};
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use providers::types::{
    ChatMessage, CompletionOptions, CompletionResult, FinishReason, FunctionCall, FunctionDef,
    Role, Usage,
};
pub use usage::{AlertLevel, CallContext, QuotaConfig, UsageScope};
