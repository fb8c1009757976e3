//! Trial execution engine

pub mod contract;
pub mod conversation;
pub mod rate_limiter;

pub use contract::{ContractError, ResponseContract, SchemaTool, ScoresContract};
pub use conversation::{TrialConversationRunner, TrialResult, TrialSettings, TurnFailure};
pub use rate_limiter::RateLimiter;
