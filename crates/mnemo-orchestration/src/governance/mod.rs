//! Pre-action governance: activity classification, rule retrieval, and
//! token effectiveness accumulation.

pub mod activity;
pub mod engine;
pub mod tokens;

pub use activity::{analyze_context, ActivityContext, ActivityType};
pub use engine::{GovernanceEngine, GovernanceRule, RulePriority};
pub use tokens::{CachedTokenSource, FileTokenLoader, TokenLoadError, TokenLoader, TokenRecord};
