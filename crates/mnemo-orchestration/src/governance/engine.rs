//! The governance engine.
//!
//! `activate` classifies the conversation context, decides whether guidance
//! is warranted, retrieves rules for the relevant domains, accumulates
//! per-token effectiveness metrics, and renders the guidance blob. Failures
//! on the metric path are logged and swallowed; guidance never depends on
//! the store being reachable.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use mnemo_shared::ident::normalize_project_id_or_global;
use mnemo_shared::GLOBAL_PROJECT_ID;
use mnemo_store::types::TokenMetric;
use mnemo_store::Store;

use super::activity::{analyze_context, ActivityContext, ActivityType};
use super::tokens::{CachedTokenSource, TokenLoader, TokenRecord};

/// Outer cutoff: below this confidence nothing activates, keywords or not.
const MIN_CONFIDENCE: f64 = 0.10;

/// Main activation threshold for a recognized activity.
const ACTIVATION_THRESHOLD: f64 = 0.3;

/// Keywords that activate governance regardless of the threshold.
const HIGH_IMPACT_KEYWORDS: &[&str] = &[
    "security",
    "authentication",
    "database",
    "production",
    "deploy",
    "performance",
    "architecture",
    "api",
];

const CRITICAL_PRIORITY_KEYWORDS: &[&str] = &[
    "security",
    "authentication",
    "authorization",
    "vulnerability",
    "exploit",
];

const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "performance",
    "scalability",
    "reliability",
    "data integrity",
    "solid",
];

/// Keywords mined from token descriptions as rule triggers.
const TRIGGER_KEYWORDS: &[&str] = &[
    "api",
    "database",
    "security",
    "performance",
    "testing",
    "authentication",
    "caching",
    "optimization",
    "refactoring",
    "architecture",
    "design",
];

const MAX_RULES: usize = 10;
const MAX_PRINCIPLES: usize = 5;
const MAX_OVERLAP_BOOST: f64 = 0.15;
const OVERLAP_BOOST_STEP: f64 = 0.05;

const DEFAULT_TOKEN_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePriority {
    Critical,
    High,
    Medium,
    Low,
}

impl RulePriority {
    pub const fn as_str(self) -> &'static str {
        match self {
            RulePriority::Critical => "critical",
            RulePriority::High => "high",
            RulePriority::Medium => "medium",
            RulePriority::Low => "low",
        }
    }

    /// Weight used in the effectiveness sample.
    pub const fn weight(self) -> f64 {
        match self {
            RulePriority::Critical => 1.0,
            RulePriority::High => 0.85,
            RulePriority::Medium => 0.65,
            RulePriority::Low => 0.5,
        }
    }
}

/// A rule surfaced to the caller, attributed to its token when loaded
/// from a real source (fallback rules carry no `token_ref` and are never
/// metered).
#[derive(Debug, Clone)]
pub struct GovernanceRule {
    pub name: String,
    pub description: String,
    pub priority: RulePriority,
    pub triggers: Vec<String>,
    pub category: String,
    pub rules: Vec<String>,
    pub token_ref: Option<String>,
    pub source: Option<String>,
}

pub struct GovernanceEngine {
    tokens: CachedTokenSource,
    store: Store,
    /// Latest stored metric per token ref, refreshed after each upsert.
    overlay: DashMap<String, TokenMetric>,
}

impl std::fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceEngine").finish_non_exhaustive()
    }
}

impl GovernanceEngine {
    pub fn new(loader: Arc<dyn TokenLoader>, store: Store) -> Self {
        Self::with_cache_ttl(loader, store, DEFAULT_TOKEN_CACHE_TTL)
    }

    pub fn with_cache_ttl(loader: Arc<dyn TokenLoader>, store: Store, ttl: Duration) -> Self {
        Self {
            tokens: CachedTokenSource::new(loader, ttl),
            store,
            overlay: DashMap::new(),
        }
    }

    /// Analyze and, when warranted, produce governance guidance.
    ///
    /// Returns `None` when the activation rule does not hold: confidence
    /// below the outer cutoff, or neither a confident known activity nor a
    /// high-impact keyword.
    pub async fn activate(
        &self,
        user_message: &str,
        conversation_history: &[String],
        project_id: Option<&str>,
    ) -> Option<String> {
        let context = analyze_context(user_message, conversation_history);
        if context.confidence < MIN_CONFIDENCE {
            return None;
        }
        if !Self::should_activate(&context) {
            return None;
        }
        Some(self.recommend(&context, project_id).await)
    }

    /// Produce guidance unconditionally (the `force_activation` path).
    pub async fn activate_forced(
        &self,
        user_message: &str,
        conversation_history: &[String],
        project_id: Option<&str>,
    ) -> String {
        let context = analyze_context(user_message, conversation_history);
        self.recommend(&context, project_id).await
    }

    fn should_activate(context: &ActivityContext) -> bool {
        if context.confidence >= ACTIVATION_THRESHOLD
            && context.activity_type != ActivityType::Unknown
        {
            return true;
        }
        HIGH_IMPACT_KEYWORDS
            .iter()
            .any(|keyword| context.keyword_detected(keyword))
    }

    async fn recommend(&self, context: &ActivityContext, project_id: Option<&str>) -> String {
        let rules = self.relevant_rules(context);
        self.record_metrics(context, &rules, project_id).await;
        let output = Self::format_output(context, &rules);
        info!(
            activity = %context.activity_type,
            confidence = context.confidence,
            rule_count = rules.len(),
            "governance.activated"
        );
        output
    }

    /// Rules for the context's domains, capped at [`MAX_RULES`].
    fn relevant_rules(&self, context: &ActivityContext) -> Vec<GovernanceRule> {
        let mut rules = Vec::new();
        for domain in context.relevant_domains {
            rules.extend(self.rules_for_domain(domain));
            if rules.len() >= MAX_RULES {
                break;
            }
        }
        rules.truncate(MAX_RULES);
        rules
    }

    fn rules_for_domain(&self, domain: &str) -> Vec<GovernanceRule> {
        match self.tokens.tokens(domain) {
            Ok(tokens) => tokens.iter().map(Self::rule_from_token).collect(),
            Err(err) => {
                warn!(domain, error = %err, "token load failed, using fallback rules");
                Self::fallback_rules(domain)
            }
        }
    }

    fn rule_from_token(token: &TokenRecord) -> GovernanceRule {
        let description = token
            .description
            .clone()
            .unwrap_or_else(|| "No description available".to_string());
        GovernanceRule {
            priority: Self::determine_priority(&token.name, &description, token.rules.len()),
            triggers: Self::extract_triggers(&token.name, &description),
            name: token.name.clone(),
            description,
            category: token.kind.clone(),
            rules: token.rules.clone(),
            token_ref: Some(token.token_ref()),
            source: token.source.clone(),
        }
    }

    /// Hard-coded safety net when a domain's token source is unreadable.
    fn fallback_rules(domain: &str) -> Vec<GovernanceRule> {
        let (name, description, priority, triggers): (&str, &str, RulePriority, &[&str]) =
            match domain {
                "security" => (
                    "InputValidation",
                    "Always validate and sanitize user inputs",
                    RulePriority::Critical,
                    &["input", "validation", "sanitization"],
                ),
                "performance" => (
                    "AlgorithmComplexity",
                    "Consider algorithm complexity and optimize for performance",
                    RulePriority::High,
                    &["algorithm", "performance", "optimization"],
                ),
                "code-quality" => (
                    "CodeQuality",
                    "Follow coding best practices and maintain clean code",
                    RulePriority::High,
                    &["code quality", "refactoring", "maintainability"],
                ),
                _ => return Vec::new(),
            };
        vec![GovernanceRule {
            name: name.to_string(),
            description: description.to_string(),
            priority,
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            category: domain.to_string(),
            rules: Vec::new(),
            token_ref: None,
            source: None,
        }]
    }

    fn determine_priority(name: &str, description: &str, rule_count: usize) -> RulePriority {
        let haystack = format!("{} {}", name.to_lowercase(), description.to_lowercase());
        if CRITICAL_PRIORITY_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            return RulePriority::Critical;
        }
        if HIGH_PRIORITY_KEYWORDS.iter().any(|k| haystack.contains(k)) || rule_count > 5 {
            return RulePriority::High;
        }
        if rule_count > 2 {
            return RulePriority::High;
        }
        RulePriority::Medium
    }

    fn extract_triggers(name: &str, description: &str) -> Vec<String> {
        let mut triggers = vec![name.to_lowercase()];
        let description = description.to_lowercase();
        for keyword in TRIGGER_KEYWORDS {
            if description.contains(keyword) && !triggers.iter().any(|t| t == keyword) {
                triggers.push((*keyword).to_string());
            }
        }
        triggers
    }

    /// Effectiveness sample for one rule application, bounded to [0, 1]:
    /// `confidence × priorityWeight × (1 + overlapBoost)`.
    pub fn effectiveness_sample(
        confidence: f64,
        priority: RulePriority,
        triggers: &[String],
        detected_keywords: &[String],
    ) -> f64 {
        let overlap = triggers
            .iter()
            .filter(|t| detected_keywords.iter().any(|k| k == *t))
            .count();
        let boost = (OVERLAP_BOOST_STEP * overlap as f64).min(MAX_OVERLAP_BOOST);
        (confidence * priority.weight() * (1.0 + boost)).clamp(0.0, 1.0)
    }

    async fn record_metrics(
        &self,
        context: &ActivityContext,
        rules: &[GovernanceRule],
        project_id: Option<&str>,
    ) {
        let project_id = normalize_project_id_or_global(project_id)
            .unwrap_or_else(|_| GLOBAL_PROJECT_ID.to_string());

        for rule in rules {
            let Some(token_ref) = &rule.token_ref else {
                continue;
            };
            let sample = Self::effectiveness_sample(
                context.confidence,
                rule.priority,
                &rule.triggers,
                &context.detected_keywords,
            );
            match self
                .store
                .record_token_metric(token_ref, &project_id, sample, Utc::now())
                .await
            {
                Ok(metric) => {
                    self.overlay.insert(token_ref.clone(), metric);
                }
                Err(err) if err.is_unavailable() => {
                    tracing::debug!(token_ref, "metric skipped, store unavailable");
                }
                Err(err) => {
                    warn!(token_ref, error = %err, "failed to record token metric");
                }
            }
        }
    }

    /// Latest stored metric for a token, as observed by this process.
    pub fn latest_metric(&self, token_ref: &str) -> Option<TokenMetric> {
        self.overlay.get(token_ref).map(|m| m.value().clone())
    }

    fn format_output(context: &ActivityContext, rules: &[GovernanceRule]) -> String {
        let activity = context.activity_type.display_name();
        let critical_count = rules
            .iter()
            .filter(|r| r.priority == RulePriority::Critical)
            .count();
        let high_count = rules
            .iter()
            .filter(|r| r.priority == RulePriority::High)
            .count();

        let mut out = Vec::new();
        out.push("**GOVERNANCE ACTIVATED**".to_string());
        out.push(String::new());
        out.push(format!("**Activity Detected:** {activity}"));
        out.push(format!("**Confidence:** {:.1}%", context.confidence * 100.0));
        out.push(String::new());

        if rules.is_empty() {
            out.push(format!(
                "**Summary:** No specific governance rules found for {activity} activities."
            ));
        } else {
            let mut summary = format!(
                "**Summary:** For {activity} activities, {} relevant governance rules apply.",
                rules.len()
            );
            if critical_count > 0 {
                summary.push_str(&format!(" {critical_count} are CRITICAL priority."));
            }
            if high_count > 0 {
                summary.push_str(&format!(" {high_count} are HIGH priority."));
            }
            out.push(summary);
        }
        out.push(String::new());

        let principles: Vec<&GovernanceRule> = rules
            .iter()
            .filter(|r| matches!(r.priority, RulePriority::Critical | RulePriority::High))
            .take(MAX_PRINCIPLES)
            .collect();
        if !principles.is_empty() {
            out.push("**Key Principles to Follow:**".to_string());
            for rule in principles {
                out.push(format!("- {}: {}", rule.name, rule.description));
            }
            out.push(String::new());
        }

        let warnings = Self::warnings(context, critical_count);
        if !warnings.is_empty() {
            out.push("**Important Warnings:**".to_string());
            out.extend(warnings.into_iter().map(|w| format!("- {w}")));
            out.push(String::new());
        }

        out.push(
            "**Recommendation:** Apply these governance principles during planning and \
             implementation."
                .to_string(),
        );
        out.push(String::new());
        out.push("---".to_string());
        out.join("\n")
    }

    fn warnings(context: &ActivityContext, critical_count: usize) -> Vec<String> {
        let mut warnings = Vec::new();
        match context.activity_type {
            ActivityType::Security => warnings.push(
                "Security implementation detected - ensure thorough testing and review".to_string(),
            ),
            ActivityType::Database => warnings.push(
                "Database operations detected - consider performance and data integrity"
                    .to_string(),
            ),
            ActivityType::ApiDesign => warnings.push(
                "API design detected - ensure proper authentication and input validation"
                    .to_string(),
            ),
            _ => {}
        }

        let high_impact: Vec<&str> = HIGH_IMPACT_KEYWORDS
            .iter()
            .filter(|k| context.keyword_detected(k))
            .copied()
            .collect();
        if !high_impact.is_empty() {
            warnings.push(format!(
                "High-impact keywords detected ({}) - apply the relevant security governance \
                 before proceeding",
                high_impact.join(", ")
            ));
        }

        if critical_count > 0 {
            warnings.push(format!(
                "{critical_count} CRITICAL governance rules must be followed"
            ));
        }
        warnings
    }
}
