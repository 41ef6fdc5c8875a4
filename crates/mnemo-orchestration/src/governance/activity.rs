//! Activity classification over conversation context.
//!
//! An ordered pattern table scores each activity type: every pattern match
//! contributes 0.2, capped at 1.0 per activity. The primary activity is the
//! argmax with ties broken by declaration order, and the matched substrings
//! become the detected-keyword set.

use once_cell::sync::Lazy;
use regex::Regex;

/// Kinds of engineering activity the governance engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityType {
    Planning,
    Coding,
    Architecture,
    Refactoring,
    Testing,
    Security,
    Performance,
    Database,
    ApiDesign,
    Deployment,
    Unknown,
}

impl ActivityType {
    /// Detectable activities in declaration order; `Unknown` is the
    /// fallback and never scored.
    pub const DETECTABLE: [ActivityType; 10] = [
        ActivityType::Planning,
        ActivityType::Coding,
        ActivityType::Architecture,
        ActivityType::Refactoring,
        ActivityType::Testing,
        ActivityType::Security,
        ActivityType::Performance,
        ActivityType::Database,
        ActivityType::ApiDesign,
        ActivityType::Deployment,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ActivityType::Planning => "planning",
            ActivityType::Coding => "coding",
            ActivityType::Architecture => "architecture",
            ActivityType::Refactoring => "refactoring",
            ActivityType::Testing => "testing",
            ActivityType::Security => "security",
            ActivityType::Performance => "performance",
            ActivityType::Database => "database",
            ActivityType::ApiDesign => "api_design",
            ActivityType::Deployment => "deployment",
            ActivityType::Unknown => "unknown",
        }
    }

    /// Human form used in guidance output, e.g. `Api Design`.
    pub fn display_name(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fixed mapping from activity to governance rule domains.
    pub const fn domains(self) -> &'static [&'static str] {
        match self {
            ActivityType::Planning => &["architecture", "ai-learning"],
            ActivityType::Coding => &["code-quality", "security", "performance"],
            ActivityType::Architecture => &["architecture", "performance", "reliability"],
            ActivityType::Refactoring => &["code-quality", "performance", "reliability"],
            ActivityType::Testing => &["testing", "reliability"],
            ActivityType::Security => &["security", "reliability"],
            ActivityType::Performance => &["performance", "architecture"],
            ActivityType::Database => &["data", "performance", "security"],
            ActivityType::ApiDesign => &["architecture", "security", "performance"],
            ActivityType::Deployment => &["reliability", "security", "performance"],
            ActivityType::Unknown => &[],
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Each matched pattern occurrence contributes this much confidence.
const MATCH_WEIGHT: f64 = 0.2;

static ACTIVITY_PATTERNS: Lazy<Vec<(ActivityType, Vec<Regex>)>> = Lazy::new(|| {
    let table: [(ActivityType, &[&str]); 10] = [
        (
            ActivityType::Planning,
            &[
                r"\b(?:plan|planning|design|approach|strategy|outline)\b",
                r"\b(?:how to|let's|should we|going to)\b",
                r"\b(?:create|build|implement|develop)\b",
                r"\b(?:step by step|roadmap|timeline)\b",
            ],
        ),
        (
            ActivityType::Coding,
            &[
                r"\b(?:code|coding|program|script|function|class|method)\b",
                r"\b(?:write|implement|create|build).*(?:code|function|class|api)\b",
                r"\b(?:python|javascript|java|go|rust|typescript|html|css)\b",
                r"\b(?:algorithm|logic|implementation)\b",
            ],
        ),
        (
            ActivityType::Architecture,
            &[
                r"\b(?:architecture|system design|microservices|monolith)\b",
                r"\b(?:database design|schema|data model)\b",
                r"\b(?:scalability|distributed|cloud)\b",
                r"\b(?:patterns|design patterns|architectural)\b",
            ],
        ),
        (
            ActivityType::Refactoring,
            &[
                r"\b(?:refactor|refactoring|cleanup|optimize|improve)\b",
                r"\b(?:technical debt|code quality|maintainability)\b",
                r"\b(?:restructure|reorganize|simplify)\b",
            ],
        ),
        (
            ActivityType::Testing,
            &[
                r"\b(?:test|testing|unit test|integration test|e2e)\b",
                r"\b(?:coverage|test cases|assertions)\b",
                r"\b(?:mock|stub|fixture)\b",
            ],
        ),
        (
            ActivityType::Security,
            &[
                r"\b(?:security|authentication|authorization|encryption)\b",
                r"\b(?:vulnerability|threat|attack|exploit)\b",
                r"\b(?:oauth|jwt|ssl|tls|https)\b",
            ],
        ),
        (
            ActivityType::Performance,
            &[
                r"\b(?:performance|optimization|speed|latency|throughput)\b",
                r"\b(?:caching|memory|cpu|database query)\b",
                r"\b(?:bottleneck|profiling|benchmark)\b",
            ],
        ),
        (
            ActivityType::Database,
            &[
                r"\b(?:database|sql|nosql|query|schema|migration)\b",
                r"\b(?:postgres|mysql|mongodb|redis)\b",
                r"\b(?:index|transaction|orm)\b",
            ],
        ),
        (
            ActivityType::ApiDesign,
            &[
                r"\b(?:api|endpoint|rest|graphql|grpc)\b",
                r"\b(?:route|handler|controller|service)\b",
                r"\b(?:request|response|payload|json)\b",
            ],
        ),
        (
            ActivityType::Deployment,
            &[
                r"\b(?:deploy|deployment|docker|kubernetes|ci/cd)\b",
                r"\b(?:production|staging|environment|infrastructure)\b",
                r"\b(?:pipeline|build|release)\b",
            ],
        ),
    ];

    table
        .into_iter()
        .map(|(activity, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).expect("static activity pattern"))
                .collect();
            (activity, compiled)
        })
        .collect()
});

/// Result of context analysis.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub activity_type: ActivityType,
    pub confidence: f64,
    /// Matched keywords across all patterns, deduped, first-seen order.
    pub detected_keywords: Vec<String>,
    pub relevant_domains: &'static [&'static str],
}

impl ActivityContext {
    pub fn keyword_detected(&self, keyword: &str) -> bool {
        self.detected_keywords.iter().any(|k| k == keyword)
    }
}

/// Analyze the current message plus up to the last three history entries.
pub fn analyze_context(user_message: &str, conversation_history: &[String]) -> ActivityContext {
    let mut parts: Vec<&str> = conversation_history
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(String::as_str)
        .collect();
    parts.push(user_message);
    let full_context = parts.join(" ").to_lowercase();

    let mut primary = ActivityType::Unknown;
    let mut best_score = 0.0_f64;
    let mut detected_keywords: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (activity, patterns) in ACTIVITY_PATTERNS.iter() {
        let mut score = 0.0_f64;
        for pattern in patterns {
            for found in pattern.find_iter(&full_context) {
                score += MATCH_WEIGHT;
                let keyword = found.as_str().to_string();
                if seen.insert(keyword.clone()) {
                    detected_keywords.push(keyword);
                }
            }
        }
        let score = score.min(1.0);
        // Strictly-greater keeps declaration order as the tie-break.
        if score > 0.0 && score > best_score {
            best_score = score;
            primary = *activity;
        }
    }

    ActivityContext {
        activity_type: primary,
        confidence: best_score,
        detected_keywords,
        relevant_domains: primary.domains(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(message: &str) -> ActivityContext {
        analyze_context(message, &[])
    }

    #[test]
    fn test_no_signal_is_unknown() {
        let ctx = analyze("the quick brown fox");
        assert_eq!(ctx.activity_type, ActivityType::Unknown);
        assert_eq!(ctx.confidence, 0.0);
        assert!(ctx.detected_keywords.is_empty());
        assert!(ctx.relevant_domains.is_empty());
    }

    #[test]
    fn test_security_detection() {
        let ctx = analyze("we need authentication and encryption for the login flow");
        assert_eq!(ctx.activity_type, ActivityType::Security);
        assert!(ctx.confidence >= 0.4);
        assert!(ctx.keyword_detected("authentication"));
        assert_eq!(ctx.relevant_domains, &["security", "reliability"]);
    }

    #[test]
    fn test_score_caps_at_one() {
        let ctx = analyze(
            "security security security authentication authorization encryption \
             vulnerability threat attack exploit oauth jwt ssl tls https",
        );
        assert_eq!(ctx.activity_type, ActivityType::Security);
        assert_eq!(ctx.confidence, 1.0);
    }

    #[test]
    fn test_tie_breaks_by_declaration_order() {
        // "design" scores for planning; "schema" scores for architecture
        // and database. With one match each, planning is declared first.
        let ctx = analyze("design the schema");
        assert_eq!(ctx.confidence, 0.2);
        assert_eq!(ctx.activity_type, ActivityType::Planning);
    }

    #[test]
    fn test_history_contributes_last_three_entries() {
        let history = vec![
            "old and irrelevant".to_string(),
            "we should refactor this module".to_string(),
            "the cleanup is overdue".to_string(),
            "technical debt everywhere".to_string(),
        ];
        let ctx = analyze_context("let me restructure it", &history);
        assert_eq!(ctx.activity_type, ActivityType::Refactoring);
        assert!(ctx.confidence >= 0.6);
    }

    #[test]
    fn test_history_beyond_three_entries_is_ignored() {
        let history = vec![
            "deploy deploy deploy deploy".to_string(),
            "nothing".to_string(),
            "nothing".to_string(),
            "nothing".to_string(),
        ];
        let ctx = analyze_context("hello there", &history);
        assert_eq!(ctx.activity_type, ActivityType::Unknown);
    }

    #[test]
    fn test_keywords_are_deduped_in_first_seen_order() {
        let ctx = analyze("test the test with a mock mock");
        let test_count = ctx.detected_keywords.iter().filter(|k| *k == "test").count();
        assert_eq!(test_count, 1);
        assert!(ctx.keyword_detected("mock"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(ActivityType::ApiDesign.display_name(), "Api Design");
        assert_eq!(ActivityType::Planning.display_name(), "Planning");
    }

    #[test]
    fn test_domain_table_matches_contract() {
        assert_eq!(
            ActivityType::Database.domains(),
            &["data", "performance", "security"]
        );
        assert_eq!(
            ActivityType::Deployment.domains(),
            &["reliability", "security", "performance"]
        );
    }
}
