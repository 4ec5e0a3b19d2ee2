//! Keyword-driven complexity analysis.
//!
//! Scores are deterministic: the same title and description always produce the same
//! analysis, which is what lets the orchestrator cache results per task id.

use crate::error::{ErrorKind, ForgeError, ForgeResult};
use crate::synthesis::{ResourceCategory, ResourceRequirement};
use crate::task::types::{Task, TaskId};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, error};

/// Text longer than this is rejected rather than scanned
const MAX_ANALYZED_BYTES: usize = 256 * 1024;

/// Base score used when no category phrase matches
const UNMATCHED_BASE_SCORE: u32 = 35;

const DEPENDENCY_WEIGHT: u32 = 10;
const DEPENDENCY_CAP: u32 = 30;
const RISK_WEIGHT: u32 = 15;
const RISK_CAP: u32 = 45;
const CAPABILITY_WEIGHT: u32 = 5;
const CAPABILITY_CAP: u32 = 25;

/// Complexity bands: simple < 30 <= moderate < 60 <= complex < 80 <= expert
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityCategory {
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl ComplexityCategory {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..30 => ComplexityCategory::Simple,
            30..60 => ComplexityCategory::Moderate,
            60..80 => ComplexityCategory::Complex,
            _ => ComplexityCategory::Expert,
        }
    }

    fn base_score(&self) -> u32 {
        match self {
            ComplexityCategory::Simple => 20,
            ComplexityCategory::Moderate => 45,
            ComplexityCategory::Complex => 70,
            ComplexityCategory::Expert => 85,
        }
    }
}

impl fmt::Display for ComplexityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComplexityCategory::Simple => "simple",
            ComplexityCategory::Moderate => "moderate",
            ComplexityCategory::Complex => "complex",
            ComplexityCategory::Expert => "expert",
        };
        f.write_str(label)
    }
}

/// Result of analyzing one task
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ComplexityAnalysis {
    pub task_id: TaskId,
    pub score: u8,
    pub category: ComplexityCategory,
    pub capabilities: BTreeSet<String>,
    pub recommended_tools: BTreeSet<String>,
    /// Person-hours
    pub estimated_effort_hours: f64,
    pub risk_factors: Vec<String>,
    pub system_dependencies: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Catalog entry describing how a recommended tool should be synthesized
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
    pub priority: u8,
    pub critical: bool,
    pub parameters: fn() -> serde_json::Value,
}

struct CategoryRule {
    category: ComplexityCategory,
    phrases: &'static [&'static str],
}

struct CapabilityRule {
    capability: &'static str,
    phrases: &'static [&'static str],
    tools: &'static [&'static str],
}

struct LabelRule {
    label: &'static str,
    phrases: &'static [&'static str],
}

const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: ComplexityCategory::Simple,
        phrases: &[
            "typo", "typos", "docs", "documentation", "readme", "comment", "comments", "rename",
            "formatting", "whitespace", "spelling", "changelog", "minor",
        ],
    },
    CategoryRule {
        category: ComplexityCategory::Moderate,
        phrases: &[
            "feature", "add", "update", "bug", "endpoint", "component", "improve", "validation",
            "form", "refactor", "implement",
        ],
    },
    CategoryRule {
        category: ComplexityCategory::Complex,
        phrases: &[
            "integration", "migration", "architecture", "performance", "optimize", "database",
            "authentication", "caching", "pipeline", "concurrent", "concurrency",
        ],
    },
    CategoryRule {
        category: ComplexityCategory::Expert,
        phrases: &[
            "real-time", "realtime", "distributed", "security", "websocket", "websockets",
            "encryption", "consensus", "scalability", "microservices", "machine learning",
        ],
    },
];

const CAPABILITY_RULES: &[CapabilityRule] = &[
    CapabilityRule {
        capability: "typescript",
        phrases: &["typescript", "tsx", "node.js", "nodejs", "javascript"],
        tools: &["tsc", "eslint"],
    },
    CapabilityRule {
        capability: "rust",
        phrases: &["rust", "cargo", "crate"],
        tools: &["cargo-check", "clippy"],
    },
    CapabilityRule {
        capability: "python",
        phrases: &["python", "django", "flask", "pip"],
        tools: &["pytest", "ruff"],
    },
    CapabilityRule {
        capability: "testing",
        phrases: &["test", "tests", "testing", "coverage", "unit test", "integration test"],
        tools: &["test-runner", "coverage-reporter"],
    },
    CapabilityRule {
        capability: "realtime",
        phrases: &["websocket", "websockets", "real-time", "realtime", "streaming"],
        tools: &["websocket-client", "load-tester"],
    },
    CapabilityRule {
        capability: "database",
        phrases: &["database", "sql", "postgres", "postgresql", "mysql", "schema", "migration"],
        tools: &["db-migrator", "sql-client"],
    },
    CapabilityRule {
        capability: "api",
        phrases: &["api", "endpoint", "rest", "graphql", "http"],
        tools: &["http-client", "openapi-validator"],
    },
    CapabilityRule {
        capability: "security",
        phrases: &["security", "auth", "authentication", "encryption", "vulnerability", "oauth"],
        tools: &["security-scanner", "secret-detector"],
    },
    CapabilityRule {
        capability: "deployment",
        phrases: &["deploy", "deployment", "docker", "kubernetes", "helm", "ci"],
        tools: &["container-builder", "deploy-cli"],
    },
    CapabilityRule {
        capability: "git",
        phrases: &["git", "branch", "pull request", "merge", "rebase"],
        tools: &["git"],
    },
];

const RISK_RULES: &[LabelRule] = &[
    LabelRule {
        label: "breaking-change",
        phrases: &["breaking change", "breaking changes", "backwards incompatible", "backward compatibility"],
    },
    LabelRule {
        label: "production-impact",
        phrases: &["production", "prod", "live traffic", "hotfix"],
    },
    LabelRule {
        label: "data-loss",
        phrases: &["data loss", "delete data", "drop table", "irreversible"],
    },
    LabelRule {
        label: "legacy-code",
        phrases: &["legacy"],
    },
    LabelRule {
        label: "security-sensitive",
        phrases: &["security", "credentials", "secrets", "permissions", "encryption"],
    },
    LabelRule {
        label: "concurrency",
        phrases: &["race condition", "deadlock", "concurrency", "concurrent"],
    },
    LabelRule {
        label: "performance",
        phrases: &["performance", "latency", "bottleneck"],
    },
];

const DEPENDENCY_RULES: &[LabelRule] = &[
    LabelRule {
        label: "database",
        phrases: &["database", "postgres", "postgresql", "mysql", "sqlite", "mongodb", "sql"],
    },
    LabelRule {
        label: "cache",
        phrases: &["redis", "memcached", "cache layer"],
    },
    LabelRule {
        label: "message-queue",
        phrases: &["kafka", "rabbitmq", "queue", "pubsub"],
    },
    LabelRule {
        label: "websocket-server",
        phrases: &["websocket", "websockets", "socket.io"],
    },
    LabelRule {
        label: "external-api",
        phrases: &["third-party", "external api", "webhook", "stripe", "github api"],
    },
    LabelRule {
        label: "auth-provider",
        phrases: &["oauth", "sso", "ldap", "identity provider"],
    },
    LabelRule {
        label: "container-runtime",
        phrases: &["docker", "kubernetes", "container"],
    },
];

const DOUBLING_PHRASES: &[&str] = &["large", "complex"];
const HALVING_PHRASES: &[&str] = &["quick", "simple"];

fn command_params(program: &str, args: &[&str]) -> serde_json::Value {
    serde_json::json!({ "program": program, "args": args })
}

const TOOL_CATALOG: &[ToolSpec] = &[
    ToolSpec {
        name: "tsc",
        kind: "command",
        description: "TypeScript compiler type check",
        priority: 60,
        critical: false,
        parameters: || command_params("tsc", &["--noEmit"]),
    },
    ToolSpec {
        name: "eslint",
        kind: "command",
        description: "JavaScript/TypeScript linter",
        priority: 40,
        critical: false,
        parameters: || command_params("eslint", &["."]),
    },
    ToolSpec {
        name: "cargo-check",
        kind: "command",
        description: "Rust type check",
        priority: 60,
        critical: false,
        parameters: || command_params("cargo", &["check"]),
    },
    ToolSpec {
        name: "clippy",
        kind: "command",
        description: "Rust linter",
        priority: 40,
        critical: false,
        parameters: || command_params("cargo", &["clippy"]),
    },
    ToolSpec {
        name: "pytest",
        kind: "command",
        description: "Python test runner",
        priority: 60,
        critical: false,
        parameters: || command_params("pytest", &[]),
    },
    ToolSpec {
        name: "ruff",
        kind: "command",
        description: "Python linter",
        priority: 40,
        critical: false,
        parameters: || command_params("ruff", &["check"]),
    },
    ToolSpec {
        name: "test-runner",
        kind: "command",
        description: "Project test suite runner",
        priority: 75,
        critical: true,
        parameters: || command_params("make", &["test"]),
    },
    ToolSpec {
        name: "coverage-reporter",
        kind: "library",
        description: "Collects and summarizes coverage data",
        priority: 45,
        critical: false,
        parameters: || serde_json::json!({ "handler": "passthrough" }),
    },
    ToolSpec {
        name: "websocket-client",
        kind: "library",
        description: "WebSocket client used to exercise live endpoints",
        priority: 65,
        critical: false,
        parameters: || serde_json::json!({ "handler": "passthrough" }),
    },
    ToolSpec {
        name: "load-tester",
        kind: "service",
        description: "Managed load generation service",
        priority: 55,
        critical: false,
        parameters: || serde_json::json!({ "handler": "passthrough", "endpoint": "local" }),
    },
    ToolSpec {
        name: "db-migrator",
        kind: "command",
        description: "Applies schema migrations",
        priority: 70,
        critical: true,
        parameters: || command_params("migrate", &["up"]),
    },
    ToolSpec {
        name: "sql-client",
        kind: "library",
        description: "SQL query helper",
        priority: 50,
        critical: false,
        parameters: || serde_json::json!({ "handler": "passthrough" }),
    },
    ToolSpec {
        name: "http-client",
        kind: "api",
        description: "Generic HTTP client for service calls",
        priority: 60,
        critical: false,
        parameters: || serde_json::json!({ "url": "http://127.0.0.1/", "method": "GET" }),
    },
    ToolSpec {
        name: "openapi-validator",
        kind: "library",
        description: "Validates requests against an OpenAPI document",
        priority: 45,
        critical: false,
        parameters: || serde_json::json!({ "handler": "require-params", "required": ["spec"] }),
    },
    ToolSpec {
        name: "security-scanner",
        kind: "service",
        description: "Static security analysis service",
        priority: 80,
        critical: true,
        parameters: || serde_json::json!({ "handler": "passthrough" }),
    },
    ToolSpec {
        name: "secret-detector",
        kind: "command",
        description: "Scans the tree for committed secrets",
        priority: 70,
        critical: false,
        parameters: || command_params("gitleaks", &["detect"]),
    },
    ToolSpec {
        name: "container-builder",
        kind: "command",
        description: "Builds deployment images",
        priority: 65,
        critical: false,
        parameters: || command_params("docker", &["build", "."]),
    },
    ToolSpec {
        name: "deploy-cli",
        kind: "command",
        description: "Rolls out deployments",
        priority: 60,
        critical: false,
        parameters: || command_params("kubectl", &["apply"]),
    },
    ToolSpec {
        name: "git",
        kind: "command",
        description: "Version control operations",
        priority: 55,
        critical: false,
        parameters: || command_params("git", &[]),
    },
];

/// Case-insensitive, word-bounded matcher for a phrase list
#[derive(Debug, Clone)]
struct PhraseMatcher {
    label: &'static str,
    pattern: Option<Regex>,
}

impl PhraseMatcher {
    fn new(label: &'static str, phrases: &[&str]) -> Self {
        let alternation = phrases
            .iter()
            .map(|phrase| regex::escape(phrase))
            .collect::<Vec<_>>()
            .join("|");
        let source = format!(r"(?i)(?:^|[^\w-])(?:{})(?:$|[^\w-])", alternation);
        let pattern = match Regex::new(&source) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                error!("Phrase list '{}' failed to compile, disabling it: {}", label, e);
                None
            }
        };
        Self { label, pattern }
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|pattern| pattern.is_match(text))
    }
}

/// Scores tasks and derives the resources they need
#[derive(Debug, Clone)]
pub struct TaskAnalyzer {
    categories: Vec<(ComplexityCategory, PhraseMatcher)>,
    capabilities: Vec<(PhraseMatcher, &'static [&'static str])>,
    risks: Vec<PhraseMatcher>,
    dependencies: Vec<PhraseMatcher>,
    doubling: PhraseMatcher,
    halving: PhraseMatcher,
}

impl Default for TaskAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskAnalyzer {
    pub fn new() -> Self {
        Self {
            categories: CATEGORY_RULES
                .iter()
                .map(|rule| (rule.category, PhraseMatcher::new("category", rule.phrases)))
                .collect(),
            capabilities: CAPABILITY_RULES
                .iter()
                .map(|rule| (PhraseMatcher::new(rule.capability, rule.phrases), rule.tools))
                .collect(),
            risks: RISK_RULES
                .iter()
                .map(|rule| PhraseMatcher::new(rule.label, rule.phrases))
                .collect(),
            dependencies: DEPENDENCY_RULES
                .iter()
                .map(|rule| PhraseMatcher::new(rule.label, rule.phrases))
                .collect(),
            doubling: PhraseMatcher::new("effort-doubling", DOUBLING_PHRASES),
            halving: PhraseMatcher::new("effort-halving", HALVING_PHRASES),
        }
    }

    /// Analyze a task's title and description
    pub fn analyze(&self, task: &Task) -> ForgeResult<ComplexityAnalysis> {
        let text = task.searchable_text();

        if text.trim().is_empty() {
            return Err(ForgeError::analysis(
                ErrorKind::ComplexityCalculation,
                &task.id,
                "task has neither title nor description to analyze",
            ));
        }
        if text.len() > MAX_ANALYZED_BYTES {
            return Err(ForgeError::analysis(
                ErrorKind::CapabilityDetection,
                &task.id,
                format!(
                    "task text is {} bytes, above the {} byte analysis limit",
                    text.len(),
                    MAX_ANALYZED_BYTES
                ),
            ));
        }

        let (capabilities, recommended_tools) = self.detect_capabilities(&text);
        let risk_factors = Self::labels_matching(&self.risks, &text);
        let system_dependencies = Self::labels_matching(&self.dependencies, &text);

        let base = self.base_score(&text);
        let adjustment = (system_dependencies.len() as u32 * DEPENDENCY_WEIGHT).min(DEPENDENCY_CAP)
            + (risk_factors.len() as u32 * RISK_WEIGHT).min(RISK_CAP)
            + (capabilities.len() as u32 * CAPABILITY_WEIGHT).min(CAPABILITY_CAP);
        let score = (base + adjustment).min(100) as u8;
        let category = ComplexityCategory::from_score(score);
        let estimated_effort_hours = self.estimate_effort(task, &text, score);

        debug!(
            "Analyzed task {}: score {} ({}), {} capabilities, {} risks, {} dependencies",
            task.id,
            score,
            category,
            capabilities.len(),
            risk_factors.len(),
            system_dependencies.len()
        );

        Ok(ComplexityAnalysis {
            task_id: task.id.clone(),
            score,
            category,
            capabilities,
            recommended_tools,
            estimated_effort_hours,
            risk_factors,
            system_dependencies,
            analyzed_at: Utc::now(),
        })
    }

    /// Base of the highest category with any phrase match
    fn base_score(&self, text: &str) -> u32 {
        self.categories
            .iter()
            .filter(|(_, matcher)| matcher.matches(text))
            .map(|(category, _)| category.base_score())
            .max()
            .unwrap_or(UNMATCHED_BASE_SCORE)
    }

    fn detect_capabilities(&self, text: &str) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut capabilities = BTreeSet::new();
        let mut tools = BTreeSet::new();
        for (matcher, rule_tools) in &self.capabilities {
            if matcher.matches(text) {
                capabilities.insert(matcher.label.to_string());
                tools.extend(rule_tools.iter().map(|tool| tool.to_string()));
            }
        }
        (capabilities, tools)
    }

    fn labels_matching(matchers: &[PhraseMatcher], text: &str) -> Vec<String> {
        matchers
            .iter()
            .filter(|matcher| matcher.matches(text))
            .map(|matcher| matcher.label.to_string())
            .collect()
    }

    fn estimate_effort(&self, task: &Task, text: &str, score: u8) -> f64 {
        let mut hours = task.kind.base_effort_hours();
        if self.doubling.matches(text) {
            hours *= 2.0;
        }
        if self.halving.matches(text) {
            hours *= 0.5;
        }
        hours *= 1.0 + f64::from(score) / 100.0;
        (hours * 10.0).round() / 10.0
    }

    /// Catalog entry for a recommended tool name
    pub fn tool_spec(name: &str) -> Option<&'static ToolSpec> {
        TOOL_CATALOG.iter().find(|spec| spec.name == name)
    }

    /// Tools and hooks the analysis calls for, most important first
    pub fn required_resources(&self, analysis: &ComplexityAnalysis) -> Vec<ResourceRequirement> {
        let mut requirements: Vec<ResourceRequirement> = analysis
            .recommended_tools
            .iter()
            .filter_map(|name| Self::tool_spec(name))
            .map(|spec| {
                ResourceRequirement::new(spec.name, ResourceCategory::Tool, spec.kind)
                    .with_description(spec.description)
                    .with_priority(spec.priority)
                    .with_critical(spec.critical)
                    .with_parameters((spec.parameters)())
            })
            .collect();

        if !analysis.risk_factors.is_empty() {
            requirements.push(
                ResourceRequirement::new("risk-gate", ResourceCategory::Hook, "pre")
                    .with_description("Validates task inputs before risky work starts")
                    .with_priority(60)
                    .with_critical(true)
                    .with_parameters(serde_json::json!({
                        "required_metadata": [],
                        "risk_factors": analysis.risk_factors,
                    })),
            );
            requirements.push(
                ResourceRequirement::new("rollback-on-failure", ResourceCategory::Hook, "error")
                    .with_description("Escalates failures and records a rollback marker")
                    .with_priority(65)
                    .with_parameters(serde_json::json!({ "action": "rollback" })),
            );
        }

        if analysis.score >= 60 {
            requirements.push(
                ResourceRequirement::new("completion-notice", ResourceCategory::Hook, "post")
                    .with_description("Announces completion of complex work")
                    .with_priority(55)
                    .with_parameters(serde_json::json!({ "channel": "log" })),
            );
        }

        requirements.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::TaskKind;

    fn analyze(title: &str, description: &str) -> ComplexityAnalysis {
        TaskAnalyzer::new()
            .analyze(&Task::new(title, description, TaskKind::Feature))
            .unwrap()
    }

    #[test]
    fn test_category_bands() {
        assert_eq!(ComplexityCategory::from_score(0), ComplexityCategory::Simple);
        assert_eq!(ComplexityCategory::from_score(29), ComplexityCategory::Simple);
        assert_eq!(ComplexityCategory::from_score(30), ComplexityCategory::Moderate);
        assert_eq!(ComplexityCategory::from_score(59), ComplexityCategory::Moderate);
        assert_eq!(ComplexityCategory::from_score(60), ComplexityCategory::Complex);
        assert_eq!(ComplexityCategory::from_score(79), ComplexityCategory::Complex);
        assert_eq!(ComplexityCategory::from_score(80), ComplexityCategory::Expert);
        assert_eq!(ComplexityCategory::from_score(100), ComplexityCategory::Expert);
    }

    #[test]
    fn test_typo_fix_is_simple() {
        let analysis = analyze("Fix typo in documentation", "");
        assert_eq!(analysis.score, 20);
        assert_eq!(analysis.category, ComplexityCategory::Simple);
        assert!(analysis.recommended_tools.is_empty());
        assert!(analysis.risk_factors.is_empty());
    }

    #[test]
    fn test_realtime_websocket_system_is_expert() {
        let analysis = analyze(
            "Implement real-time WebSocket system",
            "Build a TypeScript WebSocket server with reconnect handling and integration tests",
        );
        assert!(analysis.score >= 80, "score was {}", analysis.score);
        assert_eq!(analysis.category, ComplexityCategory::Expert);
        assert!(analysis.capabilities.contains("typescript"));
        assert!(analysis.capabilities.contains("testing"));
        assert!(analysis.system_dependencies.contains(&"websocket-server".to_string()));
        assert!(analysis.recommended_tools.contains("tsc"));
    }

    #[test]
    fn test_unmatched_text_gets_default_base() {
        let analysis = analyze("Look into it", "Something seems off");
        assert_eq!(analysis.score, UNMATCHED_BASE_SCORE as u8);
        assert_eq!(analysis.category, ComplexityCategory::Moderate);
    }

    #[test]
    fn test_phrases_respect_word_boundaries() {
        let analysis = analyze("Update the latest contest results", "");
        assert!(!analysis.capabilities.contains("testing"));
    }

    #[test]
    fn test_risk_factor_never_lowers_score() {
        let base = analyze("Add a settings form", "Simple validation for user input");
        let risky = analyze(
            "Add a settings form",
            "Simple validation for user input touching legacy production data",
        );
        assert!(risky.score >= base.score);
        assert!(risky.risk_factors.contains(&"legacy-code".to_string()));
        assert!(risky.risk_factors.contains(&"production-impact".to_string()));
    }

    #[test]
    fn test_dependency_never_lowers_score() {
        let base = analyze("Implement distributed consensus", "Leader election for the cluster");
        let with_dependency = analyze(
            "Implement distributed consensus",
            "Leader election for the cluster backed by postgres and kafka",
        );
        assert!(with_dependency.score >= base.score);
        assert_eq!(with_dependency.system_dependencies.len(), 2);
    }

    #[test]
    fn test_score_is_clamped() {
        let analysis = analyze(
            "Distributed real-time security migration",
            "Legacy production database with kafka, redis, oauth and docker; breaking change, \
             data loss risk, race condition, performance, typescript, python, rust, tests, api",
        );
        assert_eq!(analysis.score, 100);
        assert_eq!(analysis.category, ComplexityCategory::Expert);
    }

    #[test]
    fn test_effort_multipliers() {
        let analyzer = TaskAnalyzer::new();
        let quick = analyzer
            .analyze(&Task::new("Quick docs touch-up", "", TaskKind::Docs))
            .unwrap();
        let large = analyzer
            .analyze(&Task::new("Large docs overhaul", "", TaskKind::Docs))
            .unwrap();
        // docs base 1h, score 20 => x1.2
        assert!((quick.estimated_effort_hours - 0.6).abs() < 1e-9);
        assert!((large.estimated_effort_hours - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_empty_task_is_rejected() {
        let result = TaskAnalyzer::new().analyze(&Task::new("", "  ", TaskKind::Bugfix));
        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::ComplexityCalculation);
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_required_resources_follow_analysis() {
        let analyzer = TaskAnalyzer::new();
        let analysis = analyze(
            "Migrate legacy database schema",
            "Write migration and tests for the production postgres cluster",
        );
        let requirements = analyzer.required_resources(&analysis);

        assert!(requirements.iter().any(|r| r.name == "db-migrator" && r.critical));
        assert!(requirements.iter().any(|r| r.name == "risk-gate" && r.kind == "pre"));
        assert!(requirements.iter().any(|r| r.name == "rollback-on-failure" && r.kind == "error"));
        assert!(requirements.iter().any(|r| r.name == "completion-notice"));
        assert!(requirements.windows(2).all(|pair| pair[0].priority >= pair[1].priority));
    }

    #[test]
    fn test_simple_task_needs_no_resources() {
        let analyzer = TaskAnalyzer::new();
        let analysis = analyze("Fix typo in documentation", "");
        assert!(analyzer.required_resources(&analysis).is_empty());
    }
}
