use crate::error::{ErrorKind, ForgeError, ForgeResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Matches at or above this severity refuse execution unless configured otherwise
pub const DEFAULT_BLOCK_SEVERITY: u8 = 90;

struct Rule {
    name: &'static str,
    pattern: &'static str,
    severity: u8,
}

const RULES: &[Rule] = &[
    Rule {
        name: "dynamic-eval",
        pattern: r"\beval\s*\(",
        severity: 95,
    },
    Rule {
        name: "function-constructor",
        pattern: r"\bnew\s+Function\s*\(",
        severity: 95,
    },
    Rule {
        name: "process-spawn",
        pattern: r"\b(?:child_process|Command::new|subprocess\.|os\.system|execSync|spawnSync|exec\s*\(|spawn\s*\()",
        severity: 90,
    },
    Rule {
        name: "recursive-delete",
        pattern: r"\brm\s+-(?:[a-zA-Z]*r[a-zA-Z]*f|[a-zA-Z]*f[a-zA-Z]*r)",
        severity: 100,
    },
    Rule {
        name: "sensitive-file",
        pattern: r"/etc/(?:passwd|shadow|sudoers)|\.ssh/",
        severity: 90,
    },
    Rule {
        name: "path-traversal",
        pattern: r"\.\./",
        severity: 70,
    },
    Rule {
        name: "filesystem-delete",
        pattern: r"\b(?:remove_dir_all|remove_file|unlinkSync|unlink|rmdir|rmSync)\b",
        severity: 80,
    },
    Rule {
        name: "unsafe-block",
        pattern: r"\bunsafe\s*\{",
        severity: 60,
    },
    Rule {
        name: "environment-read",
        pattern: r"\b(?:process\.env|env::var|os\.environ|getenv)\b",
        severity: 40,
    },
    Rule {
        name: "network-access",
        pattern: r"\b(?:fetch\s*\(|XMLHttpRequest|reqwest::|TcpStream|urllib|http\.request)",
        severity: 30,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyMatch {
    pub rule: String,
    pub severity: u8,
    /// 1-based
    pub line: usize,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    pub matches: Vec<SafetyMatch>,
    /// 100 minus half of each match's severity, floored at 0
    pub score: u8,
    pub blocked: bool,
}

impl SafetyReport {
    pub fn is_clean(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Static pattern scan over text payloads. Not a sandbox.
#[derive(Debug, Clone)]
pub struct SafetyScanner {
    rules: Vec<(&'static str, u8, Option<Regex>)>,
    block_severity: u8,
}

impl Default for SafetyScanner {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SEVERITY)
    }
}

impl SafetyScanner {
    pub fn new(block_severity: u8) -> Self {
        let rules = RULES
            .iter()
            .map(|rule| {
                let compiled = match Regex::new(rule.pattern) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        error!("Safety rule {} failed to compile: {}", rule.name, e);
                        None
                    }
                };
                (rule.name, rule.severity, compiled)
            })
            .collect();
        Self { rules, block_severity }
    }

    pub fn block_severity(&self) -> u8 {
        self.block_severity
    }

    /// Patterns run over the whole payload, so a construct split across lines still matches
    pub fn scan(&self, code: &str) -> SafetyReport {
        let mut found = Vec::new();
        for (name, severity, regex) in &self.rules {
            let Some(regex) = regex else {
                continue;
            };
            for m in regex.find_iter(code) {
                found.push((m.start(), SafetyMatch {
                    rule: name.to_string(),
                    severity: *severity,
                    line: code[..m.start()].matches('\n').count() + 1,
                    snippet: m.as_str().split_whitespace().collect::<Vec<_>>().join(" "),
                }));
            }
        }
        found.sort_by_key(|(start, _)| *start);
        let matches: Vec<SafetyMatch> = found.into_iter().map(|(_, m)| m).collect();

        let penalty: u32 = matches.iter().map(|m| u32::from(m.severity) / 2).sum();
        let score = 100u32.saturating_sub(penalty) as u8;
        let blocked = matches.iter().any(|m| m.severity >= self.block_severity);

        SafetyReport { matches, score, blocked }
    }

    /// Scan and refuse blocked payloads with a non-recoverable error
    pub fn check(&self, resource_id: &str, code: &str) -> ForgeResult<SafetyReport> {
        let report = self.scan(code);
        if !report.blocked {
            if !report.is_clean() {
                warn!(
                    "Resource {} passed safety scan with {} finding(s), score {}",
                    resource_id,
                    report.matches.len(),
                    report.score
                );
            }
            return Ok(report);
        }

        let findings = report
            .matches
            .iter()
            .map(|m| format!("{}({}) at line {}", m.rule, m.severity, m.line))
            .collect::<Vec<_>>()
            .join(", ");
        warn!("Refusing to execute resource {}: {}", resource_id, findings);

        Err(ForgeError::new(
            ErrorKind::UnsafeResource,
            format!("resource {} contains blocked constructs: {}", resource_id, findings),
        )
        .with_context("stage", "safety_scan")
        .with_context("resource_id", resource_id)
        .with_context("matches", findings)
        .with_context("security_score", report.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_rules_compile() {
        let scanner = SafetyScanner::default();
        assert!(scanner.rules.iter().all(|(_, _, regex)| regex.is_some()));
        assert_eq!(scanner.rules.len(), RULES.len());
    }

    #[test]
    fn test_clean_code_scores_full() {
        let report = SafetyScanner::default().scan("pub fn add(a: i32, b: i32) -> i32 { a + b }");
        assert!(report.is_clean());
        assert_eq!(report.score, 100);
        assert!(!report.blocked);
    }

    #[test]
    fn test_eval_is_blocked() {
        let scanner = SafetyScanner::default();
        let error = scanner
            .check("tool-1", "function run(input) {\n  return eval(input);\n}")
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::UnsafeResource);
        assert!(!error.is_recoverable());
        assert!(error.context_value("matches").unwrap().contains("dynamic-eval(95) at line 2"));
    }

    #[test]
    fn test_low_severity_matches_reduce_score() {
        let scanner = SafetyScanner::default();
        let report = scanner
            .check("tool-2", "let home = std::env::var(\"HOME\");\nlet parent = \"../up\";")
            .unwrap();

        assert_eq!(report.matches.len(), 2);
        // 100 - 40/2 - 70/2
        assert_eq!(report.score, 45);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let scanner = SafetyScanner::new(101);
        let code = "rm -rf /\nrm -rf /\nrm -rf /";
        let report = scanner.scan(code);
        assert_eq!(report.score, 0);
        assert!(!report.blocked);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let strict = SafetyScanner::new(50);
        assert!(strict.scan("unsafe { ptr.read() }").blocked);
        assert!(!SafetyScanner::default().scan("unsafe { ptr.read() }").blocked);
    }

    #[test]
    fn test_constructs_split_across_lines_are_blocked() {
        let scanner = SafetyScanner::default();

        let report = scanner.scan("const run = (input) => eval\n  (input);");
        assert!(report.blocked);
        assert_eq!(report.matches[0].rule, "dynamic-eval");
        assert_eq!(report.matches[0].line, 1);
        assert_eq!(report.matches[0].snippet, "eval (");

        let report = scanner.scan("// builder\nconst f = new\nFunction(\"return 1\");");
        assert!(report.blocked);
        assert_eq!(report.matches[0].rule, "function-constructor");
        assert_eq!(report.matches[0].line, 2);
    }

    #[test]
    fn test_word_boundaries() {
        let report = SafetyScanner::default().scan("let medieval = retrieval(x);");
        assert!(report.is_clean());
    }
}
