//! Declarative content rules and user-agent signatures.
//!
//! Rules are an ordered list of `{kind, pattern, severity}`. The first match
//! becomes the rejection reason; every match is kept for analytics.

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    SqlInjection,
    NoSqlInjection,
    Script,
    PathTraversal,
    CodeExecution,
    ShellInvocation,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::SqlInjection => "sql_injection",
            RuleKind::NoSqlInjection => "nosql_injection",
            RuleKind::Script => "script",
            RuleKind::PathTraversal => "path_traversal",
            RuleKind::CodeExecution => "code_execution",
            RuleKind::ShellInvocation => "shell_invocation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentRule {
    pub kind: RuleKind,
    pub pattern: Regex,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    pub kind: RuleKind,
    pub severity: Severity,
    pub pattern: String,
}

impl From<&ContentRule> for RuleMatch {
    fn from(rule: &ContentRule) -> Self {
        Self {
            kind: rule.kind,
            severity: rule.severity,
            pattern: rule.pattern.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ContentRule>,
}

impl RuleSet {
    fn new(rules: Vec<ContentRule>) -> Self {
        Self { rules }
    }

    /// Built-in injection, script, traversal and execution signatures.
    pub fn builtin() -> Result<Self, regex::Error> {
        let rule = |kind, pattern: &str, severity| -> Result<ContentRule, regex::Error> {
            Ok(ContentRule {
                kind,
                pattern: Regex::new(pattern)?,
                severity,
            })
        };

        Ok(Self::new(vec![
            rule(
                RuleKind::SqlInjection,
                r"(?i)\b(SELECT.*FROM|INSERT.*INTO|DELETE.*FROM|DROP.*TABLE|UNION.*SELECT)\b",
                Severity::High,
            )?,
            rule(
                RuleKind::NoSqlInjection,
                r#"(?i)("|\[)\$(where|ne|gt|gte|lt|lte|in|nin|regex|expr)("|\])"#,
                Severity::High,
            )?,
            rule(
                RuleKind::Script,
                r"(?i)<script|javascript:|onload=|onerror=",
                Severity::High,
            )?,
            rule(RuleKind::PathTraversal, r"\.\./|\.\.\\", Severity::High)?,
            rule(
                RuleKind::CodeExecution,
                r"(?i)\b(eval|setTimeout|setInterval)\s*\(",
                Severity::High,
            )?,
            rule(
                RuleKind::ShellInvocation,
                r"(?i)\b(cmd|exec|system|shell_exec)\b",
                Severity::Medium,
            )?,
        ]))
    }

    pub fn first_match(&self, content: &str) -> Option<&ContentRule> {
        self.rules.iter().find(|rule| rule.pattern.is_match(content))
    }

    pub fn matches(&self, content: &str) -> Vec<RuleMatch> {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(content))
            .map(RuleMatch::from)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Bot and automation signatures, with one trusted first-party override.
#[derive(Debug, Clone)]
pub struct UserAgentFilter {
    blocked: Vec<Regex>,
    trusted: Option<String>,
}

impl UserAgentFilter {
    pub fn builtin(trusted: Option<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            blocked: vec![
                Regex::new(r"(?i)bot|crawler|spider|scraper")?,
                Regex::new(r"(?i)python-requests|php|java")?,
            ],
            trusted,
        })
    }

    /// A missing user agent counts as automation.
    pub fn is_blocked(&self, user_agent: Option<&str>) -> bool {
        let Some(user_agent) = user_agent.filter(|ua| !ua.is_empty()) else {
            return true;
        };
        if self.trusted.as_deref() == Some(user_agent) {
            return false;
        }
        self.blocked.iter().any(|pattern| pattern.is_match(user_agent))
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}
