//! Rule-based evaluator for YAML and JSON documents.
//!
//! Each rule selects nodes with a JSON pointer (`*` matches any key or
//! index) and denies scalar values matching a regular expression.

use crate::config::{PolicyConfig, RuleConfig};
use crate::policy::Evaluate;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;

/// Verdict for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub query: String,
    pub allow: bool,
    pub violations: Vec<Violation>,
}

/// A denied value and where it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: String,
    pub path: String,
}

#[derive(Debug, Clone)]
struct Rule {
    name: String,
    segments: Vec<String>,
    deny: Regex,
}

impl Rule {
    fn compile(config: &RuleConfig) -> Result<Self> {
        let segments = parse_pointer(&config.pointer)
            .with_context(|| format!("invalid pointer in rule '{}'", config.name))?;
        let deny = Regex::new(&config.deny)
            .with_context(|| format!("invalid deny pattern in rule '{}'", config.name))?;

        Ok(Self {
            name: config.name.clone(),
            segments,
            deny,
        })
    }
}

/// Evaluator applying a fixed list of deny rules.
#[derive(Debug, Clone)]
pub struct RulePolicy {
    query: String,
    rules: Vec<Rule>,
}

impl RulePolicy {
    /// Compile the rules from configuration.
    pub fn new(config: &PolicyConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("compiled {} policy rules for query '{}'", rules.len(), config.query);

        Ok(Self {
            query: config.query.clone(),
            rules,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Apply every rule to an already parsed document.
    pub fn evaluate_value(&self, document: &Value) -> Verdict {
        let mut violations = Vec::new();

        for rule in &self.rules {
            let mut matches = Vec::new();
            collect_matches(document, &rule.segments, String::new(), &mut matches);

            for (path, node) in matches {
                if let Some(text) = scalar_text(node) {
                    if rule.deny.is_match(&text) {
                        violations.push(Violation {
                            rule: rule.name.clone(),
                            path,
                        });
                    }
                }
            }
        }

        Verdict {
            query: self.query.clone(),
            allow: violations.is_empty(),
            violations,
        }
    }
}

#[async_trait]
impl Evaluate for RulePolicy {
    async fn evaluate(&self, content: &[u8]) -> Result<Bytes> {
        let document = parse_input(content)?;
        let verdict = self.evaluate_value(&document);
        Ok(Bytes::from(serde_json::to_vec(&verdict)?))
    }
}

/// Parse YAML (or JSON) content, rejecting empty documents.
fn parse_input(content: &[u8]) -> Result<Value> {
    if content.iter().all(u8::is_ascii_whitespace) {
        anyhow::bail!("failed to parse input");
    }

    let document: Value = serde_yaml::from_slice(content)?;
    if document.is_null() {
        anyhow::bail!("failed to parse input");
    }

    Ok(document)
}

/// Split a JSON pointer into unescaped segments.
fn parse_pointer(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }

    let rest = pointer
        .strip_prefix('/')
        .with_context(|| format!("pointer '{}' must start with '/'", pointer))?;

    Ok(rest
        .split('/')
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Look through YAML tags such as `!Ref`.
fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match untag(value) {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn collect_matches<'a>(
    value: &'a Value,
    segments: &[String],
    path: String,
    out: &mut Vec<(String, &'a Value)>,
) {
    let value = untag(value);
    let Some((head, rest)) = segments.split_first() else {
        out.push((path, value));
        return;
    };

    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = scalar_text(key) else { continue };
                if head == "*" || *head == key {
                    let child_path = format!("{}/{}", path, escape_segment(&key));
                    collect_matches(child, rest, child_path, out);
                }
            }
        }
        Value::Sequence(items) => {
            for (idx, child) in items.iter().enumerate() {
                let idx = idx.to_string();
                if head == "*" || *head == idx {
                    collect_matches(child, rest, format!("{}/{}", path, idx), out);
                }
            }
        }
        _ => {}
    }
}
