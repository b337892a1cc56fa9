use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// What the interception layer does with requests that match no rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockPolicy {
    /// Forward unmatched requests to the real network.
    #[default]
    Passthrough,
    /// Block unmatched requests at the network layer and fail the flow that
    /// triggered them, keeping scenarios deterministic.
    Strict,
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid URL pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        source: regex::Error,
    },
}

/// URL matcher for intercepted requests.
///
/// Globs use routing syntax: `**` spans any characters including `/`, `*`
/// stops at `/`, `?` matches one character. Full regexes are the escape
/// hatch for anything the glob syntax cannot express.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn glob(pattern: &str) -> Result<Self, PatternError> {
        let compiled = glob_to_regex(pattern);
        let regex = Regex::new(&compiled).map_err(|source| PatternError::Invalid {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern).map_err(|source| PatternError::Invalid {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    /// The source text the pattern was built from. Rule replacement is keyed
    /// on this.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    out
}

/// The request as seen by a responder.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    pub body: Option<String>,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// Synthetic response substituted for an intercepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// JSON payload; serialized as the response body when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    /// Raw text payload, used when `json` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MockResponse {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: default_status(),
            content_type: default_content_type(),
            json: Some(value),
            text: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        if let Some(json) = &self.json {
            return serde_json::to_vec(json).unwrap_or_default();
        }
        self.text
            .as_ref()
            .map(|t| t.as_bytes().to_vec())
            .unwrap_or_default()
    }
}

/// Verdict a responder hands back for one matched request.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Fulfill(MockResponse),
    Passthrough,
    Block,
}

/// Produces the outcome for a matched request.
///
/// `ByMethod` covers the common case of one path serving a read to be faked
/// and a write to be passed through; `Dynamic` is the fully general form for
/// programmatic scenarios.
#[derive(Clone)]
pub enum MockResponder {
    Fulfill(MockResponse),
    Passthrough,
    ByMethod {
        arms: HashMap<String, MockOutcome>,
        default: Box<MockOutcome>,
    },
    Dynamic(Arc<dyn Fn(&InterceptedRequest) -> MockOutcome + Send + Sync>),
}

impl MockResponder {
    pub fn respond(&self, request: &InterceptedRequest) -> MockOutcome {
        match self {
            MockResponder::Fulfill(response) => MockOutcome::Fulfill(response.clone()),
            MockResponder::Passthrough => MockOutcome::Passthrough,
            MockResponder::ByMethod { arms, default } => arms
                .get(&request.method.to_ascii_uppercase())
                .cloned()
                .unwrap_or_else(|| (**default).clone()),
            MockResponder::Dynamic(f) => f(request),
        }
    }
}

impl fmt::Debug for MockResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockResponder::Fulfill(response) => f.debug_tuple("Fulfill").field(response).finish(),
            MockResponder::Passthrough => f.write_str("Passthrough"),
            MockResponder::ByMethod { arms, default } => f
                .debug_struct("ByMethod")
                .field("arms", &arms.keys().collect::<Vec<_>>())
                .field("default", default)
                .finish(),
            MockResponder::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// One interception rule: URL pattern plus responder.
///
/// Rules are kept in registration order per session; the first matching
/// pattern decides the response. Re-registering the same pattern overwrites
/// in place, which is how a mock's answer changes mid-flow.
#[derive(Debug, Clone)]
pub struct MockRule {
    pub pattern: UrlPattern,
    pub responder: MockResponder,
}

impl MockRule {
    pub fn new(pattern: UrlPattern, responder: MockResponder) -> Self {
        Self { pattern, responder }
    }
}

// =============================================================================
// Data form (scenario files)
// =============================================================================

/// Serializable rule definition as it appears in a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRuleDef {
    #[serde(flatten)]
    pub pattern: UrlPatternDef,
    #[serde(flatten)]
    pub responder: ResponderDef,
}

impl MockRuleDef {
    pub fn build(&self) -> Result<MockRule, PatternError> {
        let pattern = match &self.pattern {
            UrlPatternDef::Glob { pattern } => UrlPattern::glob(pattern)?,
            UrlPatternDef::Regex { regex } => UrlPattern::regex(regex)?,
        };
        Ok(MockRule::new(pattern, self.responder.build()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlPatternDef {
    Glob { pattern: String },
    Regex { regex: String },
}

/// Responder as scenario data. The per-method table keys are HTTP verbs plus
/// `default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponderDef {
    Fulfill { respond: MockResponse },
    ByMethod { by_method: HashMap<String, MethodArm> },
    Passthrough { passthrough: bool },
}

impl ResponderDef {
    pub fn build(&self) -> MockResponder {
        match self {
            ResponderDef::Fulfill { respond } => MockResponder::Fulfill(respond.clone()),
            ResponderDef::Passthrough { .. } => MockResponder::Passthrough,
            ResponderDef::ByMethod { by_method } => {
                let mut arms = HashMap::new();
                let mut default = MockOutcome::Passthrough;
                for (method, arm) in by_method {
                    let outcome = arm.outcome();
                    if method.eq_ignore_ascii_case("default") {
                        default = outcome;
                    } else {
                        arms.insert(method.to_ascii_uppercase(), outcome);
                    }
                }
                MockResponder::ByMethod {
                    arms,
                    default: Box::new(default),
                }
            }
        }
    }
}

/// One arm of a per-method table: either a response or a bare word.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodArm {
    Fulfill { respond: MockResponse },
    Word(ArmWord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmWord {
    Passthrough,
    Block,
}

impl MethodArm {
    fn outcome(&self) -> MockOutcome {
        match self {
            MethodArm::Fulfill { respond } => MockOutcome::Fulfill(respond.clone()),
            MethodArm::Word(ArmWord::Passthrough) => MockOutcome::Passthrough,
            MethodArm::Word(ArmWord::Block) => MockOutcome::Block,
        }
    }
}
