use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default wait budget. Navigation-heavy checks usually override upward.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Default poll interval for the wait engine.
pub const DEFAULT_POLL_MS: u64 = 100;

/// The predicate half of a [`Condition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Check {
    Visible { visible: Selector },
    Hidden { hidden: Selector },
    TextEquals { target: Selector, equals: String },
    UrlContains { url_contains: String },
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Visible { visible } => write!(f, "visible: {}", visible),
            Check::Hidden { hidden } => write!(f, "hidden: {}", hidden),
            Check::TextEquals { target, equals } => {
                write!(f, "text of {} equals \"{}\"", target, equals)
            }
            Check::UrlContains { url_contains } => {
                write!(f, "url contains \"{}\"", url_contains)
            }
        }
    }
}

/// A polled predicate with an explicit time budget.
///
/// This is the fundamental synchronization unit: anything that depends on an
/// asynchronous UI update (API round-trip, animation, client-side routing)
/// waits on one of these instead of sleeping for a fixed duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(flatten)]
    pub check: Check,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_poll_ms() -> u64 {
    DEFAULT_POLL_MS
}

impl Condition {
    pub fn new(check: Check) -> Self {
        Self {
            check,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_ms: DEFAULT_POLL_MS,
        }
    }

    pub fn visible(selector: Selector) -> Self {
        Self::new(Check::Visible { visible: selector })
    }

    pub fn hidden(selector: Selector) -> Self {
        Self::new(Check::Hidden { hidden: selector })
    }

    pub fn text_equals(selector: Selector, equals: impl Into<String>) -> Self {
        Self::new(Check::TextEquals {
            target: selector,
            equals: equals.into(),
        })
    }

    pub fn url_contains(fragment: impl Into<String>) -> Self {
        Self::new(Check::UrlContains {
            url_contains: fragment.into(),
        })
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.check.fmt(f)
    }
}
