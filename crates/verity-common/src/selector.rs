use serde::{Deserialize, Serialize};
use std::fmt;

/// A declarative locator resolved against the live DOM at query time.
///
/// Selectors are plain data. They are re-resolved on every query and never
/// hold a DOM handle across awaits, so a re-render between two operations
/// cannot leave a stale reference behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    /// ARIA role plus accessible name, e.g. role `button`, name `Continuar`.
    Role {
        role: String,
        name: String,
        #[serde(default)]
        exact: bool,
    },
    /// Form control matched by its placeholder text.
    Placeholder { placeholder: String },
    /// Element matched by its rendered text content.
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },
    /// Structural CSS path, the escape hatch when semantics are missing.
    Css { css: String },
}

impl Selector {
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Selector::Role {
            role: role.into(),
            name: name.into(),
            exact: false,
        }
    }

    /// Role + name with exact accessible-name matching. Needed for targets
    /// like PIN pad digits where "1" must not match "10".
    pub fn role_exact(role: impl Into<String>, name: impl Into<String>) -> Self {
        Selector::Role {
            role: role.into(),
            name: name.into(),
            exact: true,
        }
    }

    pub fn placeholder(placeholder: impl Into<String>) -> Self {
        Selector::Placeholder {
            placeholder: placeholder.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Selector::Text {
            text: text.into(),
            exact: false,
        }
    }

    pub fn css(css: impl Into<String>) -> Self {
        Selector::Css { css: css.into() }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Role { role, name, exact } => {
                if *exact {
                    write!(f, "role={} name=\"{}\" (exact)", role, name)
                } else {
                    write!(f, "role={} name=\"{}\"", role, name)
                }
            }
            Selector::Placeholder { placeholder } => {
                write!(f, "placeholder=\"{}\"", placeholder)
            }
            Selector::Text { text, exact } => {
                if *exact {
                    write!(f, "text=\"{}\" (exact)", text)
                } else {
                    write!(f, "text=\"{}\"", text)
                }
            }
            Selector::Css { css } => write!(f, "css={}", css),
        }
    }
}
