use crate::condition::Condition;
use crate::mock::MockRuleDef;
use crate::selector::Selector;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one flow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

/// A scripted scenario: an ordered sequence of steps with explicit branch
/// points, executed against exactly one session.
///
/// Flows are data, not code. Scenario authors describe steps with typed
/// parameters and compose shared sub-sequences from the library instead of
/// copy-pasting journeys between files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    #[serde(default)]
    pub session: SessionConfig,
    /// Interception rules armed before the flow's first navigation.
    #[serde(default)]
    pub mocks: Vec<MockRuleDef>,
    pub steps: Vec<ScenarioStep>,
}

/// One step of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioStep {
    Navigate(NavigateStep),
    Act(ActStep),
    Expect(ExpectStep),
    Branch(BranchStep),
    Capture(CaptureStep),
    Mock(MockStep),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateStep {
    /// Absolute URL, or a path joined against the harness base URL.
    pub navigate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActStep {
    pub act: ActionDef,
    /// A best-effort step logs its failure and continues; a required step
    /// (the default) aborts the flow.
    #[serde(default)]
    pub best_effort: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectStep {
    pub expect: Condition,
    #[serde(default)]
    pub best_effort: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchStep {
    pub branch: BranchDef,
}

/// Single-shot decision point: the condition is checked once, without
/// waiting, and exactly one arm runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDef {
    #[serde(rename = "if")]
    pub condition: Condition,
    #[serde(rename = "then")]
    pub then_steps: Vec<ScenarioStep>,
    #[serde(rename = "else", default)]
    pub else_steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureStep {
    /// Artifact name; the collector prefixes it with a sequence number.
    pub capture: String,
}

/// Replace (or, before the first navigation, register) an interception rule
/// mid-flow. This is how an empty-list mock becomes a populated one after a
/// simulated create action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockStep {
    pub mock: MockRuleDef,
}

/// One user-intent action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionDef {
    Fill(FillAction),
    Click(ClickAction),
    Press(PressAction),
    Scroll(ScrollAction),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillAction {
    pub fill: Selector,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickAction {
    pub click: Selector,
    /// Bypass the interactability wait and dispatch at the last observed
    /// position. The standard workaround when the visibility heuristic
    /// disagrees with actual clickability (e.g. mid-animation overlays).
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressAction {
    pub press: Selector,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollAction {
    pub scroll: Selector,
}

impl ActionDef {
    pub fn selector(&self) -> &Selector {
        match self {
            ActionDef::Fill(a) => &a.fill,
            ActionDef::Click(a) => &a.click,
            ActionDef::Press(a) => &a.press,
            ActionDef::Scroll(a) => &a.scroll,
        }
    }
}

impl fmt::Display for ActionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionDef::Fill(a) => write!(f, "fill {} with \"{}\"", a.fill, a.text),
            ActionDef::Click(a) => {
                if a.force {
                    write!(f, "click {} (forced)", a.click)
                } else {
                    write!(f, "click {}", a.click)
                }
            }
            ActionDef::Press(a) => write!(f, "press {:?} on {}", a.keys, a.press),
            ActionDef::Scroll(a) => write!(f, "scroll {} into view", a.scroll),
        }
    }
}

impl ScenarioStep {
    /// Human-readable description used in logs and failure reports.
    pub fn describe(&self) -> String {
        match self {
            ScenarioStep::Navigate(s) => format!("navigate to {}", s.navigate),
            ScenarioStep::Act(s) => s.act.to_string(),
            ScenarioStep::Expect(s) => format!("expect {}", s.expect),
            ScenarioStep::Branch(s) => format!("branch on {}", s.branch.condition),
            ScenarioStep::Capture(s) => format!("capture \"{}\"", s.capture),
            ScenarioStep::Mock(s) => match &s.mock.pattern {
                crate::mock::UrlPatternDef::Glob { pattern } => {
                    format!("replace mock for {}", pattern)
                }
                crate::mock::UrlPatternDef::Regex { regex } => {
                    format!("replace mock for /{}/", regex)
                }
            },
        }
    }
}
