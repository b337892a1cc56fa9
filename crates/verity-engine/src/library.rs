//! Reusable, parameterized sub-flows for the journeys every scenario
//! repeats. Authors compose these instead of copy-pasting login or menu
//! boilerplate into each scenario file.

use verity_common::condition::Condition;
use verity_common::flow::{
    ActStep, ActionDef, BranchDef, BranchStep, ClickAction, ExpectStep, FillAction, ScenarioStep,
};
use verity_common::selector::Selector;

/// Parameters for the username + PIN-pad login journey.
#[derive(Debug, Clone)]
pub struct LoginParams {
    pub username: String,
    /// Placeholder of the username input.
    pub username_placeholder: String,
    /// Accessible name of the submit control on the username screen.
    pub submit_label: String,
    /// Digits clicked one by one on the PIN pad.
    pub pin: String,
    /// Text that confirms the PIN screen is up before the pad is used,
    /// e.g. a greeting with the just-entered username.
    pub greeting: Option<String>,
}

impl Default for LoginParams {
    fn default() -> Self {
        Self {
            username: "TestUser".to_string(),
            username_placeholder: "Nombre de usuario".to_string(),
            submit_label: "Continuar".to_string(),
            pin: "1234".to_string(),
            greeting: None,
        }
    }
}

/// Steps that fill the username screen and walk the PIN pad.
pub fn login_steps(params: &LoginParams) -> Vec<ScenarioStep> {
    let mut steps = vec![
        act(ActionDef::Fill(FillAction {
            fill: Selector::placeholder(params.username_placeholder.clone()),
            text: params.username.clone(),
        })),
        act(ActionDef::Click(ClickAction {
            click: Selector::role("button", params.submit_label.clone()),
            force: false,
        })),
    ];

    if let Some(greeting) = &params.greeting {
        steps.push(expect(Condition::visible(Selector::text(greeting.clone()))));
    }

    // PIN digits need exact matching so "1" does not resolve to "10".
    for digit in params.pin.chars() {
        steps.push(act(ActionDef::Click(ClickAction {
            click: Selector::role_exact("button", digit.to_string()),
            force: false,
        })));
    }
    steps
}

/// Log in only when `authenticated` does not already hold; both arms
/// converge on whatever post-condition follows this step.
pub fn ensure_logged_in(params: &LoginParams, authenticated: Condition) -> ScenarioStep {
    ScenarioStep::Branch(BranchStep {
        branch: BranchDef {
            condition: authenticated,
            then_steps: Vec::new(),
            else_steps: login_steps(params),
        },
    })
}

/// Open a menu/drawer via its trigger and wait for a marker element to
/// confirm it is showing.
pub fn open_menu_steps(trigger: Selector, revealed: Selector) -> Vec<ScenarioStep> {
    vec![
        act(ActionDef::Click(ClickAction {
            click: trigger,
            force: false,
        })),
        expect(Condition::visible(revealed)),
    ]
}

fn act(action: ActionDef) -> ScenarioStep {
    ScenarioStep::Act(ActStep {
        act: action,
        best_effort: false,
    })
}

fn expect(condition: Condition) -> ScenarioStep {
    ScenarioStep::Expect(ExpectStep {
        expect: condition,
        best_effort: false,
    })
}
