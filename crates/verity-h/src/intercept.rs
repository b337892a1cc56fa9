//! The Network Interception Layer over the CDP Fetch domain.
//!
//! Interception is armed at session creation, before any navigation, so the
//! first matching request of the first page load is already interceptable.
//! The event loop reads the rule list under a lock per paused request;
//! registration mutates it under the same lock, which is what makes a rule
//! update complete-before the navigation issued after it.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
    FulfillRequestParams, HeaderEntry, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use verity_engine::error::HarnessError;
use verity_engine::mock::{InterceptedRequest, MockOutcome, MockPolicy, MockResponse, MockRule};

/// Shared view of one session's interception rules and mismatch log.
#[derive(Clone)]
pub struct InterceptState {
    rules: Arc<Mutex<Vec<MockRule>>>,
    mismatches: Arc<Mutex<Vec<String>>>,
    policy: MockPolicy,
}

enum Decision {
    Fulfill(MockResponse),
    Continue,
    Block,
    Mismatch,
}

impl InterceptState {
    /// Append a rule, or replace the rule with the same pattern in place,
    /// preserving registration order for first-match-wins evaluation.
    pub fn upsert(&self, rule: MockRule) {
        let mut rules = self.rules.lock().unwrap();
        match rules
            .iter_mut()
            .find(|r| r.pattern.raw() == rule.pattern.raw())
        {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }

    pub fn has_pattern(&self, raw: &str) -> bool {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.pattern.raw() == raw)
    }

    pub fn take_mismatches(&self) -> Vec<String> {
        std::mem::take(&mut *self.mismatches.lock().unwrap())
    }

    fn record_mismatch(&self, url: String) {
        self.mismatches.lock().unwrap().push(url);
    }

    fn decide(&self, request: &InterceptedRequest) -> Decision {
        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if rule.pattern.matches(&request.url) {
                return match rule.responder.respond(request) {
                    MockOutcome::Fulfill(response) => Decision::Fulfill(response),
                    MockOutcome::Passthrough => Decision::Continue,
                    MockOutcome::Block => Decision::Block,
                };
            }
        }
        match self.policy {
            MockPolicy::Passthrough => Decision::Continue,
            MockPolicy::Strict => Decision::Mismatch,
        }
    }
}

/// Enable the Fetch domain on `page` and spawn the event loop that answers
/// paused requests. Must run before the session's first navigation.
pub async fn arm(page: &Page, policy: MockPolicy) -> Result<InterceptState, HarnessError> {
    let state = InterceptState {
        rules: Arc::new(Mutex::new(Vec::new())),
        mismatches: Arc::new(Mutex::new(Vec::new())),
        policy,
    };

    let pattern = RequestPattern::builder()
        .url_pattern("*")
        .request_stage(RequestStage::Request)
        .build();
    page.execute(EnableParams::builder().pattern(pattern).build())
        .await
        .map_err(|e| HarnessError::Protocol(format!("enable fetch interception: {}", e)))?;

    let mut events = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| HarnessError::Protocol(format!("subscribe to paused requests: {}", e)))?;

    let page_clone = page.clone();
    let loop_state = state.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Err(e) = handle_paused(&page_clone, &loop_state, &event).await {
                warn!("intercepted request handling failed: {}", e);
            }
        }
        debug!("interception event loop ended");
    });

    Ok(state)
}

async fn handle_paused(
    page: &Page,
    state: &InterceptState,
    event: &EventRequestPaused,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let request = InterceptedRequest {
        url: event.request.url.clone(),
        method: event.request.method.clone(),
        body: event.request.post_data.clone(),
    };

    match state.decide(&request) {
        Decision::Fulfill(response) => {
            debug!(
                url = %request.url,
                method = %request.method,
                status = response.status,
                "fulfilling intercepted request"
            );
            let params = FulfillRequestParams::builder()
                .request_id(event.request_id.clone())
                .response_code(i64::from(response.status))
                .response_headers(vec![HeaderEntry::new(
                    "Content-Type",
                    response.content_type.clone(),
                )])
                .body(BASE64.encode(response.body_bytes()))
                .build()
                .map_err(|e| format!("build fulfill params: {:?}", e))?;
            page.execute(params).await?;
        }
        Decision::Continue => {
            page.execute(ContinueRequestParams::new(event.request_id.clone()))
                .await?;
        }
        Decision::Block => {
            debug!(url = %request.url, "blocking intercepted request");
            page.execute(fail_params(event)?).await?;
        }
        Decision::Mismatch => {
            warn!(url = %request.url, "request matched no mock rule under strict policy, blocking");
            state.record_mismatch(request.url.clone());
            page.execute(fail_params(event)?).await?;
        }
    }
    Ok(())
}

fn fail_params(
    event: &EventRequestPaused,
) -> Result<FailRequestParams, Box<dyn std::error::Error + Send + Sync>> {
    FailRequestParams::builder()
        .request_id(event.request_id.clone())
        .error_reason(ErrorReason::BlockedByClient)
        .build()
        .map_err(|e| format!("build fail params: {:?}", e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verity_engine::mock::{MockResponder, UrlPattern};

    fn state(policy: MockPolicy) -> InterceptState {
        InterceptState {
            rules: Arc::new(Mutex::new(Vec::new())),
            mismatches: Arc::new(Mutex::new(Vec::new())),
            policy,
        }
    }

    fn get(url: &str) -> InterceptedRequest {
        InterceptedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            body: None,
        }
    }

    fn fulfill_rule(pattern: &str, payload: serde_json::Value) -> MockRule {
        MockRule::new(
            UrlPattern::glob(pattern).unwrap(),
            MockResponder::Fulfill(MockResponse::json(payload)),
        )
    }

    #[test]
    fn first_matching_rule_wins() {
        let state = state(MockPolicy::Passthrough);
        state.upsert(fulfill_rule("**/api/*", json!({"source": "broad"})));
        state.upsert(fulfill_rule("**/api/users", json!({"source": "narrow"})));

        match state.decide(&get("http://localhost:5173/api/users")) {
            Decision::Fulfill(response) => {
                assert_eq!(response.json.unwrap()["source"], "broad");
            }
            _ => panic!("expected fulfill"),
        }
    }

    #[test]
    fn reregistering_replaces_in_place() {
        let state = state(MockPolicy::Passthrough);
        state.upsert(fulfill_rule("**/api/goals", json!({"data": []})));
        state.upsert(fulfill_rule("**/api/goals", json!({"data": [{"id": 1}]})));

        assert_eq!(state.rules.lock().unwrap().len(), 1);
        match state.decide(&get("http://localhost:5173/api/goals")) {
            Decision::Fulfill(response) => {
                assert_eq!(response.json.unwrap()["data"].as_array().unwrap().len(), 1);
            }
            _ => panic!("expected fulfill"),
        }
    }

    #[test]
    fn strict_policy_flags_unmatched_requests() {
        let state = state(MockPolicy::Strict);
        state.upsert(fulfill_rule("**/api/users", json!({})));

        assert!(matches!(
            state.decide(&get("http://localhost:5173/api/other")),
            Decision::Mismatch
        ));
        // The loop records the mismatch when it blocks the request.
        state.record_mismatch("http://localhost:5173/api/other".to_string());
        assert_eq!(state.take_mismatches().len(), 1);
        assert!(state.take_mismatches().is_empty());
    }

    #[test]
    fn passthrough_policy_forwards_unmatched_requests() {
        let state = state(MockPolicy::Passthrough);
        assert!(matches!(
            state.decide(&get("http://localhost:5173/api/other")),
            Decision::Continue
        ));
    }

    #[test]
    fn responder_discriminates_on_method() {
        let state = state(MockPolicy::Passthrough);
        let rule = MockRule::new(
            UrlPattern::glob("**/api/savings-goals").unwrap(),
            MockResponder::Dynamic(Arc::new(|request: &InterceptedRequest| {
                if request.method == "GET" {
                    MockOutcome::Fulfill(MockResponse::json(json!({"data": []})))
                } else {
                    MockOutcome::Passthrough
                }
            })),
        );
        state.upsert(rule);

        assert!(matches!(
            state.decide(&get("http://localhost:5173/api/savings-goals")),
            Decision::Fulfill(_)
        ));
        let post = InterceptedRequest {
            url: "http://localhost:5173/api/savings-goals".to_string(),
            method: "POST".to_string(),
            body: Some("{}".to_string()),
        };
        assert!(matches!(state.decide(&post), Decision::Continue));
    }
}
