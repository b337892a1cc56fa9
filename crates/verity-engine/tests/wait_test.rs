use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use verity_engine::condition::{Check, Condition};
use verity_engine::driver::{ElementObservation, SessionDriver};
use verity_engine::error::HarnessError;
use verity_engine::mock::MockRule;
use verity_engine::selector::Selector;
use verity_engine::wait;

// =============================================================================
// Mock driver: element becomes visible after a fixed number of observations
// =============================================================================

struct PollDriver {
    observe_calls: Arc<AtomicUsize>,
    visible_after: usize,
    text: String,
    page_text: String,
    url: String,
}

impl PollDriver {
    fn visible_after(calls: usize) -> Self {
        Self {
            observe_calls: Arc::new(AtomicUsize::new(0)),
            visible_after: calls,
            text: "Gastos del Mes".to_string(),
            page_text: "Hola, TestUser\nIngresá tu PIN".to_string(),
            url: "http://localhost:5173/".to_string(),
        }
    }

    fn never_visible() -> Self {
        Self::visible_after(usize::MAX)
    }

    fn calls(&self) -> usize {
        self.observe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDriver for PollDriver {
    async fn navigate(&mut self, _url: &str) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, HarnessError> {
        Ok(self.url.clone())
    }

    async fn observe(
        &mut self,
        _selector: &Selector,
    ) -> Result<ElementObservation, HarnessError> {
        let seen = self.observe_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let visible = seen > self.visible_after;
        Ok(ElementObservation {
            found: visible,
            visible,
            enabled: visible,
            text: self.text.clone(),
            center: visible.then_some((100.0, 40.0)),
        })
    }

    async fn visible_text(&mut self) -> Result<String, HarnessError> {
        Ok(self.page_text.clone())
    }

    async fn click(&mut self, _selector: &Selector) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn click_at(&mut self, _x: f64, _y: f64) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn fill(&mut self, _selector: &Selector, _text: &str) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn press_keys(
        &mut self,
        _selector: &Selector,
        _keys: &[String],
    ) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn scroll_into_view(&mut self, _selector: &Selector) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn register_mock(&mut self, _rule: MockRule) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn take_mock_mismatches(&mut self) -> Vec<String> {
        Vec::new()
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, HarnessError> {
        Ok(vec![0x89])
    }

    async fn close(&mut self) -> Result<(), HarnessError> {
        Ok(())
    }

    fn is_detached(&self) -> bool {
        false
    }
}

/// A cancel channel whose sender stays alive for the test's duration.
fn no_cancel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

fn fast(condition: Condition) -> Condition {
    Condition {
        poll_ms: 10,
        ..condition
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn returns_immediately_when_predicate_already_holds() {
    let mut driver = PollDriver::visible_after(0);
    let condition = fast(Condition::visible(Selector::text("Gastos del Mes")));

    let (_cancel_tx, mut cancel) = no_cancel();
    let started = Instant::now();
    let observation = wait::await_condition(&mut driver, &condition, &mut cancel)
        .await
        .expect("condition should hold");

    assert!(observation.visible);
    assert_eq!(driver.calls(), 1);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn polls_until_predicate_becomes_true() {
    let mut driver = PollDriver::visible_after(3);
    let condition = fast(Condition::visible(Selector::text("Gastos del Mes")));

    let (_cancel_tx, mut cancel) = no_cancel();
    wait::await_condition(&mut driver, &condition, &mut cancel)
        .await
        .expect("condition should eventually hold");

    assert_eq!(driver.calls(), 4);
}

#[tokio::test]
async fn timeout_carries_description_and_last_observed_state() {
    let mut driver = PollDriver::never_visible();
    let condition =
        fast(Condition::visible(Selector::text("Gastos del Mes")).with_timeout_ms(200));

    let (_cancel_tx, mut cancel) = no_cancel();
    let err = wait::await_condition(&mut driver, &condition, &mut cancel)
        .await
        .expect_err("condition can never hold");

    match err {
        HarnessError::ConditionTimeout {
            description,
            elapsed_ms,
            last_observed,
        } => {
            assert!(description.contains("Gastos del Mes"));
            assert!(elapsed_ms >= 200);
            // Within one poll interval past the budget.
            assert!(elapsed_ms < 400, "took {}ms", elapsed_ms);
            assert!(last_observed.contains("Ingresá tu PIN"));
        }
        other => panic!("expected ConditionTimeout, got {}", other),
    }
}

#[tokio::test]
async fn success_is_never_reported_before_observation() {
    let mut driver = PollDriver::visible_after(1_000);
    let condition =
        fast(Condition::visible(Selector::text("Gastos del Mes")).with_timeout_ms(100));

    let (_cancel_tx, mut cancel) = no_cancel();
    let result = wait::await_condition(&mut driver, &condition, &mut cancel).await;
    assert!(matches!(
        result,
        Err(HarnessError::ConditionTimeout { .. })
    ));
}

#[tokio::test]
async fn cancellation_aborts_an_inflight_wait() {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let mut driver = PollDriver::never_visible();
    let condition =
        fast(Condition::visible(Selector::text("Gastos del Mes")).with_timeout_ms(30_000));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = cancel_tx.send(true);
    });

    let started = Instant::now();
    let result = wait::await_condition(&mut driver, &condition, &mut cancel_rx).await;

    assert!(matches!(result, Err(HarnessError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn check_once_is_single_shot() {
    let mut driver = PollDriver::visible_after(2);
    let check = Check::Visible {
        visible: Selector::text("Gastos del Mes"),
    };

    let holds = wait::check_once(&mut driver, &check).await.unwrap();
    assert!(!holds);
    assert_eq!(driver.calls(), 1, "a branch check must not poll");
}

#[tokio::test]
async fn hidden_holds_when_element_is_absent() {
    let mut driver = PollDriver::never_visible();
    let check = Check::Hidden {
        hidden: Selector::text("Logros y Nivel"),
    };
    assert!(wait::check_once(&mut driver, &check).await.unwrap());
}

#[tokio::test]
async fn text_equals_compares_trimmed_text() {
    let mut driver = PollDriver::visible_after(0);
    let holds = wait::check_once(
        &mut driver,
        &Check::TextEquals {
            target: Selector::css(".title"),
            equals: "Gastos del Mes".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(holds);

    let other = wait::check_once(
        &mut driver,
        &Check::TextEquals {
            target: Selector::css(".title"),
            equals: "Saldo Total".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(!other);
}

#[tokio::test]
async fn url_contains_checks_the_live_url() {
    let mut driver = PollDriver::never_visible();
    assert!(
        wait::check_once(
            &mut driver,
            &Check::UrlContains {
                url_contains: "localhost".to_string()
            }
        )
        .await
        .unwrap()
    );
    assert!(
        !wait::check_once(
            &mut driver,
            &Check::UrlContains {
                url_contains: "/history".to_string()
            }
        )
        .await
        .unwrap()
    );
}

#[tokio::test]
async fn interactable_wait_requires_enabled_and_visible() {
    let mut driver = PollDriver::visible_after(2);
    let (_cancel_tx, mut cancel) = no_cancel();
    let observation = wait::await_interactable(
        &mut driver,
        &Selector::role("button", "Continuar"),
        1_000,
        &mut cancel,
    )
    .await
    .expect("element becomes interactable");
    assert!(observation.interactable());
    assert_eq!(driver.calls(), 3);
}
