use async_trait::async_trait;
use verity_common::error::HarnessError;
use verity_common::mock::MockRule;
use verity_common::selector::Selector;
use verity_common::session::SessionConfig;

/// What a single DOM query observed.
///
/// A plain value, never a live handle: the DOM may re-render at any await
/// point, so callers re-query instead of holding on to this.
#[derive(Debug, Clone, Default)]
pub struct ElementObservation {
    pub found: bool,
    pub visible: bool,
    pub enabled: bool,
    pub text: String,
    /// Viewport coordinates of the element's center, when it has a layout
    /// box.
    pub center: Option<(f64, f64)>,
}

impl ElementObservation {
    pub fn interactable(&self) -> bool {
        self.found && self.visible && self.enabled
    }
}

/// One live automation-protocol connection owning isolated sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Create a fully isolated session: own storage, cookies and mock rules.
    async fn create_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn SessionDriver>, HarnessError>;

    /// Shut the connection down, closing every session transitively.
    async fn close(&mut self) -> Result<(), HarnessError>;
}

/// Operations against one isolated browsing context.
///
/// Implementations resolve selectors against the live DOM at call time and
/// dispatch real input events through the protocol, so application-level
/// handlers fire exactly as for a human user.
#[async_trait]
pub trait SessionDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), HarnessError>;

    async fn current_url(&mut self) -> Result<String, HarnessError>;

    /// Re-resolve `selector` against the live DOM.
    async fn observe(&mut self, selector: &Selector)
    -> Result<ElementObservation, HarnessError>;

    /// Snapshot of the page's visible text, used for timeout diagnostics.
    async fn visible_text(&mut self) -> Result<String, HarnessError>;

    async fn click(&mut self, selector: &Selector) -> Result<(), HarnessError>;

    /// Dispatch a click at viewport coordinates, bypassing resolution.
    async fn click_at(&mut self, x: f64, y: f64) -> Result<(), HarnessError>;

    async fn fill(&mut self, selector: &Selector, text: &str) -> Result<(), HarnessError>;

    async fn press_keys(
        &mut self,
        selector: &Selector,
        keys: &[String],
    ) -> Result<(), HarnessError>;

    async fn scroll_into_view(&mut self, selector: &Selector) -> Result<(), HarnessError>;

    /// Register or replace an interception rule. New patterns are only
    /// accepted before the session's first navigation; replacing an existing
    /// pattern is allowed at any point.
    async fn register_mock(&mut self, rule: MockRule) -> Result<(), HarnessError>;

    /// Drain URLs that matched no rule since the last call. Only populated
    /// under the strict mock policy.
    async fn take_mock_mismatches(&mut self) -> Vec<String>;

    async fn screenshot(&mut self) -> Result<Vec<u8>, HarnessError>;

    /// Tear the session down. Idempotent.
    async fn close(&mut self) -> Result<(), HarnessError>;

    /// True once the underlying connection is gone; every operation will
    /// fail with `ConnectionLost` from then on.
    fn is_detached(&self) -> bool;
}
