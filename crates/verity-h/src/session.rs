//! Session management over isolated CDP browser contexts.
//!
//! Every session gets its own browser context (separate cookies, storage and
//! cache) with one page inside it, plus its own interception state. Closing
//! a session disposes the context, which tears the page down with it.

use crate::cdp::CdpClient;
use crate::intercept::{self, InterceptState};
use crate::query;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use verity_engine::driver::{BrowserDriver, ElementObservation, SessionDriver};
use verity_engine::error::HarnessError;
use verity_engine::mock::MockRule;
use verity_engine::selector::Selector;
use verity_engine::session::SessionConfig;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// `BrowserDriver` over one chromiumoxide connection.
pub struct CdpBrowser {
    client: Option<CdpClient>,
}

impl CdpBrowser {
    pub async fn launch(visible: bool) -> Result<Self, HarnessError> {
        let client = CdpClient::launch(visible)
            .await
            .map_err(|e| HarnessError::Protocol(e.to_string()))?;
        Ok(Self {
            client: Some(client),
        })
    }
}

#[async_trait]
impl BrowserDriver for CdpBrowser {
    async fn create_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn SessionDriver>, HarnessError> {
        let client = self.client.as_ref().ok_or(HarnessError::ConnectionLost)?;
        let session = CdpSession::create(client, config).await?;
        Ok(Box::new(session))
    }

    async fn close(&mut self) -> Result<(), HarnessError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| HarnessError::Protocol(e.to_string()))?;
        }
        Ok(())
    }
}

/// One isolated browsing context and the page inside it.
pub struct CdpSession {
    browser: Arc<Browser>,
    page: Page,
    context_id: Option<BrowserContextId>,
    detached: watch::Receiver<bool>,
    intercept: InterceptState,
    navigated: bool,
    closed: bool,
}

impl CdpSession {
    pub(crate) async fn create(
        client: &CdpClient,
        config: &SessionConfig,
    ) -> Result<Self, HarnessError> {
        if client.is_detached() {
            return Err(HarnessError::ConnectionLost);
        }
        let browser = client.browser.clone();

        let context = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| HarnessError::Protocol(format!("create browser context: {}", e)))?;
        let context_id = context.result.browser_context_id.clone();

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| HarnessError::Protocol(format!("build target params: {:?}", e)))?;
        let page = browser
            .new_page(target)
            .await
            .map_err(|e| HarnessError::Protocol(format!("create page: {}", e)))?;

        apply_emulation(&page, config).await?;
        wire_dialog_handler(&page).await?;

        // Interception is armed here, before any navigation, so mock rules
        // registered during flow setup are guaranteed active when the first
        // request goes out.
        let intercept = intercept::arm(&page, config.mock_policy.unwrap_or_default()).await?;

        info!(
            width = config.viewport.width,
            height = config.viewport.height,
            "session created"
        );
        Ok(Self {
            browser,
            page,
            context_id: Some(context_id),
            detached: client.detached.clone(),
            intercept,
            navigated: false,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), HarnessError> {
        if *self.detached.borrow() {
            return Err(HarnessError::ConnectionLost);
        }
        if self.closed {
            return Err(HarnessError::Protocol("session already closed".into()));
        }
        Ok(())
    }

    /// Race a protocol operation against the detach signal so work pending
    /// on a severed connection fails instead of hanging.
    async fn guard<T, E, F>(&self, fut: F) -> Result<T, HarnessError>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        let mut detached = self.detached.clone();
        if *detached.borrow() {
            return Err(HarnessError::ConnectionLost);
        }
        tokio::select! {
            res = fut => res.map_err(|e| HarnessError::Protocol(e.to_string())),
            _ = detached.changed() => Err(HarnessError::ConnectionLost),
        }
    }

    async fn press_key(&mut self, key: &str) -> Result<(), HarnessError> {
        // Printable single characters go through insertText; named keys get
        // a proper down/up event pair so key handlers fire.
        if key.chars().count() == 1 {
            let page = self.page.clone();
            let text = key.to_string();
            return self
                .guard(async move {
                    page.execute(InsertTextParams::new(text)).await?;
                    Ok::<_, chromiumoxide::error::CdpError>(())
                })
                .await;
        }

        let definition = key_definition(key);
        let page = self.page.clone();
        let key = key.to_string();
        self.guard(async move {
            for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
                let mut builder = DispatchKeyEventParams::builder()
                    .r#type(event_type)
                    .key(key.clone())
                    .code(definition.code.clone())
                    .windows_virtual_key_code(definition.virtual_key_code);
                if let Some(text) = definition.text {
                    builder = builder.text(text);
                }
                let event = builder
                    .build()
                    .map_err(|e| format!("Failed to build key event: {:?}", e))?;
                page.execute(event).await?;
            }
            Ok::<_, BoxedError>(())
        })
        .await
    }
}

#[async_trait]
impl SessionDriver for CdpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), HarnessError> {
        self.ensure_open()?;
        info!(url, "navigating");
        let page = self.page.clone();
        let target = url.to_string();
        self.guard(async move {
            page.goto(target.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
        .map_err(|e| match e {
            HarnessError::Protocol(msg) => HarnessError::Navigation(msg),
            other => other,
        })?;
        self.navigated = true;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, HarnessError> {
        self.ensure_open()?;
        let page = self.page.clone();
        let url = self
            .guard(async move { page.url().await })
            .await?
            .unwrap_or_default();
        Ok(url)
    }

    async fn observe(
        &mut self,
        selector: &Selector,
    ) -> Result<ElementObservation, HarnessError> {
        self.ensure_open()?;
        let page = self.page.clone();
        let selector = selector.clone();
        self.guard(async move { query::observe(&page, &selector).await })
            .await
    }

    async fn visible_text(&mut self) -> Result<String, HarnessError> {
        self.ensure_open()?;
        let page = self.page.clone();
        self.guard(async move { query::visible_text(&page).await })
            .await
    }

    async fn click(&mut self, selector: &Selector) -> Result<(), HarnessError> {
        let observation = self.observe(selector).await?;
        let (x, y) = observation
            .center
            .ok_or_else(|| HarnessError::ElementNotInteractable {
                selector: selector.to_string(),
                reason: "no layout box".into(),
            })?;
        self.click_at(x, y).await
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<(), HarnessError> {
        self.ensure_open()?;
        debug!(x, y, "dispatching click");
        let page = self.page.clone();
        self.guard(async move {
            let moved = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseMoved)
                .x(x)
                .y(y)
                .build()
                .map_err(|e| format!("Failed to build mouse event: {:?}", e))?;
            page.execute(moved).await?;

            let pressed = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MousePressed)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(|e| format!("Failed to build mouse event: {:?}", e))?;
            page.execute(pressed).await?;

            let released = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseReleased)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(|e| format!("Failed to build mouse event: {:?}", e))?;
            page.execute(released).await?;

            Ok::<_, BoxedError>(())
        })
        .await
    }

    async fn fill(&mut self, selector: &Selector, text: &str) -> Result<(), HarnessError> {
        // Focus with a real click, select what is there, then overwrite via
        // Input.insertText so the application sees a genuine input event.
        self.click(selector).await?;

        let page = self.page.clone();
        let target = selector.clone();
        self.guard(async move { query::prepare_fill(&page, &target).await })
            .await?;

        let page = self.page.clone();
        let contents = text.to_string();
        self.guard(async move {
            page.execute(InsertTextParams::new(contents)).await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
    }

    async fn press_keys(
        &mut self,
        selector: &Selector,
        keys: &[String],
    ) -> Result<(), HarnessError> {
        self.click(selector).await?;
        for key in keys {
            self.press_key(key).await?;
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &Selector) -> Result<(), HarnessError> {
        self.ensure_open()?;
        let page = self.page.clone();
        let selector = selector.clone();
        self.guard(async move { query::scroll_into_view(&page, &selector).await })
            .await
    }

    async fn register_mock(&mut self, rule: MockRule) -> Result<(), HarnessError> {
        self.ensure_open()?;
        if self.navigated && !self.intercept.has_pattern(rule.pattern.raw()) {
            // A brand-new rule after navigation races against requests that
            // may already be in flight; only replacement is allowed here.
            return Err(HarnessError::Protocol(format!(
                "mock for '{}' registered after first navigation; new rules must be armed before navigate",
                rule.pattern.raw()
            )));
        }
        debug!(pattern = %rule.pattern, "mock rule registered");
        self.intercept.upsert(rule);
        Ok(())
    }

    async fn take_mock_mismatches(&mut self) -> Vec<String> {
        self.intercept.take_mismatches()
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, HarnessError> {
        self.ensure_open()?;
        let page = self.page.clone();
        self.guard(async move {
            page.screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
                .await
        })
        .await
    }

    async fn close(&mut self) -> Result<(), HarnessError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // A detached connection already took the context down with it.
        if *self.detached.borrow() {
            self.context_id = None;
            return Ok(());
        }

        if let Some(context_id) = self.context_id.take() {
            let params = DisposeBrowserContextParams::builder()
                .browser_context_id(context_id)
                .build()
                .map_err(|e| HarnessError::Protocol(format!("build dispose params: {:?}", e)))?;
            let browser = self.browser.clone();
            self.guard(async move {
                browser.execute(params).await?;
                Ok::<_, chromiumoxide::error::CdpError>(())
            })
            .await?;
            info!("session closed");
        }
        Ok(())
    }

    fn is_detached(&self) -> bool {
        *self.detached.borrow()
    }
}

struct KeyDefinition {
    code: String,
    virtual_key_code: i64,
    text: Option<&'static str>,
}

fn key_definition(key: &str) -> KeyDefinition {
    let (virtual_key_code, text) = match key {
        "Enter" => (13, Some("\r")),
        "Tab" => (9, Some("\t")),
        "Escape" => (27, None),
        "Backspace" => (8, None),
        "ArrowUp" => (38, None),
        "ArrowDown" => (40, None),
        "ArrowLeft" => (37, None),
        "ArrowRight" => (39, None),
        _ => (0, None),
    };
    KeyDefinition {
        code: key.to_string(),
        virtual_key_code,
        text,
    }
}

async fn apply_emulation(page: &Page, config: &SessionConfig) -> Result<(), HarnessError> {
    let device = config.device.clone().unwrap_or_default();

    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(i64::from(config.viewport.width))
        .height(i64::from(config.viewport.height))
        .device_scale_factor(1.0)
        .mobile(device.mobile)
        .build()
        .map_err(|e| HarnessError::Protocol(format!("build device metrics: {:?}", e)))?;
    page.execute(metrics)
        .await
        .map_err(|e| HarnessError::Protocol(format!("apply device metrics: {}", e)))?;

    if let Some(user_agent) = device.user_agent {
        page.execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| HarnessError::Protocol(format!("apply user agent: {}", e)))?;
    }

    if device.touch {
        page.execute(SetTouchEmulationEnabledParams::new(true))
            .await
            .map_err(|e| HarnessError::Protocol(format!("enable touch emulation: {}", e)))?;
    }

    Ok(())
}

/// Auto-accept JavaScript dialogs so an unexpected alert/confirm never
/// deadlocks a flow mid-step.
async fn wire_dialog_handler(page: &Page) -> Result<(), HarnessError> {
    let mut dialog_events = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| HarnessError::Protocol(format!("subscribe to dialog events: {}", e)))?;

    let page_clone = page.clone();
    tokio::spawn(async move {
        while let Some(event) = dialog_events.next().await {
            info!(
                "Handling JavaScript dialog: {} ({:?})",
                event.message, event.r#type
            );
            let cmd = HandleJavaScriptDialogParams::new(true);
            if let Err(e) = page_clone.execute(cmd).await {
                warn!("Failed to accept dialog: {}", e);
            }
        }
    });

    Ok(())
}
