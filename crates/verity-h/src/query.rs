//! Selector resolution against the live page via an injected JS runtime.
//!
//! The runtime is re-injected whenever navigation wiped it, and calls are
//! retried while the page's execution context is being swapped out.

use chromiumoxide::Page;
use serde_json::json;
use std::error::Error;
use std::time::Duration;
use verity_engine::driver::ElementObservation;
use verity_engine::selector::Selector;

const QUERY_JS: &str = include_str!("query.js");

/// Evaluation timeout; prevents hanging when a dialog blocks the JS thread.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

/// Delay between retries when the context is not found (page navigating).
const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Check if an error indicates the page context is unavailable (e.g. during
/// navigation).
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

async fn ensure_runtime(page: &Page) -> Result<(), Box<dyn Error + Send + Sync>> {
    let is_loaded: bool = page
        .evaluate("typeof window.__verity !== 'undefined'")
        .await
        .map_err(|e| format!("Failed to check query runtime: {}", e))?
        .into_value()
        .map_err(|e| format!("Failed to get bool value: {}", e))?;

    if !is_loaded {
        page.evaluate(QUERY_JS)
            .await
            .map_err(|e| format!("Failed to inject query runtime: {}", e))?;
    }

    Ok(())
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

async fn evaluate_with_timeout(
    page: &Page,
    expression: &str,
) -> Result<serde_json::Value, EvalError> {
    let eval_result = tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await;

    match eval_result {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        Ok(Ok(remote_object)) => remote_object
            .into_value::<serde_json::Value>()
            .map_err(|e| EvalError::Other(format!("Failed to get result: {}", e))),
    }
}

async fn call(
    page: &Page,
    op: &str,
    payload: serde_json::Value,
) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
    let expression = format!("window.__verity.{}({})", op, payload);
    let mut last_error = None;

    for attempt in 0..MAX_CONTEXT_RETRIES {
        if let Err(e) = ensure_runtime(page).await {
            if is_context_error(&e.to_string()) {
                tracing::debug!(
                    "Runtime injection context error (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(e.to_string());
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
                continue;
            }
            return Err(e);
        }

        match evaluate_with_timeout(page, &expression).await {
            Ok(value) => return Ok(value),
            Err(EvalError::Timeout) => {
                return Err(
                    "Query timed out - possibly blocked by a dialog (alert/confirm/prompt)".into(),
                );
            }
            Err(EvalError::Context(err_str)) => {
                tracing::debug!(
                    "Context error during query (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err_str);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err_str)) => {
                return Err(format!("Query evaluation failed: {}", err_str).into());
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| "Failed to run query after retries".to_string())
        .into())
}

fn selector_payload(selector: &Selector) -> serde_json::Value {
    match selector {
        Selector::Role { role, name, exact } => {
            json!({"kind": "role", "role": role, "name": name, "exact": exact})
        }
        Selector::Placeholder { placeholder } => {
            json!({"kind": "placeholder", "placeholder": placeholder})
        }
        Selector::Text { text, exact } => json!({"kind": "text", "text": text, "exact": exact}),
        Selector::Css { css } => json!({"kind": "css", "css": css}),
    }
}

/// Resolve `selector` and report what the DOM currently shows for it.
pub async fn observe(
    page: &Page,
    selector: &Selector,
) -> Result<ElementObservation, Box<dyn Error + Send + Sync>> {
    let value = call(page, "observe", selector_payload(selector)).await?;
    let center = value.get("center").and_then(|c| {
        let x = c.get("x")?.as_f64()?;
        let y = c.get("y")?.as_f64()?;
        Some((x, y))
    });
    Ok(ElementObservation {
        found: value.get("found").and_then(|v| v.as_bool()).unwrap_or(false),
        visible: value
            .get("visible")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        enabled: value
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        text: value
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        center,
    })
}

/// Snapshot of the page's visible text, capped in-page to stay cheap.
pub async fn visible_text(page: &Page) -> Result<String, Box<dyn Error + Send + Sync>> {
    let value = call(page, "visibleText", json!({})).await?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Focus the target and select its current contents so a following
/// `Input.insertText` overwrites rather than appends.
pub async fn prepare_fill(
    page: &Page,
    selector: &Selector,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    expect_ok(call(page, "prepareFill", selector_payload(selector)).await?)
}

pub async fn scroll_into_view(
    page: &Page,
    selector: &Selector,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    expect_ok(call(page, "scrollIntoView", selector_payload(selector)).await?)
}

fn expect_ok(value: serde_json::Value) -> Result<(), Box<dyn Error + Send + Sync>> {
    if value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
        Ok(())
    } else {
        let error = value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown query failure");
        Err(error.to_string().into())
    }
}
