use crate::element::Element;
use crate::transport::{Transport, next_id};
use crate::types::{Key, PageMetrics, ScrollState, WaitOptions};
use crate::utils::{self, send_and_get_msg, wait_until};
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Represents a CDP browser tab (target) session.
pub struct Tab {
    pub(crate) transport: Arc<Transport>,
    pub(crate) session_id: String,
    pub(crate) target_id: String,
}

impl Tab {
    /// Creates a new blank tab, optionally inside a browser context, and attaches to it.
    pub(crate) async fn new(transport: Arc<Transport>, browser_context_id: Option<&str>) -> Result<Self> {
        let mut params = json!({ "url": "about:blank" });
        if let Some(ctx) = browser_context_id {
            params["browserContextId"] = json!(ctx);
        }
        let created = transport.call("Target.createTarget", params).await?;
        let target_id = created["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        Self::attach(transport, target_id).await
    }

    /// Attaches to an existing page target, e.g. one opened by a link click.
    pub(crate) async fn attach(transport: Arc<Transport>, target_id: String) -> Result<Self> {
        let attached = transport
            .call("Target.attachToTarget", json!({ "targetId": target_id }))
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .context("No sessionId")?
            .to_string();

        Ok(Self {
            transport,
            session_id,
            target_id,
        })
    }

    pub(crate) async fn send_cmd(&self, method: &str, params: Value) -> Result<Value> {
        let msg_id = next_id();
        let msg = json!({
            "id": msg_id,
            "method": method,
            "params": params
        })
        .to_string();
        let res = send_and_get_msg(self.transport.clone(), msg_id, &self.session_id, msg).await?;
        utils::serde_msg(&res)
    }

    /// Navigates to `url` and waits for the load event.
    pub async fn goto(&self, url: &str) -> Result<&Self> {
        self.send_cmd("Page.enable", json!({})).await?;

        // Register listener BEFORE triggering the event to avoid race conditions
        let event_rx = self
            .transport
            .listen_for_event(&self.session_id, "Page.loadEventFired")
            .await?;

        let res = self.send_cmd("Page.navigate", json!({ "url": url })).await?;
        if let Some(err) = res["result"]["errorText"].as_str() {
            return Err(anyhow!("Navigation to {} failed: {}", url, err));
        }

        time::timeout(LOAD_TIMEOUT, event_rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for event Page.loadEventFired"))?
            .map_err(|_| anyhow!("Event channel closed"))?;

        Ok(self)
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_cmd(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        if let Some(details) = result["result"].get("exceptionDetails") {
            return Err(anyhow!("Script threw: {}", details["text"]));
        }
        Ok(result["result"]["result"]["value"].clone())
    }

    pub async fn evaluate_as_string(&self, expression: &str) -> Result<String> {
        let value = self.evaluate(expression).await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .or_else(|| Some(value.to_string()))
            .context("Failed to convert result to string")
    }

    async fn document_node_id(&self) -> Result<u64> {
        let doc = self.send_cmd("DOM.getDocument", json!({})).await?;
        doc["result"]["root"]["nodeId"]
            .as_u64()
            .context("No root node")
    }

    /// Returns the first element matching `selector`, or `None` if there is none.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<Element<'_>>> {
        let root = self.document_node_id().await?;
        let res = self
            .send_cmd(
                "DOM.querySelector",
                json!({ "nodeId": root, "selector": selector }),
            )
            .await?;
        match res["result"]["nodeId"].as_u64() {
            Some(0) | None => Ok(None),
            Some(node_id) => Element::new(self, node_id).await.map(Some),
        }
    }

    /// Returns every element matching `selector`, in document order.
    pub async fn query_selector_all(&self, selector: &str) -> Result<Vec<Element<'_>>> {
        let root = self.document_node_id().await?;
        self.query_all_under(root, selector).await
    }

    pub(crate) async fn query_all_under(&self, node_id: u64, selector: &str) -> Result<Vec<Element<'_>>> {
        let res = self
            .send_cmd(
                "DOM.querySelectorAll",
                json!({ "nodeId": node_id, "selector": selector }),
            )
            .await?;
        let ids = res["result"]["nodeIds"]
            .as_array()
            .context("No nodeIds in querySelectorAll result")?;

        let mut elements = Vec::with_capacity(ids.len());
        for id in ids.iter().filter_map(|v| v.as_u64()) {
            elements.push(Element::new(self, id).await?);
        }
        Ok(elements)
    }

    /// Polls until an element matching `selector` exists.
    pub async fn wait_for_selector(&self, selector: &str, opts: &WaitOptions) -> Result<Element<'_>> {
        wait_until(opts, || self.query_selector(selector))
            .await
            .map_err(|_| anyhow!("Timed out after {:?} waiting for {}", opts.timeout, selector))
    }

    /// Polls until at least one element matches `selector`, then returns all matches.
    pub async fn wait_for_all(&self, selector: &str, opts: &WaitOptions) -> Result<Vec<Element<'_>>> {
        wait_until(opts, || async move {
            let found = self.query_selector_all(selector).await?;
            Ok::<_, anyhow::Error>((!found.is_empty()).then_some(found))
        })
        .await
        .map_err(|_| anyhow!("Timed out after {:?} waiting for {}", opts.timeout, selector))
    }

    /// Inserts text at the focused element, as if typed.
    pub async fn insert_text(&self, text: &str) -> Result<&Self> {
        self.send_cmd("Input.insertText", json!({ "text": text }))
            .await?;
        Ok(self)
    }

    /// Dispatches a key press (down then up) to the focused element.
    pub async fn press_key(&self, key: Key) -> Result<&Self> {
        let mut down = json!({
            "type": "keyDown",
            "key": key.key(),
            "code": key.key(),
            "windowsVirtualKeyCode": key.key_code(),
            "nativeVirtualKeyCode": key.key_code(),
        });
        if let Some(text) = key.text() {
            down["text"] = json!(text);
            down["unmodifiedText"] = json!(text);
        }
        self.send_cmd("Input.dispatchKeyEvent", down).await?;

        self.send_cmd(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": key.key(),
                "code": key.key(),
                "windowsVirtualKeyCode": key.key_code(),
                "nativeVirtualKeyCode": key.key_code(),
            }),
        )
        .await?;
        Ok(self)
    }

    /// Reads the scroll height and viewport size of the current document.
    pub async fn metrics(&self) -> Result<PageMetrics> {
        let value = self
            .evaluate(
                "({ scrollHeight: document.body.scrollHeight, \
                    viewportHeight: window.innerHeight, \
                    viewportWidth: window.innerWidth })",
            )
            .await?;
        serde_json::from_value(value).context("Unexpected page metrics shape")
    }

    pub async fn scroll_to(&self, y: u32) -> Result<&Self> {
        self.evaluate(&format!("window.scrollTo(0, {}); true", y))
            .await?;
        Ok(self)
    }

    /// Reads the document's ready state and scroll position after two animation frames.
    pub async fn scroll_state(&self) -> Result<ScrollState> {
        let value = self
            .evaluate(
                r#"new Promise(resolve => requestAnimationFrame(() => requestAnimationFrame(() => {
                    const el = document.scrollingElement || document.documentElement;
                    resolve({
                        complete: document.readyState === "complete",
                        scrollY: window.scrollY,
                        scrollHeight: el.scrollHeight,
                        clientHeight: el.clientHeight
                    });
                })))"#,
            )
            .await?;
        serde_json::from_value(value).context("Unexpected scroll state shape")
    }

    /// Whether the page has finished loading and the scroll position has reached
    /// `y`, or the furthest point the page can scroll to.
    pub async fn scroll_settled(&self, y: u32) -> Result<bool> {
        Ok(self.scroll_state().await?.settled_at(y))
    }

    /// Captures the visible viewport as PNG bytes.
    pub async fn capture_viewport(&self) -> Result<Vec<u8>> {
        self.activate().await?;
        let result = self
            .send_cmd(
                "Page.captureScreenshot",
                json!({ "format": "png", "fromSurface": true }),
            )
            .await?;
        let data = result["result"]["data"]
            .as_str()
            .context("No image data received")?;
        Base64Standard
            .decode(data)
            .context("Screenshot data is not valid base64")
    }

    pub async fn activate(&self) -> Result<&Self> {
        self.transport
            .call("Target.activateTarget", json!({ "targetId": self.target_id }))
            .await?;
        Ok(self)
    }

    pub async fn url(&self) -> Result<String> {
        self.evaluate_as_string("window.location.href").await
    }

    pub async fn title(&self) -> Result<String> {
        self.evaluate_as_string("document.title").await
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub async fn close(&self) -> Result<()> {
        self.transport
            .call("Target.closeTarget", json!({ "targetId": self.target_id }))
            .await?;
        Ok(())
    }
}
