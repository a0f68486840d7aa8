use crate::tab::Tab;
use crate::types::Key;
use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

/// Represents a DOM element controlled via CDP.
///
/// Elements are addressed by backend node id, which stays valid across
/// further queries on the same document.
pub struct Element<'a> {
    parent: &'a Tab,
    backend_node_id: u64,
}

impl<'a> Element<'a> {
    pub(crate) async fn new(parent: &'a Tab, node_id: u64) -> Result<Self> {
        let data = parent
            .send_cmd("DOM.describeNode", json!({ "nodeId": node_id }))
            .await?;
        let backend_node_id = data["result"]["node"]["backendNodeId"]
            .as_u64()
            .context("Missing backendNodeId")?;

        Ok(Self {
            parent,
            backend_node_id,
        })
    }

    /// Pushes this node to the frontend and returns a fresh node id for DOM queries.
    async fn node_id(&self) -> Result<u64> {
        let data = self
            .parent
            .send_cmd(
                "DOM.pushNodesByBackendIdsToFrontend",
                json!({ "backendNodeIds": [self.backend_node_id] }),
            )
            .await?;
        data["result"]["nodeIds"][0]
            .as_u64()
            .filter(|id| *id != 0)
            .context("Element is no longer attached to the document")
    }

    /// Returns every descendant matching `selector`.
    pub async fn query_selector_all(&self, selector: &str) -> Result<Vec<Element<'a>>> {
        let node_id = self.node_id().await?;
        self.parent.query_all_under(node_id, selector).await
    }

    /// Returns the first descendant matching `selector`, if any.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<Element<'a>>> {
        let node_id = self.node_id().await?;
        let res = self
            .parent
            .send_cmd(
                "DOM.querySelector",
                json!({ "nodeId": node_id, "selector": selector }),
            )
            .await?;
        match res["result"]["nodeId"].as_u64() {
            Some(0) | None => Ok(None),
            Some(id) => Element::new(self.parent, id).await.map(Some),
        }
    }

    /// Runs `function_declaration` with `this` bound to the element and returns its value.
    async fn call_function(&self, function_declaration: &str, args: &[Value]) -> Result<Value> {
        let resolved = self
            .parent
            .send_cmd(
                "DOM.resolveNode",
                json!({ "backendNodeId": self.backend_node_id }),
            )
            .await?;
        let object_id = resolved["result"]["object"]["objectId"]
            .as_str()
            .context("Could not resolve element to a JS object")?;

        let arguments: Vec<Value> = args.iter().map(|v| json!({ "value": v })).collect();
        let res = self
            .parent
            .send_cmd(
                "Runtime.callFunctionOn",
                json!({
                    "functionDeclaration": function_declaration,
                    "objectId": object_id,
                    "arguments": arguments,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        if let Some(details) = res["result"].get("exceptionDetails") {
            return Err(anyhow!("Script threw: {}", details["text"]));
        }
        Ok(res["result"]["result"]["value"].clone())
    }

    /// Rendered text of the element.
    pub async fn text(&self) -> Result<String> {
        let value = self
            .call_function(
                "function() { return this.innerText ?? this.textContent ?? ''; }",
                &[],
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Property value when it is a string (so `href` comes back absolute),
    /// otherwise the raw attribute.
    pub async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let value = self
            .call_function(
                "function(n) { const p = this[n]; return typeof p === 'string' ? p : this.getAttribute(n); }",
                &[json!(name)],
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn focus(&self) -> Result<()> {
        self.parent
            .send_cmd("DOM.focus", json!({ "backendNodeId": self.backend_node_id }))
            .await?;
        Ok(())
    }

    /// Empties an input-like element and notifies listeners.
    pub async fn clear(&self) -> Result<()> {
        self.call_function(
            "function() { if ('value' in this) { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); } }",
            &[],
        )
        .await?;
        Ok(())
    }

    /// Focuses the element and types `text` into it.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.focus().await?;
        self.parent.insert_text(text).await?;
        Ok(())
    }

    /// Focuses the element and presses `key`.
    pub async fn press(&self, key: Key) -> Result<()> {
        self.focus().await?;
        self.parent.press_key(key).await?;
        Ok(())
    }

    /// Scrolls the element into view and clicks its center with the left button.
    pub async fn click(&self) -> Result<()> {
        self.parent
            .send_cmd(
                "DOM.scrollIntoViewIfNeeded",
                json!({ "backendNodeId": self.backend_node_id }),
            )
            .await?;

        let quads = self
            .parent
            .send_cmd(
                "DOM.getContentQuads",
                json!({ "backendNodeId": self.backend_node_id }),
            )
            .await?;
        let quad = quads["result"]["quads"][0]
            .as_array()
            .context("Element has no layout box")?;
        let (x, y) = quad_center(quad).context("Malformed content quad")?;

        for event in ["mouseMoved", "mousePressed", "mouseReleased"] {
            let mut params = json!({ "type": event, "x": x, "y": y });
            if event != "mouseMoved" {
                params["button"] = json!("left");
                params["clickCount"] = json!(1);
            }
            self.parent
                .send_cmd("Input.dispatchMouseEvent", params)
                .await?;
        }
        Ok(())
    }
}

/// Center of a CDP quad `[x1, y1, x2, y2, x3, y3, x4, y4]`.
fn quad_center(quad: &[Value]) -> Option<(f64, f64)> {
    if quad.len() != 8 {
        return None;
    }
    let coords: Option<Vec<f64>> = quad.iter().map(Value::as_f64).collect();
    let coords = coords?;
    let x = (coords[0] + coords[2] + coords[4] + coords[6]) / 4.0;
    let y = (coords[1] + coords[3] + coords[5] + coords[7]) / 4.0;
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_center_averages_corners() {
        let quad: Vec<Value> = [10.0, 20.0, 30.0, 20.0, 30.0, 40.0, 10.0, 40.0]
            .iter()
            .map(|v| json!(v))
            .collect();
        assert_eq!(quad_center(&quad), Some((20.0, 30.0)));
    }

    #[test]
    fn quad_center_rejects_short_quads() {
        let quad = vec![json!(1.0), json!(2.0)];
        assert_eq!(quad_center(&quad), None);
    }
}
