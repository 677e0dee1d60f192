use crate::element::Element;
use crate::transport::{Transport, next_id};
use crate::transport_actor::TransportResponse;
use crate::types::ControlLocator;
use crate::utils::{self, send_and_get_msg};
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Represents a CDP browser tab (target) session.
pub struct Tab {
    pub(crate) transport: Arc<Transport>,
    pub(crate) session_id: String,
    pub(crate) target_id: String,
}

impl Tab {
    pub(crate) async fn new(transport: Arc<Transport>) -> Result<Self> {
        let TransportResponse::Response(res_create) = transport
            .send(json!({ "id": next_id(), "method": "Target.createTarget", "params": { "url": "about:blank" } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let target_id = res_create.result["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        let TransportResponse::Response(res_attach) = transport
            .send(json!({ "id": next_id(), "method": "Target.attachToTarget", "params": { "targetId": target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let session_id = res_attach.result["sessionId"]
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
        let data = utils::serde_msg(&res)?;

        if let Some(error) = data.get("error") {
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(anyhow!("{method} failed: {message}"));
        }

        Ok(data)
    }

    /// Navigates to `url` and waits for the page's load event.
    ///
    /// A navigation the browser itself reports as failed (unreachable host,
    /// refused connection) is an error even though Chrome would render its
    /// error page and fire the load event anyway.
    pub async fn goto(&self, url: &str) -> Result<&Self> {
        self.send_cmd("Page.enable", json!({})).await?;

        // Register listener BEFORE triggering the event to avoid race conditions
        let event_rx = self
            .transport
            .listen_for_event(&self.session_id, "Page.loadEventFired")
            .await?;

        let res = self.send_cmd("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = res["result"]["errorText"].as_str()
            && !error_text.is_empty()
        {
            return Err(anyhow!("Navigation to {url} failed: {error_text}"));
        }

        time::timeout(Duration::from_secs(30), event_rx)
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
        Ok(result["result"]["result"]["value"].clone())
    }

    pub async fn title(&self) -> Result<String> {
        let value = self.evaluate("document.title").await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .context("document.title did not return a string")
    }

    /// Finds the `<select>` control addressed by `locator`.
    pub async fn find_control(&self, locator: ControlLocator) -> Result<Element<'_>> {
        let doc = self.send_cmd("DOM.getDocument", json!({})).await?;
        let root_node_id = doc["result"]["root"]["nodeId"]
            .as_u64()
            .context("No root node")?;

        let found = self
            .send_cmd(
                "DOM.querySelectorAll",
                json!({ "nodeId": root_node_id, "selector": locator.css() }),
            )
            .await?;
        let node_ids: Vec<u64> = found["result"]["nodeIds"]
            .as_array()
            .context("No nodeIds in query reply")?
            .iter()
            .filter_map(|id| id.as_u64())
            .collect();

        let index = locator.resolve_index(node_ids.len())?;
        Element::new(self, node_ids[index]).await
    }

    /// Captures a full-page PNG screenshot, returned as base64.
    pub async fn screenshot(&self) -> Result<String> {
        self.activate().await?;

        let result = self
            .send_cmd(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "fromSurface": true,
                    "captureBeyondViewport": true,
                }),
            )
            .await?;

        result["result"]["data"]
            .as_str()
            .map(|s| s.to_string())
            .context("No image data received")
    }

    /// Captures a full-page PNG screenshot and writes it to `path`,
    /// creating missing parent directories and overwriting a previous file.
    pub async fn screenshot_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let png = decode_screenshot(&self.screenshot().await?)?;
        write_screenshot(path.as_ref(), &png)
    }

    pub async fn activate(&self) -> Result<&Self> {
        self.send_cmd(
            "Target.activateTarget",
            json!({ "targetId": self.target_id }),
        )
        .await?;
        Ok(self)
    }

    pub async fn close(&self) -> Result<()> {
        self.send_cmd("Target.closeTarget", json!({ "targetId": self.target_id }))
            .await?;
        Ok(())
    }
}

fn decode_screenshot(data: &str) -> Result<Vec<u8>> {
    let bytes = base64::prelude::BASE64_STANDARD
        .decode(data)
        .context("Screenshot data is not valid base64")?;
    if bytes.is_empty() {
        return Err(anyhow!("Screenshot decoded to zero bytes"));
    }
    Ok(bytes)
}

fn write_screenshot(path: &Path, png: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, png).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG.
    const TINY_PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn decoded_screenshots_are_png_bytes() {
        let bytes = decode_screenshot(TINY_PNG_B64).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn garbage_base64_is_rejected() {
        assert!(decode_screenshot("definitely not base64!!!").is_err());
    }

    #[test]
    fn screenshots_land_in_created_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captures").join("01_state.png");
        let bytes = decode_screenshot(TINY_PNG_B64).unwrap();

        write_screenshot(&path, &bytes).unwrap();

        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn rewriting_a_screenshot_overwrites_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.png");

        write_screenshot(&path, b"first").unwrap();
        write_screenshot(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }
}
