mod browser_builder;
mod browser_config;
mod browser_utils;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde_json::json;
use std::process::Child;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub use browser_builder::BrowserBuilder;

use browser_config::BrowserConfig;

use crate::tab::Tab;
use crate::transport::Transport;
use crate::types::TargetInfo;

#[derive(Debug)]
struct Process {
    child: Child,
    _user_data_dir: TempDir,
}

impl Drop for Process {
    /// Kills the browser before the profile directory is removed.
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A browser instance driven over CDP.
///
/// When launched incognito, every tab lives in one throwaway browser context,
/// and [`Browser::pages`] only reports pages from that context.
#[derive(Debug)]
pub struct Browser {
    transport: Arc<Transport>,
    process: Mutex<Option<Process>>,
    browser_context_id: Option<String>,
    maximized: bool,
}

impl Browser {
    /// Launches a visible, maximized, incognito browser.
    pub async fn new() -> Result<Self> {
        BrowserBuilder::new().build().await
    }

    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    async fn create_browser(config: BrowserConfig) -> Result<Self> {
        let mut child = browser_utils::spawn_chrome_process(&config)?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to get stderr from Chrome process")?;

        let BrowserConfig {
            flags,
            user_data_dir,
            ..
        } = config;
        let process = Process {
            child,
            _user_data_dir: user_data_dir,
        };

        let ws_url = browser_utils::get_websocket_url(stderr).await?;
        let mut browser = Self {
            transport: Arc::new(Transport::new(&ws_url).await?),
            process: Mutex::new(Some(process)),
            browser_context_id: None,
            maximized: flags.maximized && !flags.headless,
        };

        if flags.incognito {
            let ctx = browser
                .transport
                .call("Target.createBrowserContext", json!({ "disposeOnDetach": true }))
                .await?;
            browser.browser_context_id = Some(
                ctx["browserContextId"]
                    .as_str()
                    .context("No browserContextId")?
                    .to_string(),
            );
        }

        Ok(browser)
    }

    /// Opens a new blank tab and maximizes its window if configured to.
    pub async fn new_tab(&self) -> Result<Tab> {
        let tab = Tab::new(self.transport.clone(), self.browser_context_id.as_deref()).await?;
        if self.maximized
            && let Err(e) = self.maximize(&tab).await
        {
            warn!("Failed to maximize window: {:?}", e);
        }
        Ok(tab)
    }

    /// Maximizes the OS window hosting `tab`.
    pub async fn maximize(&self, tab: &Tab) -> Result<()> {
        let window = self
            .transport
            .call("Browser.getWindowForTarget", json!({ "targetId": tab.target_id() }))
            .await?;
        let window_id = window["windowId"].as_u64().context("No windowId")?;
        self.transport
            .call(
                "Browser.setWindowBounds",
                json!({ "windowId": window_id, "bounds": { "windowState": "maximized" } }),
            )
            .await?;
        Ok(())
    }

    async fn targets(&self) -> Result<Vec<TargetInfo>> {
        let res = self.transport.call("Target.getTargets", json!({})).await?;
        let infos = res
            .get("targetInfos")
            .cloned()
            .ok_or_else(|| anyhow!("Invalid targetInfos format"))?;
        Ok(serde_json::from_value(infos)?)
    }

    /// Lists open page targets (the CDP equivalent of window handles).
    pub async fn pages(&self) -> Result<Vec<TargetInfo>> {
        Ok(self
            .targets()
            .await?
            .into_iter()
            .filter(TargetInfo::is_page)
            .filter(|info| match &self.browser_context_id {
                Some(ctx) => info.browser_context_id.as_deref() == Some(ctx.as_str()),
                None => true,
            })
            .collect())
    }

    /// Attaches to an already open page, e.g. a window opened by a click.
    pub async fn attach(&self, target_id: &str) -> Result<Tab> {
        Tab::attach(self.transport.clone(), target_id.to_string()).await
    }

    /// Closes every page target outside `keep`'s, such as the startup window.
    pub async fn close_other_pages(&self, keep: &Tab) -> Result<()> {
        for info in self
            .targets()
            .await?
            .iter()
            .filter(|i| i.is_page() && i.target_id != keep.target_id())
        {
            debug!("Closing page {} ({})", info.target_id, info.url);
            self.transport
                .call("Target.closeTarget", json!({ "targetId": info.target_id }))
                .await?;
        }
        Ok(())
    }

    /// Closes the browser: asks it to exit, then kills the process and removes its profile.
    pub async fn close(&self) -> Result<()> {
        self.transport.shutdown().await;
        self.kill()
    }

    fn kill(&self) -> Result<()> {
        let mut process_guard = self
            .process
            .lock()
            .map_err(|_| anyhow!("Failed to lock browser process"))?;

        // Dropping the process kills it and removes the profile directory.
        drop(process_guard.take());
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            warn!("Error closing browser in Drop: {:?}", e);
        }
    }
}
