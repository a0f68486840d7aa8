use anyhow::Result;
use std::path::PathBuf;

use super::Browser;
use super::browser_config::{BrowserConfig, LaunchFlags};

/// Fluent configuration for launching a [`Browser`].
///
/// Defaults match an interactive session: a visible, maximized, incognito window.
#[derive(Debug, Clone, Default)]
pub struct BrowserBuilder {
    flags: LaunchFlags,
    executable: Option<PathBuf>,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run without a visible window.
    pub fn headless(mut self, headless: bool) -> Self {
        self.flags.headless = headless;
        self
    }

    /// Open pages in a fresh, throwaway browser context.
    pub fn incognito(mut self, incognito: bool) -> Self {
        self.flags.incognito = incognito;
        self
    }

    /// Maximize the window (ignored when headless).
    pub fn maximized(mut self, maximized: bool) -> Self {
        self.flags.maximized = maximized;
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.flags.window_size = Some((width, height));
        self
    }

    /// Use this browser binary instead of auto-detection.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub async fn build(self) -> Result<Browser> {
        let config = BrowserConfig::new(self.flags, self.executable)?;
        Browser::create_browser(config).await
    }
}
