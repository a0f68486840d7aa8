use serde::Deserialize;
use std::time::Duration;

/// Bounded polling used wherever the page needs time to catch up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay between two probes.
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WaitOptions {
    /// Creates wait options with the given timeout and the default poll interval.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Keys that can be dispatched with [`crate::Tab::press_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Tab,
    Escape,
    Backspace,
}

impl Key {
    /// DOM `key` value.
    pub(crate) fn key(&self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Tab => "Tab",
            Key::Escape => "Escape",
            Key::Backspace => "Backspace",
        }
    }

    /// Windows virtual key code, which Chrome needs to trigger default actions.
    pub(crate) fn key_code(&self) -> u32 {
        match self {
            Key::Enter => 13,
            Key::Tab => 9,
            Key::Escape => 27,
            Key::Backspace => 8,
        }
    }

    /// Text produced by the key, if any.
    pub(crate) fn text(&self) -> Option<&'static str> {
        match self {
            Key::Enter => Some("\r"),
            Key::Tab => Some("\t"),
            _ => None,
        }
    }
}

/// A debuggable target as reported by `Target.getTargets`.
///
/// Page targets play the role of window handles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub browser_context_id: Option<String>,
}

impl TargetInfo {
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }
}

/// Scroll and viewport dimensions of a page, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    /// `document.body.scrollHeight`
    pub scroll_height: u32,
    /// `window.innerHeight`
    pub viewport_height: u32,
    /// `window.innerWidth`
    pub viewport_width: u32,
}

/// Scroll position of a page as seen after rendering.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollState {
    /// `document.readyState == "complete"`
    pub complete: bool,
    pub scroll_y: f64,
    pub scroll_height: f64,
    /// Visible height excluding any horizontal scrollbar.
    pub client_height: f64,
}

impl ScrollState {
    /// Where a scroll to `y` comes to rest: browsers stop at
    /// `scrollHeight - clientHeight`, not at `scrollHeight - innerHeight`.
    pub fn clamped_target(&self, y: u32) -> f64 {
        f64::from(y).min((self.scroll_height - self.client_height).max(0.0))
    }

    pub fn settled_at(&self, y: u32) -> bool {
        self.complete && (self.scroll_y - self.clamped_target(y)).abs() < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_info_parses_cdp_shape() {
        let info: TargetInfo = serde_json::from_value(json!({
            "targetId": "ABC",
            "type": "page",
            "title": "gotohui",
            "url": "https://population.gotohui.com/",
            "attached": false,
            "browserContextId": "CTX"
        }))
        .unwrap();
        assert!(info.is_page());
        assert_eq!(info.target_id, "ABC");
        assert_eq!(info.browser_context_id.as_deref(), Some("CTX"));
    }

    #[test]
    fn enter_key_carries_carriage_return() {
        assert_eq!(Key::Enter.key_code(), 13);
        assert_eq!(Key::Enter.text(), Some("\r"));
        assert_eq!(Key::Escape.text(), None);
    }

    fn scroll_state(scroll_y: f64, scroll_height: f64, client_height: f64) -> ScrollState {
        ScrollState {
            complete: true,
            scroll_y,
            scroll_height,
            client_height,
        }
    }

    #[test]
    fn last_scroll_clamps_to_client_height_with_horizontal_scrollbar() {
        // innerHeight 1000, but a 15px horizontal scrollbar leaves clientHeight 985.
        let state = scroll_state(1530.0, 2515.0, 985.0);
        assert_eq!(state.clamped_target(2000), 1530.0);
        assert!(state.settled_at(2000));
        assert!(!scroll_state(1515.0, 2515.0, 985.0).settled_at(2000));
    }

    #[test]
    fn unclamped_offsets_must_be_reached_exactly() {
        let state = scroll_state(1000.0, 2515.0, 985.0);
        assert_eq!(state.clamped_target(1000), 1000.0);
        assert!(state.settled_at(1000));
        assert!(!state.settled_at(0));
    }

    #[test]
    fn short_page_settles_at_top_once_loaded() {
        assert!(scroll_state(0.0, 400.0, 985.0).settled_at(0));
        let loading = ScrollState {
            complete: false,
            ..scroll_state(0.0, 400.0, 985.0)
        };
        assert!(!loading.settled_at(0));
    }

    #[test]
    fn scroll_state_parses_page_shape() {
        let state: ScrollState = serde_json::from_value(json!({
            "complete": true,
            "scrollY": 1530,
            "scrollHeight": 2515,
            "clientHeight": 985
        }))
        .unwrap();
        assert_eq!(state, scroll_state(1530.0, 2515.0, 985.0));
    }
}
