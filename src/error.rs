//! Error types for the search-and-capture workflow.
//!
//! The CDP plumbing (`browser`, `tab`, `element`) reports failures as
//! [`anyhow::Error`]. The workflow converts them into [`Error`] so callers can
//! tell a missing element from a failed navigation or capture and decide
//! whether to skip or retry.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A required element never appeared on the page.
    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    /// No search result link passed the matching rules.
    #[error("No search result link matches {target:?}")]
    LinkNotFound { target: String },

    /// Loading a page failed or the expected window never opened.
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A bounded wait ran out.
    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// The page reported dimensions that cannot be stitched.
    #[error("Invalid page dimensions: {0}")]
    InvalidPage(String),

    /// Scrolling or taking a viewport screenshot failed.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Decoding a capture or encoding the stitched image failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A UTC offset, in seconds, that chrono rejects.
    #[error("Invalid UTC offset: {0}s")]
    TimeZone(i32),

    /// A data type label outside the supported set.
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// Any other browser-automation failure.
    #[error(transparent)]
    Browser(#[from] anyhow::Error),
}

impl Error {
    /// Wraps a CDP failure that happened while capturing.
    pub(crate) fn capture(err: anyhow::Error) -> Self {
        Error::Capture(format!("{:#}", err))
    }

    pub(crate) fn navigation(url: &str, err: anyhow::Error) -> Self {
        Error::Navigation {
            url: url.to_string(),
            reason: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn navigation_keeps_the_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow!("net::ERR_NAME_NOT_RESOLVED")).context("Page.navigate");
        let err = Error::navigation("https://example.invalid/", err.unwrap_err());
        assert_eq!(
            err.to_string(),
            "Navigation to https://example.invalid/ failed: Page.navigate: net::ERR_NAME_NOT_RESOLVED"
        );
    }

    #[test]
    fn timeout_message_names_the_wait() {
        let err = Error::Timeout {
            what: "#searchkey".into(),
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "Timed out after 10s waiting for #searchkey");
    }
}
