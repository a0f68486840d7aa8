use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time;

use super::browser_config::BrowserConfig;

const WS_URL_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn spawn_chrome_process(config: &BrowserConfig) -> Result<Child> {
    #[cfg(windows)]
    let mut cmd = {
        use std::os::windows::process::CommandExt;
        let mut c = Command::new(&config.executable_path);
        c.creation_flags(0x08000000); // CREATE_NO_WINDOW
        c
    };
    #[cfg(not(windows))]
    let mut cmd = Command::new(&config.executable_path);

    log::debug!("Launching {}", config.executable_path.display());
    cmd.args(config.get_browser_args())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to launch {}", config.executable_path.display()))
}

/// Scans `line` for the DevTools WebSocket endpoint Chrome prints at startup.
pub(crate) fn parse_ws_url(re: &Regex, line: &str) -> Option<String> {
    re.captures(line).map(|cap| cap[1].to_string())
}

fn ws_url_regex() -> Result<Regex> {
    Ok(Regex::new(r"listening on (ws://\S+/devtools/browser/\S+)")?)
}

/// Reads browser stderr to extract the WebSocket debugging URL.
///
/// The reader thread keeps draining stderr afterwards so the browser never
/// blocks on a full pipe.
pub(crate) async fn get_websocket_url(stderr: ChildStderr) -> Result<String> {
    let re = ws_url_regex()?;
    let (tx, rx) = oneshot::channel();

    std::thread::spawn(move || {
        let mut tx = Some(tx);
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            if let Some(url) = parse_ws_url(&re, &line) {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(url);
                }
            } else if tx.is_none() {
                log::trace!("chrome: {}", line);
            }
        }
    });

    time::timeout(WS_URL_TIMEOUT, rx)
        .await
        .map_err(|_| anyhow!("Timeout waiting for DevTools URL on browser stderr"))?
        .map_err(|_| anyhow!("Browser exited before printing a DevTools URL"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_devtools_url_from_banner() {
        let re = ws_url_regex().unwrap();
        let line = "DevTools listening on ws://127.0.0.1:8123/devtools/browser/3f1c-aa";
        assert_eq!(
            parse_ws_url(&re, line).as_deref(),
            Some("ws://127.0.0.1:8123/devtools/browser/3f1c-aa")
        );
        assert_eq!(parse_ws_url(&re, "[1234:ERROR] something else"), None);
    }
}
