use anyhow::{Context, Result, anyhow};
use rand::prelude::SliceRandom;
use std::net;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use which::which;

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

static DEFAULT_ARGS: [&str; 12] = [
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-sync",
    "--disable-translate",
    "--disable-infobars",
    "--disable-notifications",
    "--metrics-recording-only",
    "--mute-audio",
];

/// Window size used in headless mode, where there is no screen to maximize to.
pub(crate) const HEADLESS_WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Launch switches chosen through [`crate::BrowserBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LaunchFlags {
    pub(crate) headless: bool,
    pub(crate) incognito: bool,
    pub(crate) maximized: bool,
    pub(crate) window_size: Option<(u32, u32)>,
}

impl Default for LaunchFlags {
    fn default() -> Self {
        Self {
            headless: false,
            incognito: true,
            maximized: true,
            window_size: None,
        }
    }
}

/// Everything needed to spawn one browser process.
pub(crate) struct BrowserConfig {
    pub(crate) debug_port: u16,
    pub(crate) flags: LaunchFlags,
    pub(crate) user_data_dir: TempDir,
    pub(crate) executable_path: PathBuf,
}

impl BrowserConfig {
    pub(crate) fn new(flags: LaunchFlags, executable: Option<PathBuf>) -> Result<Self> {
        let executable_path = match executable {
            Some(path) => path,
            None => default_executable()?,
        };

        Ok(Self {
            debug_port: get_available_port().context("Failed to get available port")?,
            user_data_dir: user_data_dir().context("Failed to create browser user data directory")?,
            executable_path,
            flags,
        })
    }

    pub(crate) fn get_browser_args(&self) -> Vec<String> {
        browser_args(&self.flags, self.debug_port, self.user_data_dir.path())
    }
}

pub(crate) fn browser_args(flags: &LaunchFlags, port: u16, user_data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", port),
        format!("--user-data-dir={}", user_data_dir.display()),
    ];
    args.extend(DEFAULT_ARGS.iter().map(|s| s.to_string()));

    if flags.incognito {
        args.push("--incognito".to_string());
    }
    if flags.headless {
        args.push("--headless=new".to_string());
    }

    let size = match (flags.window_size, flags.headless) {
        (Some(size), _) => Some(size),
        (None, true) => Some(HEADLESS_WINDOW_SIZE),
        (None, false) => None,
    };
    if let Some((w, h)) = size {
        args.push(format!("--window-size={},{}", w, h));
    }
    if flags.maximized && !flags.headless {
        args.push("--start-maximized".to_string());
    }

    args
}

/// Profile directory under `./temp`, removed when dropped.
fn user_data_dir() -> Result<TempDir> {
    let base = std::env::current_dir()?.join("temp");
    std::fs::create_dir_all(&base)?;
    Ok(tempfile::Builder::new()
        .prefix("gotohui-shot-")
        .tempdir_in(base)?)
}

fn default_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME")
        && Path::new(&path).exists()
    {
        return Ok(path.into());
    }

    let apps = [
        "google-chrome-stable",
        "google-chrome",
        "chromium",
        "chromium-browser",
        "microsoft-edge-stable",
        "chrome",
        "msedge",
        "microsoft-edge",
    ];
    for app in apps {
        if let Ok(path) = which(app) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let macos_apps = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        for path in macos_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = get_chrome_path_from_registry().filter(|p| p.exists()) {
            return Ok(path);
        }

        let windows_apps = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for path in windows_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    Err(anyhow!("Could not auto detect a chrome executable. Set CHROME env var."))
}

#[cfg(windows)]
fn get_chrome_path_from_registry() -> Option<PathBuf> {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey("SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths\\chrome.exe")
        .and_then(|key| key.get_value::<String, _>(""))
        .map(PathBuf::from)
        .ok()
}

fn get_available_port() -> Option<u16> {
    let mut ports: Vec<u16> = (8000..9000).collect();
    ports.shuffle(&mut rand::thread_rng());
    ports.iter().find(|port| port_is_available(**port)).copied()
}

fn port_is_available(port: u16) -> bool {
    net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(args: &[String], flag: &str) -> bool {
        args.iter().any(|a| a == flag)
    }

    #[test]
    fn default_flags_are_visible_incognito_maximized() {
        let args = browser_args(&LaunchFlags::default(), 8123, Path::new("/tmp/profile"));
        assert_eq!(args[0], "--remote-debugging-port=8123");
        assert_eq!(args[1], "--user-data-dir=/tmp/profile");
        assert!(has(&args, "--incognito"));
        assert!(has(&args, "--start-maximized"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.iter().any(|a| a.starts_with("--window-size")));
    }

    #[test]
    fn headless_gets_a_fixed_window_instead_of_maximize() {
        let flags = LaunchFlags {
            headless: true,
            ..Default::default()
        };
        let args = browser_args(&flags, 8000, Path::new("p"));
        assert!(has(&args, "--headless=new"));
        assert!(has(&args, "--window-size=1920,1080"));
        assert!(!has(&args, "--start-maximized"));
    }

    #[test]
    fn explicit_window_size_wins() {
        let flags = LaunchFlags {
            incognito: false,
            maximized: false,
            window_size: Some((1280, 720)),
            ..Default::default()
        };
        let args = browser_args(&flags, 8000, Path::new("p"));
        assert!(has(&args, "--window-size=1280,720"));
        assert!(!has(&args, "--incognito"));
        assert!(!has(&args, "--start-maximized"));
    }

    #[test]
    fn found_port_is_bindable_range() {
        let port = get_available_port().unwrap();
        assert!((8000..9000).contains(&port));
    }
}
