use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use which::which;

/// Configuration for launching (or attaching to) the browser behind [`crate::ChromiumDriver`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CdpConfig {
    /// Chrome/Chromium binary. Detected from `TABFLOW_CHROME`, `PATH` and the usual
    /// install locations when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Attach to an already running browser instead of launching one.
    pub websocket_url: Option<String>,
    pub window_size: Option<(u32, u32)>,
    /// Upper bound for single driver operations that take no explicit timeout.
    pub default_deadline_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable(),
            headless: resolve_headless_default(),
            websocket_url: None,
            window_size: None,
            default_deadline_ms: 30_000,
        }
    }
}

fn resolve_headless_default() -> bool {
    // "0", "false", "no", "off" mean headful
    match env::var("TABFLOW_HEADLESS") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            !matches!(lower.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("TABFLOW_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "microsoft-edge",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/snap/bin/chromium"),
        ]
    }
}
