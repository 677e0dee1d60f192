use anyhow::{Context, Result, anyhow};
use rand::prelude::SliceRandom;
use std::net;
use std::path::{Path, PathBuf};
use which::which;

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

use crate::browser::user_data_dir::UserDataDir;

pub(crate) struct BrowserConfig {
    debug_port: u16,
    pub(crate) headless: bool,
    pub(crate) user_data_dir: UserDataDir,
    pub(crate) executable_path: PathBuf,
}

impl BrowserConfig {
    pub(crate) fn new(headless: bool) -> Result<Self> {
        Ok(Self {
            headless,
            executable_path: default_executable()?,
            debug_port: get_available_port().context("Failed to get available port")?,
            user_data_dir: UserDataDir::new("cdp-form-shot")
                .context("Failed to create user data directory")?,
        })
    }

    pub(crate) fn get_browser_args(&self) -> Vec<String> {
        launch_args(self.debug_port, self.user_data_dir.path(), self.headless)
    }
}

fn launch_args(debug_port: u16, user_data_dir: &Path, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={debug_port}"),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--no-sandbox".into(),
        "--disable-gpu".into(),
        "--disable-dev-shm-usage".into(),
        "--disable-background-networking".into(),
        "--disable-extensions".into(),
        "--disable-sync".into(),
        "--mute-audio".into(),
        "--hide-scrollbars".into(),
        "--window-size=1280,720".into(),
    ];

    if headless {
        args.push("--headless=new".into());
    }

    args
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

    Err(anyhow!(
        "Could not auto detect a chrome executable; set the CHROME environment variable"
    ))
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

    #[test]
    fn launch_args_wire_up_port_and_profile() {
        let args = launch_args(8444, Path::new("/tmp/profile"), true);
        assert!(args.contains(&"--remote-debugging-port=8444".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn headed_runs_drop_the_headless_flag() {
        let args = launch_args(8444, Path::new("/tmp/profile"), false);
        assert!(!args.iter().any(|arg| arg.starts_with("--headless")));
    }

    #[test]
    fn picked_ports_are_in_the_devtools_range() {
        let port = get_available_port().unwrap();
        assert!((8000..9000).contains(&port));
    }
}
