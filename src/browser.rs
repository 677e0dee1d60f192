mod config;
mod user_data_dir;

use anyhow::{Context, Result, anyhow};
use config::BrowserConfig;
use log::warn;
use regex::Regex;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::{Arc, Mutex};
use user_data_dir::UserDataDir;

use crate::tab::Tab;
use crate::transport::Transport;

const DEVTOOLS_LINE: &str = r"listening on (ws://\S+/devtools/browser/\S+)";

#[derive(Debug)]
struct Process {
    child: Child,
    _user_data_dir: UserDataDir,
}

/// A browser instance.
///
/// Owns the spawned Chrome process and its ephemeral profile directory.
/// Both are torn down by [`Browser::close`], or by `Drop` as a fallback
/// when a run bails out early.
#[derive(Debug)]
pub struct Browser {
    transport: Arc<Transport>,
    process: Mutex<Option<Process>>,
}

/// Builder for launching a [`Browser`].
#[derive(Debug, Default)]
pub struct BrowserBuilder {
    headless: Option<bool>,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run with a visible window when set to `false`. Defaults to headless.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    pub async fn build(self) -> Result<Browser> {
        let config = BrowserConfig::new(self.headless.unwrap_or(true))?;
        Browser::launch(config).await
    }
}

impl Browser {
    /// Create a new browser instance with default configuration (headless).
    pub async fn new() -> Result<Self> {
        BrowserBuilder::new().build().await
    }

    async fn launch(config: BrowserConfig) -> Result<Self> {
        let mut child = spawn_browser(&config)?;

        let transport = match Self::connect(&mut child).await {
            Ok(transport) => transport,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        Ok(Self {
            transport: Arc::new(transport),
            process: Mutex::new(Some(Process {
                child,
                _user_data_dir: config.user_data_dir,
            })),
        })
    }

    async fn connect(child: &mut Child) -> Result<Transport> {
        let stderr = child
            .stderr
            .take()
            .context("Failed to get stderr from the browser process")?;
        let ws_url = wait_for_ws_url(stderr).await?;
        Transport::new(&ws_url).await
    }

    pub async fn new_tab(&self) -> Result<Tab> {
        Tab::new(self.transport.clone()).await
    }

    /**
    Close the browser.
    */
    pub fn close(&self) -> Result<()> {
        // 1. Shutdown Transport
        self.transport.shutdown();

        // 2. Kill Process
        let mut process_guard = self
            .process
            .lock()
            .map_err(|_| anyhow!("Failed to lock browser process"))?;

        if let Some(mut process) = process_guard.take() {
            process
                .child
                .kill()
                .context("Failed to kill browser process")?;
            process
                .child
                .wait()
                .context("Failed to wait for browser process exit")?;
        }

        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Err(e) = self.close()
            && !e.to_string().contains("Failed to lock")
        {
            warn!("Error closing browser in Drop: {:?}", e);
        }
    }
}

fn spawn_browser(config: &BrowserConfig) -> Result<Child> {
    #[cfg(windows)]
    let mut cmd = {
        use std::os::windows::process::CommandExt;
        let mut cmd = Command::new(&config.executable_path);
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = Command::new(&config.executable_path);

    cmd.args(config.get_browser_args())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!(
                "Failed to spawn browser at {}",
                config.executable_path.display()
            )
        })
}

async fn wait_for_ws_url(stderr: ChildStderr) -> Result<String> {
    let reader = BufReader::new(stderr);
    tokio::task::spawn_blocking(move || {
        let re = Regex::new(DEVTOOLS_LINE)?;
        for line in reader.lines() {
            let line = line?;
            if let Some(cap) = re.captures(&line) {
                return Ok(cap[1].to_string());
            }
        }
        Err(anyhow!(
            "Browser exited without advertising a DevTools endpoint"
        ))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devtools_endpoint_is_scraped_from_stderr() {
        let re = Regex::new(DEVTOOLS_LINE).unwrap();
        let line = "DevTools listening on ws://127.0.0.1:8921/devtools/browser/8f2a6e61-6f8f-4b7c-a8e5-8f2d43b1f9f7";
        assert_eq!(
            &re.captures(line).unwrap()[1],
            "ws://127.0.0.1:8921/devtools/browser/8f2a6e61-6f8f-4b7c-a8e5-8f2d43b1f9f7"
        );
    }

    #[test]
    fn unrelated_stderr_lines_are_skipped() {
        let re = Regex::new(DEVTOOLS_LINE).unwrap();
        let line = "[1124/082031.491:ERROR:gpu_init.cc(523)] Passthrough is not supported";
        assert!(re.captures(line).is_none());
    }
}
