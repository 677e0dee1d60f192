use anyhow::Result;
use log::warn;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ephemeral Chrome profile directory, deleted on drop.
#[derive(Debug)]
pub(crate) struct UserDataDir {
    path: PathBuf,
}

impl UserDataDir {
    pub(crate) fn new(prefix: &str) -> Result<Self> {
        let name = format!(
            "{}_{}_{}",
            prefix,
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            rand::thread_rng()
                .sample_iter(&rand::distributions::Alphanumeric)
                .take(6)
                .map(char::from)
                .collect::<String>()
        );
        let path = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UserDataDir {
    fn drop(&mut self) {
        // Chrome can hold profile files open for a moment after the kill.
        for _ in 0..3 {
            if std::fs::remove_dir_all(&self.path).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Failed to remove user data dir {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_dirs_are_created_and_removed() {
        let dir = UserDataDir::new("cdp-form-shot-test").unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());

        drop(dir);
        assert!(!path.exists());
    }
}
