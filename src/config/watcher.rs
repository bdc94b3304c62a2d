//! Config file watcher for hot reload
//!
//! Watches the directory holding the config file rather than the file
//! itself: many editors save by writing a temp file and renaming it over the
//! original, which a watch on the old inode would miss.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Wait after the first event so a burst of writes becomes one reload
const SETTLE_DELAY: Duration = Duration::from_millis(100);

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load the config once and start watching it for changes.
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<(Self, Arc<AppConfig>)> {
        let config_path: PathBuf = config_path.into();
        let initial = AppConfig::load(&config_path.to_string_lossy())
            .await
            .context("Failed to load initial config")?;

        let (tx, rx) = mpsc::channel(4);
        let file_name = config_path
            .file_name()
            .map(|n| n.to_os_string())
            .with_context(|| format!("Config path has no file name: {}", config_path.display()))?;
        let dir = match config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify calls back on its own thread, outside the runtime
        let runtime = tokio::runtime::Handle::current();
        let reload_pending = Arc::new(AtomicBool::new(false));
        let path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Config watch error: {}", e);
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            if !event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                return;
            }
            if reload_pending.swap(true, Ordering::SeqCst) {
                return;
            }

            debug!("Config file changed: {:?}", event.kind);
            let tx = tx.clone();
            let path = path.clone();
            let reload_pending = Arc::clone(&reload_pending);
            runtime.spawn(async move {
                tokio::time::sleep(SETTLE_DELAY).await;
                reload_pending.store(false, Ordering::SeqCst);
                reload(&path, &tx).await;
            });
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        info!("👀 Watching {} for changes", config_path.display());

        Ok((Self { _watcher: watcher, rx }, Arc::new(initial)))
    }

    /// Next successfully parsed config. `None` once the watcher is gone.
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

async fn reload(path: &Path, tx: &mpsc::Sender<AppConfig>) {
    match AppConfig::load(&path.to_string_lossy()).await {
        Ok(config) => {
            info!("🔄 Configuration reloaded");
            if tx.send(config).await.is_err() {
                debug!("Config receiver dropped");
            }
        }
        Err(e) => warn!("Config reload failed, keeping the current one: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizationPolicy;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reload_on_write() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("pointer.yaml");
        fs::write(&path, "normalizer:\n  policy: delta_from_baseline\n")?;

        let (mut watcher, config) = ConfigWatcher::new(&path).await?;
        assert_eq!(config.normalizer.policy, NormalizationPolicy::default());

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "normalizer:\n  policy: absolute_range\n  precision: 2\n")?;

        let reloaded = tokio::time::timeout(Duration::from_secs(3), watcher.next_config())
            .await?
            .expect("watcher closed");
        assert_eq!(reloaded.normalizer.policy, NormalizationPolicy::AbsoluteRange);
        assert_eq!(reloaded.normalizer.precision, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_watching() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("pointer.yaml");
        fs::write(&path, "publish:\n  fps: 60\n")?;

        let (mut watcher, _) = ConfigWatcher::new(&path).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "publish:\n  fps: 0\n")?;
        tokio::time::sleep(Duration::from_millis(400)).await;
        fs::write(&path, "publish:\n  fps: 30\n")?;

        let reloaded = tokio::time::timeout(Duration::from_secs(3), watcher.next_config())
            .await?
            .expect("watcher closed");
        assert_eq!(reloaded.publish.fps, 30);
        Ok(())
    }

    #[tokio::test]
    async fn test_other_files_are_ignored() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("pointer.yaml");
        fs::write(&path, "{}")?;

        let (mut watcher, _) = ConfigWatcher::new(&path).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(dir.path().join("notes.txt"), "hello")?;

        let result = tokio::time::timeout(Duration::from_millis(500), watcher.next_config()).await;
        assert!(result.is_err());
        Ok(())
    }
}
