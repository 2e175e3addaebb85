//! Configuration hot-reload support.
//!
//! Watches the config file and re-parses it on change. A failed parse keeps
//! the current configuration; a successful one is handed to the reload hook,
//! which is where the mux swaps in a freshly built rules snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::Config;
use crate::error::GantryResult;

/// Configuration manager with hot-reload support
pub struct ConfigManager {
    config_path: PathBuf,
    _watcher: Option<RecommendedWatcher>,
    #[allow(clippy::type_complexity)]
    reload_hook: Option<Arc<dyn Fn(&Config) + Send + Sync>>,
}

impl ConfigManager {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        ConfigManager {
            config_path: config_path.as_ref().to_path_buf(),
            _watcher: None,
            reload_hook: None,
        }
    }

    /// Set a callback to be invoked after a config reload succeeds
    pub fn set_reload_hook<F>(&mut self, hook: F)
    where
        F: Fn(&Config) + Send + Sync + 'static,
    {
        self.reload_hook = Some(Arc::new(hook));
    }

    /// Start watching for configuration file changes
    pub fn start_hot_reload(&mut self) -> GantryResult<()> {
        let (tx, mut rx) = mpsc::channel(100);
        let config_path = self.config_path.clone();
        let reload_hook = self.reload_hook.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(e) = tx.blocking_send(event) {
                        error!("Failed to send file change event: {}", e);
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        watcher.watch(&config_path, RecursiveMode::NonRecursive)?;
        if let Some(parent) = config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        info!("Started watching config file: {:?}", config_path);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_config_change(&event, &config_path, reload_hook.clone()).await;
            }
        });

        self._watcher = Some(watcher);
        Ok(())
    }

    /// Manually reload configuration from file
    pub async fn reload_config(&self) -> GantryResult<Config> {
        info!("Reloading configuration from {:?}", self.config_path);

        let config = Config::from_file(&self.config_path).await?;
        if let Some(hook) = &self.reload_hook {
            (hook)(&config);
        }
        Ok(config)
    }
}

/// Handle one configuration file change event
#[allow(clippy::type_complexity)]
async fn handle_config_change(
    event: &Event,
    config_path: &Path,
    reload_hook: Option<Arc<dyn Fn(&Config) + Send + Sync>>,
) {
    use notify::EventKind;

    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return;
    }

    let config_file_changed = event
        .paths
        .iter()
        .any(|path| path == config_path || (path.is_dir() && config_path.starts_with(path)));
    if !config_file_changed {
        return;
    }

    debug!("Config file change detected: {:?}", event);

    // Allow the file write to complete before parsing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    match Config::from_file(config_path).await {
        Ok(new_config) => {
            info!("Configuration hot-reloaded successfully");
            if let Some(hook) = reload_hook {
                (hook)(&new_config);
            }
        }
        Err(e) => {
            warn!("Failed to hot-reload configuration (keeping current): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_manual_reload_invokes_hook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            [router]
            cache_size = 16
            "#
        )
        .unwrap();

        let seen = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let observed = Arc::clone(&seen);

        let mut manager = ConfigManager::new(&path);
        manager.set_reload_hook(move |config| {
            assert_eq!(config.router.cache_size, 16);
            observed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let config = manager.reload_config().await.unwrap();
        assert_eq!(config.router.cache_size, 16);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manual_reload_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "not valid toml [[").unwrap();

        let manager = ConfigManager::new(&path);
        assert!(manager.reload_config().await.is_err());
    }
}
