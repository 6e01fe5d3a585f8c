use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    CreateError(#[from] notify::Error),

    #[error("Cannot watch {0}: not a file path")]
    InvalidPath(String),
}

pub type WatcherResult<T> = Result<T, WatcherError>;

/// Watches a single configuration file. The parent directory is watched
/// instead of the file so that the file may be created, replaced or deleted.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    receiver: UnboundedReceiver<notify::Result<Event>>,
    file_name: OsString,
}

impl ConfigWatcher {
    pub fn new(config_path: &Path) -> WatcherResult<Self> {
        let (directory, file_name) = match (config_path.parent(), config_path.file_name()) {
            (Some(directory), Some(file_name)) => (directory, file_name.to_os_string()),
            _ => {
                return Err(WatcherError::InvalidPath(
                    config_path.display().to_string(),
                ))
            }
        };

        let (tx, rx) = unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            file_name,
        })
    }

    /// Next event that touches the configuration file, or `None` once the
    /// underlying watcher is gone.
    pub async fn changed(&mut self) -> Option<Event> {
        while let Some(result) = self.receiver.recv().await {
            match result {
                Ok(event) if self.touches(&event) => return Some(event),
                Ok(_) => {}
                Err(e) => tracing::warn!("Config watcher error: {}", e),
            }
        }
        None
    }

    fn touches(&self, event: &Event) -> bool {
        // Reads of the config (we load it on every regeneration) are not changes
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }
}
