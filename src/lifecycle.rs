//! Build lifecycle binding.
//!
//! `UVuePlugin` reacts to the host build's events:
//!
//! - `Run`: regenerate the main module before compilation.
//! - `WatchRun`: on first use, start watching `uvue.config.json` so every edit
//!   regenerates the main module; then regenerate.
//! - `Emit` / `AfterEmit`: run the matching plugin hooks, sequentially.
//!
//! Configuration is reloaded from disk on every event, so edits picked up by
//! the watcher are visible to the next build without restarting.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::codegen::{self, GenerateError, WriteOutcome};
use crate::config::{ConfigError, ProjectConfig, CONFIG_FILE};
use crate::hooks::{Compilation, PluginError, PluginHook, PluginRegistry};
use crate::loader::{self, ModuleSource};
use crate::query::QueryError;
use crate::watcher::{ConfigWatcher, WatcherError};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Transform(#[from] QueryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildLifecycleEvent {
    Run,
    WatchRun,
    Emit,
    AfterEmit,
}

/// A lifecycle event as delivered by the host, with its compilation where the
/// phase has one.
#[derive(Debug)]
pub enum BuildEvent<'c> {
    Run,
    WatchRun,
    Emit(&'c mut Compilation),
    AfterEmit(&'c mut Compilation),
}

impl BuildEvent<'_> {
    pub fn lifecycle_event(&self) -> BuildLifecycleEvent {
        match self {
            BuildEvent::Run => BuildLifecycleEvent::Run,
            BuildEvent::WatchRun => BuildLifecycleEvent::WatchRun,
            BuildEvent::Emit(_) => BuildLifecycleEvent::Emit,
            BuildEvent::AfterEmit(_) => BuildLifecycleEvent::AfterEmit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Generating,
}

/// Shared view of the lifecycle state. Builds and the watcher task both
/// regenerate through it, so it reads `Generating` while either is writing.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    generating: Arc<AtomicUsize>,
}

impl StateHandle {
    pub fn get(&self) -> LifecycleState {
        if self.generating.load(Ordering::SeqCst) > 0 {
            LifecycleState::Generating
        } else {
            LifecycleState::Idle
        }
    }

    fn enter(&self) -> GenerationGuard {
        self.generating.fetch_add(1, Ordering::SeqCst);
        GenerationGuard {
            state: self.clone(),
        }
    }
}

struct GenerationGuard {
    state: StateHandle,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.state.generating.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct UVuePlugin {
    project_root: PathBuf,
    registry: PluginRegistry,
    state: StateHandle,
    watcher: Option<JoinHandle<()>>,
}

impl UVuePlugin {
    pub fn new(project_root: impl Into<PathBuf>, registry: PluginRegistry) -> Self {
        Self {
            project_root: project_root.into(),
            registry,
            state: StateHandle::default(),
            watcher: None,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn config(&self) -> Result<ProjectConfig, ConfigError> {
        ProjectConfig::load(&self.project_root)
    }

    pub async fn handle(&mut self, event: BuildEvent<'_>) -> Result<(), LifecycleError> {
        tracing::debug!("uvue lifecycle event {:?}", event.lifecycle_event());

        match event {
            BuildEvent::Run => {
                self.write_main().await?;
            }
            BuildEvent::WatchRun => {
                if self.watcher.is_none() {
                    self.watch_config()?;
                }
                self.write_main().await?;
            }
            BuildEvent::Emit(compilation) => {
                self.call_plugins_hooks(PluginHook::WebpackEmit, compilation)
                    .await?;
            }
            BuildEvent::AfterEmit(compilation) => {
                self.call_plugins_hooks(PluginHook::WebpackAfterEmit, compilation)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn write_main(&self) -> Result<WriteOutcome, LifecycleError> {
        Ok(regenerate(&self.project_root, &self.state).await?)
    }

    pub async fn call_plugins_hooks(
        &self,
        hook: PluginHook,
        compilation: &mut Compilation,
    ) -> Result<(), LifecycleError> {
        let config = ProjectConfig::load_async(&self.project_root).await?;
        self.registry
            .call_plugins_hooks(hook, compilation, config.plugins())
            .await?;
        Ok(())
    }

    /// Per-module transform hook.
    pub fn transform_module(
        &self,
        resource_path: &str,
        source: ModuleSource,
    ) -> Result<ModuleSource, LifecycleError> {
        let config = self.config()?;
        Ok(loader::run_loader(resource_path, source, &config)?)
    }

    fn watch_config(&mut self) -> Result<(), LifecycleError> {
        let mut watcher = ConfigWatcher::new(&self.project_root.join(CONFIG_FILE))?;
        let project_root = self.project_root.clone();
        let state = self.state.clone();

        // Not synchronized with builds in flight; the next watchRun converges
        self.watcher = Some(tokio::spawn(async move {
            while watcher.changed().await.is_some() {
                if let Err(e) = regenerate(&project_root, &state).await {
                    tracing::error!("Failed to regenerate main module: {}", e);
                }
            }
        }));
        tracing::info!("Watching {} for changes", CONFIG_FILE);
        Ok(())
    }
}

impl Drop for UVuePlugin {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.take() {
            handle.abort();
        }
    }
}

async fn regenerate(
    project_root: &Path,
    state: &StateHandle,
) -> Result<WriteOutcome, GenerateError> {
    let _generating = state.enter();
    let config = ProjectConfig::load_async(project_root).await?;
    codegen::write_main(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_reads_generating_while_guard_is_held() {
        let plugin = UVuePlugin::new("/project", PluginRegistry::new());
        let handle = plugin.state_handle();
        assert_eq!(plugin.state(), LifecycleState::Idle);

        let outer = handle.enter();
        let inner = handle.enter();
        assert_eq!(plugin.state(), LifecycleState::Generating);

        drop(inner);
        assert_eq!(plugin.state(), LifecycleState::Generating);
        drop(outer);
        assert_eq!(plugin.state(), LifecycleState::Idle);
    }
}
