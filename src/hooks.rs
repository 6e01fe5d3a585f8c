//! Plugin hook dispatch.
//!
//! uvue plugins may export build-time hooks named after the emit phases
//! (`webpackEmit`, `webpackAfterEmit`). Here a plugin's build-time side is a
//! `PluginModule` registered under its module path; every hook method defaults
//! to a no-op, so a plugin that lacks one is skipped.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::PluginDeclaration;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("Plugin '{plugin}' failed in {hook}: {message}")]
    Hook {
        plugin: String,
        hook: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginHook {
    WebpackEmit,
    WebpackAfterEmit,
}

impl PluginHook {
    /// Export name a plugin module uses for this hook.
    pub fn export_name(self) -> &'static str {
        match self {
            PluginHook::WebpackEmit => "webpackEmit",
            PluginHook::WebpackAfterEmit => "webpackAfterEmit",
        }
    }
}

impl fmt::Display for PluginHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.export_name())
    }
}

/// Compilation state shared by every hook of one emit phase.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub output_path: PathBuf,
    pub assets: BTreeMap<String, String>,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait PluginModule: Send + Sync {
    async fn webpack_emit(
        &self,
        _compilation: &mut Compilation,
        _options: &Value,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn webpack_after_emit(
        &self,
        _compilation: &mut Compilation,
        _options: &Value,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    modules: HashMap<String, Arc<dyn PluginModule>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module_path: impl Into<String>, module: impl PluginModule + 'static) {
        self.modules.insert(module_path.into(), Arc::new(module));
    }

    pub fn resolve(&self, module_path: &str) -> Option<Arc<dyn PluginModule>> {
        self.modules.get(module_path).cloned()
    }

    /// Run `hook` for every declared plugin, one at a time, in declaration
    /// order. The first failure stops the dispatch.
    pub async fn call_plugins_hooks(
        &self,
        hook: PluginHook,
        compilation: &mut Compilation,
        plugins: &[PluginDeclaration],
    ) -> Result<(), PluginError> {
        for plugin in plugins {
            let Some(module) = self.resolve(&plugin.module_path) else {
                tracing::debug!(
                    "Plugin {} has no build-time module, skipping {}",
                    plugin.module_path,
                    hook
                );
                continue;
            };

            let result = match hook {
                PluginHook::WebpackEmit => module.webpack_emit(compilation, &plugin.options).await,
                PluginHook::WebpackAfterEmit => {
                    module
                        .webpack_after_emit(compilation, &plugin.options)
                        .await
                }
            };

            result.map_err(|e| PluginError::Hook {
                plugin: plugin.module_path.clone(),
                hook: hook.export_name(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PluginModule for Recorder {
        async fn webpack_emit(
            &self,
            _compilation: &mut Compilation,
            _options: &Value,
        ) -> Result<(), PluginError> {
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(self.name.to_string());
            Ok(())
        }
    }

    struct AssetWriter;

    #[async_trait]
    impl PluginModule for AssetWriter {
        async fn webpack_after_emit(
            &self,
            compilation: &mut Compilation,
            options: &Value,
        ) -> Result<(), PluginError> {
            let file = options["file"].as_str().unwrap_or("default.txt");
            compilation.assets.insert(file.to_string(), "ok".to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl PluginModule for Failing {
        async fn webpack_emit(
            &self,
            _compilation: &mut Compilation,
            _options: &Value,
        ) -> Result<(), PluginError> {
            Err(PluginError::Failed("boom".to_string()))
        }
    }

    fn declare(path: &str, options: Value) -> PluginDeclaration {
        PluginDeclaration {
            module_path: path.to_string(),
            options,
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_declared_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register("B", Recorder { name: "B", log: log.clone() });
        registry.register("A", Recorder { name: "A", log: log.clone() });

        let plugins = vec![declare("A", json!({})), declare("B", json!({}))];
        let mut compilation = Compilation::default();
        registry
            .call_plugins_hooks(PluginHook::WebpackEmit, &mut compilation, &plugins)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_hooks_and_modules_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register("A", Recorder { name: "A", log: log.clone() });

        let plugins = vec![declare("runtime-only", json!({})), declare("A", json!({}))];
        let mut compilation = Compilation::default();
        registry
            .call_plugins_hooks(PluginHook::WebpackAfterEmit, &mut compilation, &plugins)
            .await
            .unwrap();
        assert!(log.lock().unwrap().is_empty());

        registry
            .call_plugins_hooks(PluginHook::WebpackEmit, &mut compilation, &plugins)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_options_reach_the_hook() {
        let mut registry = PluginRegistry::new();
        registry.register("writer", AssetWriter);

        let plugins = vec![declare("writer", json!({ "file": "report.json" }))];
        let mut compilation = Compilation::default();
        registry
            .call_plugins_hooks(PluginHook::WebpackAfterEmit, &mut compilation, &plugins)
            .await
            .unwrap();
        assert_eq!(compilation.assets.get("report.json"), Some(&"ok".to_string()));
    }

    #[tokio::test]
    async fn test_failure_stops_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register("failing", Failing);
        registry.register("after", Recorder { name: "after", log: log.clone() });

        let plugins = vec![declare("failing", json!({})), declare("after", json!({}))];
        let mut compilation = Compilation::default();
        let err = registry
            .call_plugins_hooks(PluginHook::WebpackEmit, &mut compilation, &plugins)
            .await
            .unwrap_err();

        match err {
            PluginError::Hook { plugin, hook, message } => {
                assert_eq!(plugin, "failing");
                assert_eq!(hook, "webpackEmit");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_hook_names() {
        assert_eq!(PluginHook::WebpackEmit.export_name(), "webpackEmit");
        assert_eq!(PluginHook::WebpackAfterEmit.to_string(), "webpackAfterEmit");
    }
}
