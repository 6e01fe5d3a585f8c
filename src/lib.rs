//! # uvue SSR Build Pipeline
//!
//! ## Pipeline Invariants
//!
//! 1. **Generated Main Module**: `node_modules/.uvue/main.js` is derived from
//!    `uvue.config.json` alone. It is rewritten only when its content hash
//!    differs from the freshly generated text.
//!
//! 2. **Bootstrap Link**: `@uvue/core/client.js` and `@uvue/core/server.js`
//!    import the generated main module, never the user entry directly.
//!
//! 3. **Entry Rewrite**: the first `new Vue(...)` under the user entry's
//!    default export becomes `initApp(options, context)`, and the exported
//!    factory takes `context` as its only parameter.
//!    - `new Vue({ el })` → `initApp({ el }, context)`
//!    - `new Vue` → `initApp({}, context)`
//!
//! 4. **Pass-through**: any module that is not a bootstrap file or the user
//!    entry, or an entry without the expected shape, is emitted unchanged.
//!
//! 5. **Hook Order**: plugin hooks run one at a time, in declaration order.
//!    A failing hook fails the build phase.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod cache;
pub mod codegen;
pub mod config;
pub mod hooks;
pub mod lifecycle;
pub mod loader;
pub mod query;
pub mod watcher;

#[cfg(test)]
mod lifecycle_tests;

pub use codegen::{generate_main_code, main_module_path, write_main, WriteOutcome};
pub use config::{ImportDeclaration, PluginDeclaration, ProjectConfig};
pub use hooks::{Compilation, PluginHook, PluginModule, PluginRegistry};
pub use lifecycle::{BuildEvent, BuildLifecycleEvent, LifecycleState, StateHandle, UVuePlugin};
pub use loader::{run_loader, transform_module, ModuleSource, ResourceClassification};
pub use query::{Fragment, NodeHandle, NodeKind, Selector, SourceDocument};

#[cfg(feature = "napi")]
#[napi]
pub fn transform_module_native(
    project_root: String,
    resource_path: String,
    content: String,
) -> napi::Result<String> {
    let config = ProjectConfig::load(&project_root)
        .map_err(|e| napi::Error::from_reason(format!("Config error: {}", e)))?;
    transform_module(&resource_path, &content, &config)
        .map_err(|e| napi::Error::from_reason(format!("Transform error: {}", e)))
}

#[cfg(feature = "napi")]
#[napi]
pub fn generate_main_native(project_root: String) -> napi::Result<String> {
    let config = ProjectConfig::load(&project_root)
        .map_err(|e| napi::Error::from_reason(format!("Config error: {}", e)))?;
    Ok(generate_main_code(&config))
}

/// Returns `true` when the main module was written, `false` when it was
/// already current.
#[cfg(feature = "napi")]
#[napi]
pub async fn write_main_native(project_root: String) -> napi::Result<bool> {
    let config = ProjectConfig::load_async(&project_root)
        .await
        .map_err(|e| napi::Error::from_reason(format!("Config error: {}", e)))?;
    let outcome = write_main(&config)
        .await
        .map_err(|e| napi::Error::from_reason(format!("Write error: {}", e)))?;
    Ok(outcome == WriteOutcome::Written)
}
