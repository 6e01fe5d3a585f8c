//! Project configuration accessor.
//!
//! Read-only view over `uvue.config.json`. Paths handed to generated code are
//! always forward-slash normalized, whatever the host separator is.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "uvue.config.json";
pub const DEFAULT_MAIN_PATH: &str = "src/main";

const ENTRY_EXTENSIONS: [&str; 2] = [".js", ".ts"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDeclaration {
    pub source_path: String,
    /// False for client-only imports
    pub ssr_eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDeclaration {
    pub module_path: String,
    pub options: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawImport {
    Path(String),
    Entry {
        src: String,
        #[serde(default = "default_ssr")]
        ssr: bool,
    },
}

fn default_ssr() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlugin {
    Path(String),
    WithOptions(String, Value),
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    main: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    imports: Vec<RawImport>,
    #[serde(default)]
    plugins: Vec<RawPlugin>,
}

impl From<RawImport> for ImportDeclaration {
    fn from(raw: RawImport) -> Self {
        match raw {
            RawImport::Path(src) => ImportDeclaration {
                source_path: to_slash(&src),
                ssr_eligible: true,
            },
            RawImport::Entry { src, ssr } => ImportDeclaration {
                source_path: to_slash(&src),
                ssr_eligible: ssr,
            },
        }
    }
}

impl From<RawPlugin> for PluginDeclaration {
    fn from(raw: RawPlugin) -> Self {
        match raw {
            RawPlugin::Path(path) => PluginDeclaration {
                module_path: to_slash(&path),
                options: Value::Object(Default::default()),
            },
            RawPlugin::WithOptions(path, options) => PluginDeclaration {
                module_path: to_slash(&path),
                options,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

/// Forward-slash form of a path, for embedding in generated source.
pub fn normalize_path(path: &Path) -> String {
    to_slash(&path.to_string_lossy())
}

fn clean_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    project_root: PathBuf,
    config_path: PathBuf,
    main_path: String,
    imports: Vec<ImportDeclaration>,
    plugins: Vec<PluginDeclaration>,
    raw: Value,
}

impl ProjectConfig {
    /// Load `<project_root>/uvue.config.json`. A missing file means defaults.
    pub fn load(project_root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let project_root = project_root.into();
        let text = fs::read_to_string(project_root.join(CONFIG_FILE));
        Self::from_file_contents(project_root, text)
    }

    /// `load` for async callers; the read goes through `tokio::fs`.
    pub async fn load_async(project_root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let project_root = project_root.into();
        let text = tokio::fs::read_to_string(project_root.join(CONFIG_FILE)).await;
        Self::from_file_contents(project_root, text)
    }

    fn from_file_contents(
        project_root: PathBuf,
        text: io::Result<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = project_root.join(CONFIG_FILE);

        let value = match text {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: normalize_path(&config_path),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Value::Object(Default::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: normalize_path(&config_path),
                    source,
                })
            }
        };

        Self::from_value(project_root, value)
    }

    /// A relative `project_root` is resolved against the working directory.
    pub fn from_value(project_root: impl Into<PathBuf>, value: Value) -> Result<Self, ConfigError> {
        let project_root = project_root.into();
        let project_root = std::path::absolute(&project_root)
            .map(|root| clean_path(&root))
            .map_err(|source| ConfigError::Io {
                path: normalize_path(&project_root),
                source,
            })?;
        let config_path = project_root.join(CONFIG_FILE);

        let raw: RawConfig =
            serde_json::from_value(value.clone()).map_err(|source| ConfigError::Parse {
                path: normalize_path(&config_path),
                source,
            })?;

        let main = raw
            .paths
            .main
            .unwrap_or_else(|| DEFAULT_MAIN_PATH.to_string());
        let main = ENTRY_EXTENSIONS
            .iter()
            .find_map(|ext| main.strip_suffix(*ext))
            .unwrap_or(&main);
        let main_path = normalize_path(&clean_path(&project_root.join(main)));

        Ok(Self {
            main_path,
            imports: raw.imports.into_iter().map(Into::into).collect(),
            plugins: raw.plugins.into_iter().map(Into::into).collect(),
            project_root,
            config_path,
            raw: value,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn project_path(&self) -> String {
        normalize_path(&self.project_root)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Absolute path of the application entry module, without extension.
    pub fn main_path(&self) -> &str {
        &self.main_path
    }

    pub fn imports(&self) -> &[ImportDeclaration] {
        &self.imports
    }

    pub fn plugins(&self) -> &[PluginDeclaration] {
        &self.plugins
    }

    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        clean_path(&self.project_root.join(relative))
    }

    /// Dotted lookup, e.g. `get("paths.main")`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.raw, |value, segment| value.get(segment))
    }

    pub fn server_config(&self, key: &str) -> Option<&Value> {
        self.get("server")?.get(key)
    }
}
