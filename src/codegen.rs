//! Codegen module for the uvue SSR build
//!
//! Generates the virtual main module (`node_modules/.uvue/main.js`). It
//! re-exports the application factory and pulls in the imports and plugins
//! declared in `uvue.config.json`. The module text is a pure function of the
//! configuration, and it is only written when it differs from the file on disk.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache;
use crate::config::{normalize_path, ConfigError, ImportDeclaration, ProjectConfig};

pub const DEPENDENCY_CACHE_DIR: &str = "node_modules";
pub const MAIN_MODULE_DIR: &str = ".uvue";
pub const MAIN_MODULE_FILE: &str = "main.js";

const PLUGIN_API_MODULE: &str = "@uvue/core";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to write main module {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

pub fn main_module_path(config: &ProjectConfig) -> PathBuf {
    config
        .project_root()
        .join(DEPENDENCY_CACHE_DIR)
        .join(MAIN_MODULE_DIR)
        .join(MAIN_MODULE_FILE)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE TEXT
// ═══════════════════════════════════════════════════════════════════════════════

pub fn generate_main_code(config: &ProjectConfig) -> String {
    let mut code = format!(
        "import createApp from {};\nexport {{ createApp }};\n",
        js_string(config.main_path())
    );

    let (normal, no_ssr): (Vec<&ImportDeclaration>, Vec<&ImportDeclaration>) = config
        .imports()
        .iter()
        .partition(|import| import.ssr_eligible);

    code.push_str(&format!("{}\n", require_lines(&normal)));
    code.push_str(&format!(
        "if (process.client) {{\n{}\n}}",
        require_lines(&no_ssr)
    ));

    if !config.plugins().is_empty() {
        code.push_str(&plugin_registrations(config));
    }

    code
}

fn require_lines(imports: &[&ImportDeclaration]) -> String {
    imports
        .iter()
        .map(|import| format!("require({});", js_string(&import.source_path)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plugin options are read back from the config module at runtime, indexed by
/// declaration order, so a bare `"foo"` and `["foo", {}]` emit the same text.
fn plugin_registrations(config: &ProjectConfig) -> String {
    let mut code = String::from("\n");
    code.push_str(&format!(
        "import UVue from {};\n",
        js_string(PLUGIN_API_MODULE)
    ));
    code.push_str(&format!(
        "import uvueConfig from {};\n",
        js_string(&normalize_path(config.config_path()))
    ));
    code.push_str(
        "const uvuePlugins = (uvueConfig.plugins || []).map(plugin => (typeof plugin === 'string' ? [plugin, {}] : plugin));\n",
    );
    code.push_str(
        "const interopDefault = module => (module && module.__esModule ? module.default : module);\n",
    );

    for (index, plugin) in config.plugins().iter().enumerate() {
        code.push_str(&format!(
            "UVue.use(interopDefault(require({})), uvuePlugins[{}][1]);\n",
            js_string(&plugin.module_path),
            index
        ));
    }

    code
}

fn js_string(s: &str) -> String {
    format!("\"{}\"", escape_js_string(s))
}

fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
}

// ═══════════════════════════════════════════════════════════════════════════════
// WRITE
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn write_main(config: &ProjectConfig) -> Result<WriteOutcome, GenerateError> {
    let main_path = main_module_path(config);
    let code = generate_main_code(config);

    if cache::is_current(&main_path, &code)
        .await
        .map_err(|source| io_error(&main_path, source))?
    {
        tracing::debug!("Main module {} is up to date", main_path.display());
        return Ok(WriteOutcome::Unchanged);
    }

    if let Some(dir) = main_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| io_error(dir, source))?;
    }
    tokio::fs::write(&main_path, code)
        .await
        .map_err(|source| io_error(&main_path, source))?;

    tracing::info!("Generated main module {}", main_path.display());
    Ok(WriteOutcome::Written)
}

fn io_error(path: &Path, source: io::Error) -> GenerateError {
    GenerateError::Io {
        path: normalize_path(path),
        source,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
