//! Loader Module
//!
//! Per-module transform, applied to every module as it enters compilation.
//!
//! ## Classification
//!
//! 1. **Library bootstrap** (`@uvue/core/client.js`, `@uvue/core/server.js`):
//!    the `./main` import is pointed at the generated main module.
//! 2. **User entry module** (`<paths.main>.js` or `.ts`): the default-exported
//!    factory is rewritten to take a per-request `context` and to build its
//!    root instance through `initApp(options, context)` instead of `new Vue`.
//! 3. Anything else passes through untouched.
//!
//! An entry module without the expected shape (no default export, or no
//! `new Vue(...)` under it) is returned character-for-character unchanged.

use lazy_static::lazy_static;
use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codegen::main_module_path;
use crate::config::{normalize_path, ProjectConfig};
use crate::query::{Fragment, NodeHandle, NodeKind, QueryError, Selector, SourceDocument};

pub const INIT_APP_IMPORT: &str = "import initApp from '@uvue/core/lib/initApp';\n";

const INIT_APP_FN: &str = "initApp";
const CONTEXT_PARAM: &str = "context";
const APP_CLASS: &str = "Vue";
const MAIN_IMPORT_TOKEN: &str = "./main";
const EMPTY_APP_OPTIONS: &str = "{}";
const ENTRY_EXTENSIONS: [&str; 2] = ["js", "ts"];

lazy_static! {
    static ref BOOTSTRAP_RE: Regex =
        Regex::new(r"(?:^|/)@uvue/core/(?:client|server)\.js$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceClassification {
    LibraryBootstrap,
    UserEntryModule,
    Unrelated,
}

/// The `(content, sourceMap, meta)` triple a loader receives and returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSource {
    pub content: String,
    #[serde(default)]
    pub source_map: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

impl ModuleSource {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

pub fn classify(resource_path: &str, config: &ProjectConfig) -> ResourceClassification {
    let resource_path = resource_path.replace('\\', "/");

    if BOOTSTRAP_RE.is_match(&resource_path) {
        return ResourceClassification::LibraryBootstrap;
    }

    let main_path = config.main_path();
    if ENTRY_EXTENSIONS
        .iter()
        .any(|ext| resource_path == format!("{}.{}", main_path, ext))
    {
        return ResourceClassification::UserEntryModule;
    }

    ResourceClassification::Unrelated
}

/// Loader entry point. The source map and meta pass through as they are.
pub fn run_loader(
    resource_path: &str,
    source: ModuleSource,
    config: &ProjectConfig,
) -> Result<ModuleSource, QueryError> {
    let content = transform_module(resource_path, &source.content, config)?;
    Ok(ModuleSource { content, ..source })
}

pub fn transform_module(
    resource_path: &str,
    content: &str,
    config: &ProjectConfig,
) -> Result<String, QueryError> {
    match classify(resource_path, config) {
        ResourceClassification::LibraryBootstrap => {
            tracing::debug!("Linking bootstrap {} to generated main", resource_path);
            Ok(rewrite_bootstrap(content, config))
        }
        ResourceClassification::UserEntryModule => {
            tracing::debug!("Rewriting entry module {}", resource_path);
            rewrite_entry_module(content, source_type_for(resource_path))
        }
        ResourceClassification::Unrelated => Ok(content.to_string()),
    }
}

fn source_type_for(resource_path: &str) -> SourceType {
    let source_type = SourceType::default().with_module(true);
    if resource_path.ends_with(".ts") {
        source_type.with_typescript(true)
    } else {
        source_type.with_jsx(true)
    }
}

pub fn rewrite_bootstrap(content: &str, config: &ProjectConfig) -> String {
    let main_module = normalize_path(&main_module_path(config));
    content.replacen(MAIN_IMPORT_TOKEN, &main_module, 1)
}

/// Rewrites the root `new Vue(...)` under the default export to
/// `initApp(options, context)`. `context` is declared only when the export is
/// a function or arrow; for an object or class export the call refers to an
/// outer `context` binding.
pub fn rewrite_entry_module(content: &str, source_type: SourceType) -> Result<String, QueryError> {
    let mut doc = SourceDocument::parse_with(content, source_type)?;

    let Some(export_default) = doc.find_one(&Selector::Kind(NodeKind::ExportDefault)) else {
        return Ok(content.to_string());
    };

    let params = match exported_declaration(&doc, export_default)? {
        Some(declaration) => declaration_params(&doc, declaration)?,
        None => None,
    };

    // `new Vue` in a default parameter value is not the root instance
    let app_selector = Selector::NewExpression(APP_CLASS.to_string());
    let mut new_app = None;
    for candidate in doc.find_in(export_default, &app_selector)? {
        let in_params = match params {
            Some(params) => doc.contains(params, candidate)?,
            None => false,
        };
        if !in_params {
            new_app = Some(candidate);
            break;
        }
    }
    let Some(new_app) = new_app else {
        return Ok(content.to_string());
    };

    let app_options = match doc.arguments(new_app)?.into_iter().next() {
        Some(options) => Fragment::Node(options),
        None => Fragment::parse_expression(EMPTY_APP_OPTIONS)?,
    };
    let init_app = Fragment::call(
        Fragment::identifier(INIT_APP_FN)?,
        vec![app_options, Fragment::identifier(CONTEXT_PARAM)?],
    );
    doc.replace(new_app, init_app)?;

    if let Some(params) = params {
        let context = Fragment::identifier(CONTEXT_PARAM)?;
        let replacement = if doc.text(params)?.starts_with('(') {
            Fragment::params(vec![context])
        } else {
            context
        };
        doc.replace(params, replacement)?;
    }

    Ok(format!("{}{}", INIT_APP_IMPORT, doc.print()))
}

/// The node directly exported by `export default`, looking through
/// parentheses and wrapper nodes that share its span.
fn exported_declaration(
    doc: &SourceDocument,
    export_default: NodeHandle,
) -> Result<Option<NodeHandle>, QueryError> {
    let Some(mut current) = doc.children(export_default)?.into_iter().next() else {
        return Ok(None);
    };

    loop {
        let see_through = match doc.kind(current)? {
            NodeKind::Parenthesized => true,
            NodeKind::Other => false,
            _ => break,
        };
        match doc.children(current)?.into_iter().next() {
            Some(child) if see_through || doc.span(child)? == doc.span(current)? => {
                current = child
            }
            _ => break,
        }
    }
    Ok(Some(current))
}

fn declaration_params(
    doc: &SourceDocument,
    declaration: NodeHandle,
) -> Result<Option<NodeHandle>, QueryError> {
    match doc.kind(declaration)? {
        NodeKind::Function | NodeKind::ArrowFunction => {
            for child in doc.children(declaration)? {
                if doc.kind(child)? == NodeKind::FormalParameters {
                    return Ok(Some(child));
                }
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}
