//! AST Query Module
//!
//! Arena-indexed view over an oxc parse, used to locate and rewrite code shapes
//! in user modules.
//!
//! ## Invariants
//!
//! 1. **Pre-order arena**: nodes are recorded in the order oxc's visitor enters
//!    them, so the subtree of node `i` is exactly `i..subtree_end`.
//! 2. **Span edits**: `replace` never touches the oxc tree. It records a span
//!    edit, and `print` splices every edit into the original source text. An
//!    unmodified document prints byte-for-byte identical to its input.
//! 3. **Handle invalidation**: replacing a node detaches it and every node
//!    below it. Handles to detached nodes, or handles issued by another
//!    document, are rejected with `QueryError::StaleHandle`.

use oxc_allocator::Allocator;
use oxc_ast::ast::Expression;
use oxc_ast::AstKind;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::identifier::is_identifier_name;
use std::ops::Range;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static DOCUMENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Syntax error: {message}")]
    Syntax { message: String },

    #[error("Cannot take the parent of the document root")]
    Traversal,

    #[error("Node handle is stale or belongs to another document")]
    StaleHandle,

    #[error("Unknown selector '{0}'")]
    InvalidSelector(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Node kinds the rewrite passes care about. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    ExportDefault,
    Function,
    ArrowFunction,
    FormalParameters,
    NewExpression,
    CallExpression,
    Identifier,
    ObjectExpression,
    ImportDeclaration,
    Class,
    Parenthesized,
    Other,
}

impl NodeKind {
    fn of(kind: &AstKind) -> Self {
        match kind {
            AstKind::Program(_) => NodeKind::Program,
            AstKind::ExportDefaultDeclaration(_) => NodeKind::ExportDefault,
            AstKind::Function(_) => NodeKind::Function,
            AstKind::ArrowFunctionExpression(_) => NodeKind::ArrowFunction,
            AstKind::FormalParameters(_) => NodeKind::FormalParameters,
            AstKind::NewExpression(_) => NodeKind::NewExpression,
            AstKind::CallExpression(_) => NodeKind::CallExpression,
            AstKind::IdentifierReference(_) | AstKind::BindingIdentifier(_) => {
                NodeKind::Identifier
            }
            AstKind::ObjectExpression(_) => NodeKind::ObjectExpression,
            AstKind::ImportDeclaration(_) => NodeKind::ImportDeclaration,
            AstKind::Class(_) => NodeKind::Class,
            AstKind::ParenthesizedExpression(_) => NodeKind::Parenthesized,
            _ => NodeKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
struct NodeRecord {
    kind: NodeKind,
    span: Span,
    parent: Option<usize>,
    subtree_end: usize,
    /// Identifier name, or the callee identifier of a `new`/call expression.
    name: Option<String>,
    arguments: Vec<Span>,
    detached: bool,
}

#[derive(Default)]
struct ArenaBuilder {
    records: Vec<NodeRecord>,
    stack: Vec<usize>,
}

impl<'a> Visit<'a> for ArenaBuilder {
    fn enter_node(&mut self, kind: AstKind<'a>) {
        let index = self.records.len();
        self.records.push(NodeRecord {
            kind: NodeKind::of(&kind),
            span: kind.span(),
            parent: self.stack.last().copied(),
            subtree_end: index + 1,
            name: node_name(&kind),
            arguments: argument_spans(&kind),
            detached: false,
        });
        self.stack.push(index);
    }

    fn leave_node(&mut self, _kind: AstKind<'a>) {
        if let Some(index) = self.stack.pop() {
            self.records[index].subtree_end = self.records.len();
        }
    }
}

fn node_name(kind: &AstKind) -> Option<String> {
    match kind {
        AstKind::IdentifierReference(ident) => Some(ident.name.to_string()),
        AstKind::BindingIdentifier(ident) => Some(ident.name.to_string()),
        AstKind::NewExpression(expr) => callee_name(&expr.callee),
        AstKind::CallExpression(expr) => callee_name(&expr.callee),
        _ => None,
    }
}

fn callee_name(callee: &Expression) -> Option<String> {
    match callee {
        Expression::Identifier(ident) => Some(ident.name.to_string()),
        _ => None,
    }
}

fn argument_spans(kind: &AstKind) -> Vec<Span> {
    match kind {
        AstKind::NewExpression(expr) => expr.arguments.iter().map(|arg| arg.span()).collect(),
        AstKind::CallExpression(expr) => expr.arguments.iter().map(|arg| arg.span()).collect(),
        _ => Vec::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Node selector. Parses from the short string forms used by the rewrite
/// passes: `exportDefault`, `new#Vue`, `call#fetch`, `id#initApp`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Kind(NodeKind),
    /// `new` expression whose callee is the given identifier
    NewExpression(String),
    /// Call expression whose callee is the given identifier
    CallExpression(String),
    Identifier(String),
}

impl Selector {
    fn matches(&self, record: &NodeRecord) -> bool {
        let name = record.name.as_deref();
        match self {
            Selector::Kind(kind) => record.kind == *kind,
            Selector::NewExpression(callee) => {
                record.kind == NodeKind::NewExpression && name == Some(callee.as_str())
            }
            Selector::CallExpression(callee) => {
                record.kind == NodeKind::CallExpression && name == Some(callee.as_str())
            }
            Selector::Identifier(ident) => {
                record.kind == NodeKind::Identifier && name == Some(ident.as_str())
            }
        }
    }
}

impl FromStr for Selector {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QueryError::InvalidSelector(s.to_string());

        if let Some((prefix, name)) = s.split_once('#') {
            if name.is_empty() {
                return Err(invalid());
            }
            return match prefix {
                "new" => Ok(Selector::NewExpression(name.to_string())),
                "call" => Ok(Selector::CallExpression(name.to_string())),
                "id" => Ok(Selector::Identifier(name.to_string())),
                _ => Err(invalid()),
            };
        }

        let kind = match s {
            "program" => NodeKind::Program,
            "exportDefault" => NodeKind::ExportDefault,
            "function" => NodeKind::Function,
            "arrow" => NodeKind::ArrowFunction,
            "params" => NodeKind::FormalParameters,
            "new" => NodeKind::NewExpression,
            "call" => NodeKind::CallExpression,
            "id" => NodeKind::Identifier,
            "object" => NodeKind::ObjectExpression,
            "import" => NodeKind::ImportDeclaration,
            "class" => NodeKind::Class,
            "paren" => NodeKind::Parenthesized,
            _ => return Err(invalid()),
        };
        Ok(Selector::Kind(kind))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLES & FRAGMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    document: u64,
    index: usize,
}

/// Syntax built outside the document, for insertion with `replace`.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Verbatim source text
    Source(String),
    /// Current text of an existing node, including edits made below it
    Node(NodeHandle),
    Call {
        callee: Box<Fragment>,
        arguments: Vec<Fragment>,
    },
    /// Parenthesized formal parameter list
    Params(Vec<Fragment>),
}

impl Fragment {
    pub fn identifier(name: &str) -> Result<Self, QueryError> {
        if !is_identifier_name(name) {
            return Err(QueryError::Syntax {
                message: format!("'{}' is not a valid identifier", name),
            });
        }
        Ok(Fragment::Source(name.to_string()))
    }

    pub fn parse_expression(text: &str) -> Result<Self, QueryError> {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true);
        Parser::new(&allocator, text, source_type)
            .parse_expression()
            .map_err(|errors| QueryError::Syntax {
                message: join_diagnostics(errors.iter()),
            })?;
        Ok(Fragment::Source(text.trim().to_string()))
    }

    pub fn call(callee: Fragment, arguments: Vec<Fragment>) -> Self {
        Fragment::Call {
            callee: Box::new(callee),
            arguments,
        }
    }

    pub fn params(params: Vec<Fragment>) -> Self {
        Fragment::Params(params)
    }
}

fn join_diagnostics<T: ToString>(errors: impl Iterator<Item = T>) -> String {
    errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

#[derive(Debug, Clone)]
struct Edit {
    span: Span,
    text: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct SourceDocument {
    id: u64,
    source: String,
    nodes: Vec<NodeRecord>,
    /// Sorted by start, never overlapping
    edits: Vec<Edit>,
}

impl SourceDocument {
    /// Parse an ES module (JSX allowed).
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        Self::parse_with(text, SourceType::default().with_module(true).with_jsx(true))
    }

    pub fn parse_with(text: &str, source_type: SourceType) -> Result<Self, QueryError> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, text, source_type).parse();
        if !ret.errors.is_empty() {
            return Err(QueryError::Syntax {
                message: join_diagnostics(ret.errors.iter()),
            });
        }

        let mut builder = ArenaBuilder::default();
        builder.visit_program(&ret.program);

        Ok(Self {
            id: DOCUMENT_ID_COUNTER.fetch_add(1, Ordering::SeqCst),
            source: text.to_string(),
            nodes: builder.records,
            edits: Vec::new(),
        })
    }

    pub fn root(&self) -> NodeHandle {
        self.handle(0)
    }

    fn handle(&self, index: usize) -> NodeHandle {
        NodeHandle {
            document: self.id,
            index,
        }
    }

    fn record(&self, handle: NodeHandle) -> Result<&NodeRecord, QueryError> {
        if handle.document != self.id {
            return Err(QueryError::StaleHandle);
        }
        match self.nodes.get(handle.index) {
            Some(record) if !record.detached => Ok(record),
            _ => Err(QueryError::StaleHandle),
        }
    }

    fn collect(&self, range: Range<usize>, selector: &Selector) -> Vec<NodeHandle> {
        range
            .filter(|&i| {
                let record = &self.nodes[i];
                !record.detached && selector.matches(record)
            })
            .map(|i| self.handle(i))
            .collect()
    }

    /// All matches in the document, in pre-order.
    pub fn find(&self, selector: &Selector) -> Vec<NodeHandle> {
        self.collect(0..self.nodes.len(), selector)
    }

    /// Matches strictly below `scope`, in pre-order.
    pub fn find_in(
        &self,
        scope: NodeHandle,
        selector: &Selector,
    ) -> Result<Vec<NodeHandle>, QueryError> {
        let end = self.record(scope)?.subtree_end;
        Ok(self.collect(scope.index + 1..end, selector))
    }

    pub fn find_one(&self, selector: &Selector) -> Option<NodeHandle> {
        self.find(selector).into_iter().next()
    }

    pub fn find_one_in(
        &self,
        scope: NodeHandle,
        selector: &Selector,
    ) -> Result<Option<NodeHandle>, QueryError> {
        Ok(self.find_in(scope, selector)?.into_iter().next())
    }

    pub fn parent(&self, handle: NodeHandle) -> Result<NodeHandle, QueryError> {
        match self.record(handle)?.parent {
            Some(parent) => Ok(self.handle(parent)),
            None => Err(QueryError::Traversal),
        }
    }

    pub fn children(&self, handle: NodeHandle) -> Result<Vec<NodeHandle>, QueryError> {
        let end = self.record(handle)?.subtree_end;
        Ok((handle.index + 1..end)
            .filter(|&i| self.nodes[i].parent == Some(handle.index) && !self.nodes[i].detached)
            .map(|i| self.handle(i))
            .collect())
    }

    /// Argument nodes of a `new`/call expression, in source order.
    pub fn arguments(&self, handle: NodeHandle) -> Result<Vec<NodeHandle>, QueryError> {
        let record = self.record(handle)?;
        let mut arguments = Vec::with_capacity(record.arguments.len());
        for span in &record.arguments {
            let found = (handle.index + 1..record.subtree_end)
                .find(|&i| self.nodes[i].span == *span && !self.nodes[i].detached);
            if let Some(i) = found {
                arguments.push(self.handle(i));
            }
        }
        Ok(arguments)
    }

    pub fn kind(&self, handle: NodeHandle) -> Result<NodeKind, QueryError> {
        Ok(self.record(handle)?.kind)
    }

    pub fn name(&self, handle: NodeHandle) -> Result<Option<&str>, QueryError> {
        Ok(self.record(handle)?.name.as_deref())
    }

    pub fn span(&self, handle: NodeHandle) -> Result<Span, QueryError> {
        Ok(self.record(handle)?.span)
    }

    /// Current text of the node, with edits below it applied.
    pub fn text(&self, handle: NodeHandle) -> Result<String, QueryError> {
        let span = self.record(handle)?.span;
        Ok(self.render(span))
    }

    /// True when `node` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: NodeHandle, node: NodeHandle) -> Result<bool, QueryError> {
        let end = self.record(ancestor)?.subtree_end;
        self.record(node)?;
        Ok(node.index >= ancestor.index && node.index < end)
    }

    pub fn replace(&mut self, handle: NodeHandle, fragment: Fragment) -> Result<(), QueryError> {
        let record = self.record(handle)?;
        let span = record.span;
        let end = record.subtree_end;
        let text = self.render_fragment(&fragment)?;

        for node in &mut self.nodes[handle.index..end] {
            node.detached = true;
        }

        self.edits
            .retain(|edit| !(edit.span.start >= span.start && edit.span.end <= span.end));
        let position = self.edits.partition_point(|edit| edit.span.start < span.start);
        self.edits.insert(position, Edit { span, text });
        Ok(())
    }

    pub fn print(&self) -> String {
        self.render(Span::new(0, self.source.len() as u32))
    }

    fn render(&self, span: Span) -> String {
        let mut out = String::with_capacity((span.end - span.start) as usize);
        let mut cursor = span.start as usize;
        for edit in self
            .edits
            .iter()
            .filter(|edit| edit.span.start >= span.start && edit.span.end <= span.end)
        {
            out.push_str(&self.source[cursor..edit.span.start as usize]);
            out.push_str(&edit.text);
            cursor = edit.span.end as usize;
        }
        out.push_str(&self.source[cursor..span.end as usize]);
        out
    }

    fn render_fragment(&self, fragment: &Fragment) -> Result<String, QueryError> {
        match fragment {
            Fragment::Source(text) => Ok(text.clone()),
            Fragment::Node(handle) => self.text(*handle),
            Fragment::Call { callee, arguments } => Ok(format!(
                "{}({})",
                self.render_fragment(callee)?,
                self.render_list(arguments)?
            )),
            Fragment::Params(params) => Ok(format!("({})", self.render_list(params)?)),
        }
    }

    fn render_list(&self, fragments: &[Fragment]) -> Result<String, QueryError> {
        let rendered = fragments
            .iter()
            .map(|f| self.render_fragment(f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(", "))
    }
}
