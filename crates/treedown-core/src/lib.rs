mod ast;
mod block;
mod diagnostic;
mod entities;
mod finalize;
mod html;
mod inline;
mod normalize;
mod options;
mod parse;
mod refs;
mod registry;
mod sanitize;
mod slug;
mod source_map;
mod span;

pub use ast::{AttrValue, Attributes, Node, NodeType, plain_text};
pub use diagnostic::{
    Diagnostic, DiagnosticSeverity, W_DUPLICATE_DEFINITION, W_FOOTNOTE_UNRESOLVED, W_REF_UNRESOLVED,
    W_TABLE_RAGGED, W_URL_BLOCKED,
};
pub use html::{
    CompileResult, Compiler, compile, compile_sanitized, default_registry, escape_attr, escape_html,
};
pub use options::{ConfigError, Options, SanitizeFn, SlugifyFn};
pub use parse::{ParseResult, parse};
pub use refs::{FootnoteDef, LinkDef, RefTable};
pub use registry::{
    EffectiveRegistry, Override, Overrides, Registry, Rule, RuleFn, render_tree,
};
pub use slug::{Slugger, slugify};
pub use source_map::{Position, Range, SourceMap};
pub use span::{Span, SpanError};
