use crate::ast::{Node, NodeType};
use crate::diagnostic::{Diagnostic, DiagnosticSeverity};
use crate::finalize::finalize;
use crate::inline::InlineInput;
use crate::normalize::{Line, split_lines};
use crate::options::{Options, SlugifyFn};
use crate::refs::RefTable;
use crate::source_map::SourceMap;
use crate::span::Span;

/// Container depth cap. Markers nested deeper than this degrade to
/// paragraph text instead of opening another container, which bounds the
/// recursion depth independent of the input.
pub(crate) const MAX_NESTING: usize = 64;

/// One parse pass over a document. The prepass runs with `collecting` set
/// and only records link/footnote definitions; the main pass reads the
/// finished [`RefTable`] while resolving inline content.
pub(crate) struct Session {
    pub(crate) lines: Vec<Line>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) source_map: SourceMap,
    pub(crate) refs: RefTable,
    pub(crate) collecting: bool,
    pub(crate) raw_html_enabled: bool,
    pub(crate) slugify: Option<SlugifyFn>,
    pub(crate) depth: usize,
}

impl Session {
    pub(crate) fn new(source: &str, options: &Options, collecting: bool) -> Self {
        Self {
            lines: split_lines(source),
            diagnostics: Vec::new(),
            source_map: SourceMap::new(source),
            refs: RefTable::new(),
            collecting,
            raw_html_enabled: !options.disable_parsing_raw_html,
            slugify: options.slugify.clone(),
            depth: 0,
        }
    }

    pub(crate) fn push_warning(&mut self, span: Span, code: &'static str, message: impl Into<String>) {
        let range = self.source_map.range(span);
        self.diagnostics
            .push(Diagnostic::new(range, DiagnosticSeverity::Warning, code, message));
    }
}

/// Output of [`parse`]: the AST plus everything needed to interpret it.
#[derive(Debug)]
pub struct ParseResult {
    pub root: Node,
    pub diagnostics: Vec<Diagnostic>,
    pub source_map: SourceMap,
    pub refs: RefTable,
}

/// Parses a document into an AST. Total: every input yields a tree, with
/// oddities reported as diagnostics rather than errors.
pub fn parse(source: &str, options: &Options) -> ParseResult {
    if options.force_block || options.force_inline {
        return parse_forced(source, options);
    }

    // Prepass: collect definitions so forward references resolve. Inline
    // content is not parsed during this pass.
    let mut prepass = Session::new(source, options, true);
    let lines = std::mem::take(&mut prepass.lines);
    let _ = prepass.parse_blocks(&lines);
    let refs = std::mem::take(&mut prepass.refs);
    let mut diagnostics = std::mem::take(&mut prepass.diagnostics);

    let mut session = Session::new(source, options, false);
    session.refs = refs;
    let lines = std::mem::take(&mut session.lines);
    let children = session.parse_blocks(&lines);
    let mut root = Node::with_children(
        NodeType::Root,
        Span {
            start: 0,
            end: source.len(),
        },
        children,
    );
    finalize(&mut root, &mut session);

    diagnostics.append(&mut session.diagnostics);
    ParseResult {
        root,
        diagnostics,
        source_map: session.source_map,
        refs: session.refs,
    }
}

/// `force_block` treats the input as one paragraph-style block;
/// `force_inline` skips blocks entirely and parses one inline run. When
/// both are set, `force_block` wins here; `compile` rejects the combination
/// up front.
fn parse_forced(source: &str, options: &Options) -> ParseResult {
    let mut session = Session::new(source, options, false);
    let span = Span {
        start: 0,
        end: source.len(),
    };

    let mut input = InlineInput::new();
    let lines = std::mem::take(&mut session.lines);
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            input.push_newline(line.start.saturating_sub(1));
        }
        input.push_str(line.text.trim_end(), line.start);
    }
    let inlines = session.parse_inline(&input);

    let children = if options.force_block {
        let mut paragraph = Node::with_children(NodeType::Paragraph, span, inlines);
        paragraph.span = span;
        vec![paragraph]
    } else {
        inlines
    };
    let mut root = Node::with_children(NodeType::Root, span, children);
    finalize(&mut root, &mut session);

    ParseResult {
        root,
        diagnostics: std::mem::take(&mut session.diagnostics),
        source_map: session.source_map,
        refs: std::mem::take(&mut session.refs),
    }
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::ast::NodeType;
    use crate::options::Options;

    #[test]
    fn empty_input_yields_empty_root() {
        let result = parse("", &Options::new());
        assert_eq!(result.root.kind, NodeType::Root);
        assert!(result.root.children.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn force_inline_skips_block_detection() {
        let options = Options {
            force_inline: true,
            ..Options::new()
        };
        let result = parse("# not a heading", &options);
        assert!(
            result
                .root
                .children
                .iter()
                .all(|child| child.kind != NodeType::Heading)
        );
    }

    #[test]
    fn force_block_wraps_input_in_one_block() {
        let options = Options {
            force_block: true,
            ..Options::new()
        };
        let result = parse("just *text*", &options);
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].kind, NodeType::Paragraph);
    }
}
