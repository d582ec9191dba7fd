use crate::span::Span;

/// Closed set of node kinds produced by the parser. Renderers and the
/// finalizer match on this exhaustively; there is no open "shape" probing.
///
/// Attribute keys legal per kind:
/// - `Heading`: `level`, `id`
/// - `List`: `ordered`, `start`, `tight`
/// - `TaskListItem`: `checked`
/// - `CodeBlock`: `value`, `lang`
/// - `CodeInline`, `Text`, `HtmlBlock`, `HtmlInline`: `value`
/// - `Link`: `url`, `title`
/// - `Image`: `url`, `title`
/// - `TableRow`: `header`
/// - `TableCell`: `header`, `align`
/// - `FootnoteReference`: `label`, `index`
/// - `FootnoteDefinition`: `label`, `index`
/// - `LinkReferenceDefinition`: `label`, `url`, `title`
/// - `LineBreak`: `hard`, `value` (a newline, so text extraction round-trips)
/// - `Alert`: `variant`
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NodeType {
    Root,
    Heading,
    Paragraph,
    BlockQuote,
    List,
    ListItem,
    TaskListItem,
    CodeBlock,
    CodeInline,
    ThematicBreak,
    HtmlBlock,
    HtmlInline,
    Table,
    TableRow,
    TableCell,
    Text,
    Emphasis,
    Strong,
    Strikethrough,
    Link,
    Image,
    FootnoteReference,
    FootnoteDefinition,
    LinkReferenceDefinition,
    LineBreak,
    Alert,
}

impl NodeType {
    /// Leaf kinds never carry children; their content, if any, lives in the
    /// `value` attribute.
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            NodeType::CodeBlock
                | NodeType::CodeInline
                | NodeType::ThematicBreak
                | NodeType::HtmlBlock
                | NodeType::HtmlInline
                | NodeType::Text
                | NodeType::FootnoteReference
                | NodeType::LinkReferenceDefinition
                | NodeType::LineBreak
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::Heading => "heading",
            NodeType::Paragraph => "paragraph",
            NodeType::BlockQuote => "blockQuote",
            NodeType::List => "list",
            NodeType::ListItem => "listItem",
            NodeType::TaskListItem => "taskListItem",
            NodeType::CodeBlock => "codeBlock",
            NodeType::CodeInline => "codeInline",
            NodeType::ThematicBreak => "thematicBreak",
            NodeType::HtmlBlock => "htmlBlock",
            NodeType::HtmlInline => "htmlInline",
            NodeType::Table => "table",
            NodeType::TableRow => "tableRow",
            NodeType::TableCell => "tableCell",
            NodeType::Text => "text",
            NodeType::Emphasis => "emphasis",
            NodeType::Strong => "strong",
            NodeType::Strikethrough => "strikethrough",
            NodeType::Link => "link",
            NodeType::Image => "image",
            NodeType::FootnoteReference => "footnoteReference",
            NodeType::FootnoteDefinition => "footnoteDefinition",
            NodeType::LinkReferenceDefinition => "linkReferenceDefinition",
            NodeType::LineBreak => "lineBreak",
            NodeType::Alert => "alert",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

/// Ordered key/scalar map. Insertion order is preserved so identical input
/// always serializes identically.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    items: Vec<(String, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.items
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_str)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(AttrValue::as_int)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(AttrValue::as_bool)
    }

    /// Inserts or replaces the value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        let key = key.into();
        for (name, existing) in self.items.iter_mut() {
            if *name == key {
                *existing = value;
                return;
            }
        }
        self.items.push((key, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.items
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

/// The single AST entity. A node's kind decides which attribute keys are
/// legal and whether children may be non-empty; `span` covers the source
/// bytes the node was parsed from.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeType,
    pub attrs: Attributes,
    pub children: Vec<Node>,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeType, span: Span) -> Self {
        Self {
            kind,
            attrs: Attributes::new(),
            children: Vec::new(),
            span,
        }
    }

    pub fn with_children(kind: NodeType, span: Span, children: Vec<Node>) -> Self {
        debug_assert!(!kind.is_leaf() || children.is_empty());
        Self {
            kind,
            attrs: Attributes::new(),
            children,
            span,
        }
    }

    pub fn text(span: Span, value: impl Into<String>) -> Self {
        let mut node = Node::new(NodeType::Text, span);
        node.attrs.set("value", AttrValue::Str(value.into()));
        node
    }

    pub fn set_attr(&mut self, key: &str, value: AttrValue) {
        self.attrs.set(key, value);
    }

    pub fn value(&self) -> &str {
        self.attrs.str("value").unwrap_or("")
    }
}

/// Concatenated `value` content of all text-bearing leaves under `node`.
/// Used for heading slugs, image alt text and plain-text extraction.
pub fn plain_text(node: &Node) -> String {
    let mut out = String::new();
    collect_plain_text(node, &mut out);
    out
}

fn collect_plain_text(node: &Node, out: &mut String) {
    match node.kind {
        NodeType::Text | NodeType::CodeInline | NodeType::CodeBlock => {
            out.push_str(node.value());
        }
        NodeType::LineBreak => out.push_str(node.value()),
        _ => {
            for child in &node.children {
                collect_plain_text(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttrValue, Attributes, Node, NodeType, plain_text};
    use crate::span::Span;

    #[test]
    fn attributes_preserve_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.set("level", AttrValue::Int(2));
        attrs.set("id", AttrValue::Str("intro".into()));
        attrs.set("level", AttrValue::Int(3));

        let keys: Vec<&str> = attrs.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["level", "id"]);
        assert_eq!(attrs.int("level"), Some(3));
    }

    #[test]
    fn plain_text_walks_nested_children() {
        let span = Span { start: 0, end: 0 };
        let mut emphasis = Node::new(NodeType::Emphasis, span);
        emphasis.children.push(Node::text(span, "inner"));
        let mut paragraph = Node::new(NodeType::Paragraph, span);
        paragraph.children.push(Node::text(span, "outer "));
        paragraph.children.push(emphasis);

        assert_eq!(plain_text(&paragraph), "outer inner");
    }
}
