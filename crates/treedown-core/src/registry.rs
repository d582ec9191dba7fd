use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Node, NodeType};

/// Renderer contract: receives the node, its already-rendered children in
/// order, and the effective fixed attributes (rule defaults with overrides
/// merged). Returns the rendered fragment.
pub type RuleFn = Arc<dyn Fn(&Node, &[String], &[(String, String)]) -> String + Send + Sync>;

/// A registered renderer for one node type.
#[derive(Clone)]
pub struct Rule {
    pub render: RuleFn,
    /// Fixed attributes handed to the renderer, e.g. a default CSS class.
    pub defaults: Vec<(String, String)>,
}

impl Rule {
    pub fn new(render: RuleFn) -> Self {
        Self {
            render,
            defaults: Vec::new(),
        }
    }

    pub fn with_defaults(render: RuleFn, defaults: Vec<(String, String)>) -> Self {
        Self { render, defaults }
    }
}

/// Base mapping from node-type name to rule. Never mutated during a compile;
/// per-call overrides are layered on top through [`EffectiveRegistry`].
#[derive(Clone, Default)]
pub struct Registry {
    rules: HashMap<String, Rule>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, rule: Rule) {
        self.rules.insert(name.into(), rule);
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }
}

/// A caller-supplied override for one node type (or one raw HTML tag, keyed
/// as `html:<tag>`). `render` replaces the base renderer when set; `attrs`
/// are merged into the rule defaults, never overwriting them: when both name
/// the same key, the values are joined with a space.
#[derive(Clone, Default)]
pub struct Override {
    pub render: Option<RuleFn>,
    pub attrs: Vec<(String, String)>,
}

impl Override {
    pub fn renderer(render: RuleFn) -> Self {
        Self {
            render: Some(render),
            attrs: Vec::new(),
        }
    }

    pub fn attrs(attrs: Vec<(String, String)>) -> Self {
        Self {
            render: None,
            attrs,
        }
    }
}

#[derive(Clone, Default)]
pub struct Overrides {
    items: Vec<(String, Override)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, entry: Override) {
        self.items.push((name.into(), entry));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Override> {
        // Later entries shadow earlier ones for the same key.
        self.items
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, entry)| entry)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(key, _)| key.as_str())
    }
}

/// The base registry with one call's overrides layered on. Cheap to build
/// per compile call, so concurrent compiles with different overrides never
/// touch each other.
pub struct EffectiveRegistry<'a> {
    base: &'a Registry,
    overrides: &'a Overrides,
}

impl<'a> EffectiveRegistry<'a> {
    pub fn new(base: &'a Registry, overrides: &'a Overrides) -> Self {
        Self { base, overrides }
    }

    /// Renders one node given its already-rendered children. Raw HTML nodes
    /// first try a tag-specific override (`html:<tag>`), then the type-level
    /// entry. A node type with no rule renders as its children concatenated.
    pub fn render(&self, node: &Node, children: &[String]) -> String {
        let name = node.kind.name();
        let mut entry = None;
        if matches!(node.kind, NodeType::HtmlBlock | NodeType::HtmlInline) {
            if let Some(tag) = raw_html_tag(node.value()) {
                entry = self.overrides.get(&format!("html:{tag}"));
            }
        }
        let entry = entry.or_else(|| self.overrides.get(name));
        let base = self.base.get(name);

        let render = entry
            .and_then(|e| e.render.as_ref())
            .or_else(|| base.map(|rule| &rule.render));
        let render = match render {
            Some(render) => render,
            None => return children.concat(),
        };

        let mut attrs: Vec<(String, String)> = base
            .map(|rule| rule.defaults.clone())
            .unwrap_or_default();
        if let Some(entry) = entry {
            for (key, value) in &entry.attrs {
                merge_attr(&mut attrs, key, value);
            }
        }
        render(node, children, &attrs)
    }
}

fn merge_attr(attrs: &mut Vec<(String, String)>, key: &str, value: &str) {
    for (name, existing) in attrs.iter_mut() {
        if name == key {
            if !existing.is_empty() {
                existing.push(' ');
            }
            existing.push_str(value);
            return;
        }
    }
    attrs.push((key.to_string(), value.to_string()));
}

/// Depth-first render of a subtree through the effective registry.
pub fn render_tree(registry: &EffectiveRegistry<'_>, node: &Node) -> String {
    let children: Vec<String> = node
        .children
        .iter()
        .map(|child| render_tree(registry, child))
        .collect();
    registry.render(node, &children)
}

/// Tag name of a raw HTML fragment, lowercased. `</div>` and `<div class>`
/// both yield `div`.
pub(crate) fn raw_html_tag(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }
    let mut i = 1;
    if i < bytes.len() && bytes[i] == b'/' {
        i += 1;
    }
    let start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    if i == start {
        return None;
    }
    Some(value[start..i].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{EffectiveRegistry, Override, Overrides, Registry, Rule, raw_html_tag, render_tree};
    use crate::ast::{Node, NodeType};
    use crate::span::Span;
    use std::sync::Arc;

    fn paragraph_rule() -> Rule {
        Rule::with_defaults(
            Arc::new(|_node, children, attrs| {
                let class = attrs
                    .iter()
                    .find(|(key, _)| key == "class")
                    .map(|(_, value)| format!(" class=\"{value}\""))
                    .unwrap_or_default();
                format!("<p{}>{}</p>", class, children.concat())
            }),
            vec![("class".to_string(), "base".to_string())],
        )
    }

    fn sample_paragraph() -> Node {
        let span = Span::empty(0);
        Node::with_children(NodeType::Paragraph, span, vec![Node::text(span, "hi")])
    }

    #[test]
    fn override_attrs_merge_instead_of_replacing() {
        let mut registry = Registry::new();
        registry.insert("paragraph", paragraph_rule());
        registry.insert(
            "text",
            Rule::new(Arc::new(|node, _, _| node.value().to_string())),
        );
        let mut overrides = Overrides::new();
        overrides.set(
            "paragraph",
            Override::attrs(vec![("class".to_string(), "extra".to_string())]),
        );

        let effective = EffectiveRegistry::new(&registry, &overrides);
        let out = render_tree(&effective, &sample_paragraph());
        assert_eq!(out, "<p class=\"base extra\">hi</p>");
    }

    #[test]
    fn override_renderer_replaces_base() {
        let mut registry = Registry::new();
        registry.insert("paragraph", paragraph_rule());
        registry.insert(
            "text",
            Rule::new(Arc::new(|node, _, _| node.value().to_string())),
        );
        let mut overrides = Overrides::new();
        overrides.set(
            "paragraph",
            Override::renderer(Arc::new(|_, children, _| {
                format!("<div>{}</div>", children.concat())
            })),
        );

        let effective = EffectiveRegistry::new(&registry, &overrides);
        let out = render_tree(&effective, &sample_paragraph());
        assert_eq!(out, "<div>hi</div>");
    }

    #[test]
    fn base_registry_is_untouched_by_overrides() {
        let mut registry = Registry::new();
        registry.insert("paragraph", paragraph_rule());
        registry.insert(
            "text",
            Rule::new(Arc::new(|node, _, _| node.value().to_string())),
        );
        let overrides = Overrides::new();

        let effective = EffectiveRegistry::new(&registry, &overrides);
        let out = render_tree(&effective, &sample_paragraph());
        assert_eq!(out, "<p class=\"base\">hi</p>");
    }

    #[test]
    fn raw_html_tags_are_extracted() {
        assert_eq!(raw_html_tag("<div class=\"x\">"), Some("div".to_string()));
        assert_eq!(raw_html_tag("</SPAN>"), Some("span".to_string()));
        assert_eq!(raw_html_tag("plain"), None);
    }
}
