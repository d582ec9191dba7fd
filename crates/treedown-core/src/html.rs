//! HTML output. A base registry maps every node type to a render rule;
//! per-call overrides swap rules or merge extra fixed attributes without
//! touching the shared registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ast::{Node, NodeType, plain_text};
use crate::diagnostic::{Diagnostic, DiagnosticSeverity, W_URL_BLOCKED};
use crate::options::{ConfigError, Options};
use crate::parse::parse;
use crate::registry::{EffectiveRegistry, Registry, Rule, render_tree};
use crate::sanitize::url_allowed;
use crate::source_map::SourceMap;

/// Output of a compile call.
#[derive(Debug)]
pub struct CompileResult {
    pub output: String,
    pub root: Node,
    pub diagnostics: Vec<Diagnostic>,
}

/// A reusable compiler around one base registry. The registry is fixed at
/// construction; per-call behavior changes go through [`Options`].
pub struct Compiler {
    registry: Registry,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            registry: default_registry(),
        }
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parses and renders in one pass. Configuration problems are the only
    /// error path; malformed input never fails, it produces diagnostics.
    pub fn compile(&self, source: &str, options: &Options) -> Result<CompileResult, ConfigError> {
        options.validate(&self.registry)?;
        let mut parsed = parse(source, options);
        sanitize_urls(
            &mut parsed.root,
            options,
            &parsed.source_map,
            &mut parsed.diagnostics,
        );
        let effective = EffectiveRegistry::new(&self.registry, &options.overrides);
        let output = render_tree(&effective, &parsed.root);
        Ok(CompileResult {
            output,
            root: parsed.root,
            diagnostics: parsed.diagnostics,
        })
    }

    /// Like [`Compiler::compile`], with the rendered HTML additionally run
    /// through an allow-list cleaner. Raw HTML pass-through and any custom
    /// renderer output are clamped to the allowed tag set.
    pub fn compile_sanitized(
        &self,
        source: &str,
        options: &Options,
    ) -> Result<CompileResult, ConfigError> {
        let mut result = self.compile(source, options)?;
        result.output = clean_html(&result.output);
        Ok(result)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_COMPILER: Lazy<Compiler> = Lazy::new(Compiler::new);

/// Compiles with the default registry.
pub fn compile(source: &str, options: &Options) -> Result<CompileResult, ConfigError> {
    DEFAULT_COMPILER.compile(source, options)
}

/// Compiles with the default registry and cleans the output HTML.
pub fn compile_sanitized(source: &str, options: &Options) -> Result<CompileResult, ConfigError> {
    DEFAULT_COMPILER.compile_sanitized(source, options)
}

/// Rewrites `url` attributes on links and images before rendering. The
/// default policy is a scheme allow-list; a custom sanitizer replaces the
/// policy entirely. Blocked URLs become empty strings so the node still
/// renders, minus the destination.
fn sanitize_urls(
    node: &mut Node,
    options: &Options,
    source_map: &SourceMap,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if matches!(node.kind, NodeType::Link | NodeType::Image) {
        let url = node.attrs.str("url").unwrap_or("").to_string();
        let kept = match &options.sanitizer {
            Some(custom) => custom("url", &url),
            None => {
                if url_allowed(&url) {
                    Some(url.clone())
                } else {
                    None
                }
            }
        };
        match kept {
            Some(value) => {
                if value != url {
                    node.set_attr("url", crate::ast::AttrValue::Str(value));
                }
            }
            None => {
                node.set_attr("url", crate::ast::AttrValue::Str(String::new()));
                diagnostics.push(Diagnostic::new(
                    source_map.range(node.span),
                    DiagnosticSeverity::Warning,
                    W_URL_BLOCKED,
                    format!("blocked URL `{url}`"),
                ));
            }
        }
    }
    for child in &mut node.children {
        sanitize_urls(child, options, source_map, diagnostics);
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Renders rule-level fixed attributes (defaults plus merged overrides) as
/// a ` key="value"` suffix for an opening tag.
fn fixed_attrs(attrs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out
}

fn simple_rule(open: &'static str, close: &'static str, newline: bool) -> Rule {
    Rule::new(Arc::new(move |_node, children, attrs| {
        let mut out = String::new();
        out.push('<');
        out.push_str(open);
        out.push_str(&fixed_attrs(attrs));
        out.push('>');
        out.push_str(&children.concat());
        out.push_str("</");
        out.push_str(close);
        out.push('>');
        if newline {
            out.push('\n');
        }
        out
    }))
}

/// The built-in HTML rules, one per node type.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();

    registry.insert(
        "root",
        Rule::new(Arc::new(|_, children, _| children.concat())),
    );
    registry.insert("paragraph", simple_rule("p", "p", true));
    registry.insert("emphasis", simple_rule("em", "em", false));
    registry.insert("strong", simple_rule("strong", "strong", false));
    registry.insert("strikethrough", simple_rule("del", "del", false));

    registry.insert(
        "heading",
        Rule::new(Arc::new(|node, children, attrs| {
            let level = node.attrs.int("level").unwrap_or(1).clamp(1, 6);
            let id = node
                .attrs
                .str("id")
                .map(|id| format!(" id=\"{}\"", escape_attr(id)))
                .unwrap_or_default();
            format!(
                "<h{level}{id}{}>{}</h{level}>\n",
                fixed_attrs(attrs),
                children.concat()
            )
        })),
    );

    registry.insert(
        "blockQuote",
        Rule::new(Arc::new(|_, children, attrs| {
            format!(
                "<blockquote{}>\n{}</blockquote>\n",
                fixed_attrs(attrs),
                children.concat()
            )
        })),
    );

    registry.insert(
        "alert",
        Rule::new(Arc::new(|node, children, attrs| {
            let variant = node.attrs.str("variant").unwrap_or("note");
            let mut title: String = variant.to_string();
            if let Some(first) = title.get_mut(..1) {
                first.make_ascii_uppercase();
            }
            format!(
                "<div class=\"markdown-alert markdown-alert-{variant}\"{}>\n<p class=\"markdown-alert-title\">{title}</p>\n{}</div>\n",
                fixed_attrs(attrs),
                children.concat()
            )
        })),
    );

    registry.insert(
        "list",
        Rule::new(Arc::new(|node, children, attrs| {
            let ordered = node.attrs.bool("ordered").unwrap_or(false);
            let tag = if ordered { "ol" } else { "ul" };
            let mut open = String::new();
            if node.attrs.bool("footnotes") == Some(true) {
                open.push_str(" class=\"footnotes\"");
            }
            if let Some(start) = node.attrs.int("start") {
                if start != 1 {
                    open.push_str(&format!(" start=\"{start}\""));
                }
            }
            format!(
                "<{tag}{open}{}>\n{}</{tag}>\n",
                fixed_attrs(attrs),
                children.concat()
            )
        })),
    );

    registry.insert("listItem", simple_rule("li", "li", true));

    registry.insert(
        "taskListItem",
        Rule::new(Arc::new(|node, children, attrs| {
            let checked = if node.attrs.bool("checked") == Some(true) {
                " checked=\"\""
            } else {
                ""
            };
            format!(
                "<li{}><input type=\"checkbox\" disabled=\"\"{checked}/> {}</li>\n",
                fixed_attrs(attrs),
                children.concat()
            )
        })),
    );

    registry.insert(
        "codeBlock",
        Rule::new(Arc::new(|node, _, attrs| {
            let lang = node
                .attrs
                .str("lang")
                .filter(|lang| !lang.is_empty())
                .map(|lang| format!(" class=\"language-{}\"", escape_attr(lang)))
                .unwrap_or_default();
            let mut body = escape_html(node.value());
            if !body.is_empty() && !body.ends_with('\n') {
                body.push('\n');
            }
            format!("<pre{}><code{lang}>{body}</code></pre>\n", fixed_attrs(attrs))
        })),
    );

    registry.insert(
        "codeInline",
        Rule::new(Arc::new(|node, _, attrs| {
            format!(
                "<code{}>{}</code>",
                fixed_attrs(attrs),
                escape_html(node.value())
            )
        })),
    );

    registry.insert(
        "thematicBreak",
        Rule::new(Arc::new(|_, _, _| "<hr />\n".to_string())),
    );

    registry.insert(
        "htmlBlock",
        Rule::new(Arc::new(|node, _, _| format!("{}\n", node.value()))),
    );
    registry.insert(
        "htmlInline",
        Rule::new(Arc::new(|node, _, _| node.value().to_string())),
    );

    registry.insert(
        "table",
        Rule::new(Arc::new(|_, children, attrs| {
            let mut out = format!("<table{}>\n", fixed_attrs(attrs));
            if let Some((head, body)) = children.split_first() {
                out.push_str("<thead>\n");
                out.push_str(head);
                out.push_str("</thead>\n");
                if !body.is_empty() {
                    out.push_str("<tbody>\n");
                    for row in body {
                        out.push_str(row);
                    }
                    out.push_str("</tbody>\n");
                }
            }
            out.push_str("</table>\n");
            out
        })),
    );

    registry.insert("tableRow", simple_rule("tr", "tr", true));

    registry.insert(
        "tableCell",
        Rule::new(Arc::new(|node, children, attrs| {
            let tag = if node.attrs.bool("header") == Some(true) {
                "th"
            } else {
                "td"
            };
            let align = node
                .attrs
                .str("align")
                .map(|align| format!(" align=\"{align}\""))
                .unwrap_or_default();
            format!(
                "<{tag}{align}{}>{}</{tag}>",
                fixed_attrs(attrs),
                children.concat()
            )
        })),
    );

    registry.insert(
        "text",
        Rule::new(Arc::new(|node, _, _| escape_html(node.value()))),
    );

    registry.insert(
        "link",
        Rule::new(Arc::new(|node, children, attrs| {
            let url = escape_attr(node.attrs.str("url").unwrap_or(""));
            let title = node
                .attrs
                .str("title")
                .map(|title| format!(" title=\"{}\"", escape_attr(title)))
                .unwrap_or_default();
            format!(
                "<a href=\"{url}\"{title}{}>{}</a>",
                fixed_attrs(attrs),
                children.concat()
            )
        })),
    );

    registry.insert(
        "image",
        Rule::new(Arc::new(|node, _, attrs| {
            let url = escape_attr(node.attrs.str("url").unwrap_or(""));
            let alt = escape_attr(&plain_text(node));
            let title = node
                .attrs
                .str("title")
                .map(|title| format!(" title=\"{}\"", escape_attr(title)))
                .unwrap_or_default();
            format!(
                "<img src=\"{url}\" alt=\"{alt}\"{title}{} />",
                fixed_attrs(attrs)
            )
        })),
    );

    registry.insert(
        "footnoteReference",
        Rule::new(Arc::new(|node, _, _| {
            let index = node.attrs.int("index").unwrap_or(0);
            format!(
                "<sup class=\"footnote-ref\"><a href=\"#fn-{index}\" id=\"fnref-{index}\">[{index}]</a></sup>"
            )
        })),
    );

    registry.insert(
        "footnoteDefinition",
        Rule::new(Arc::new(|node, children, _| {
            let index = node.attrs.int("index").unwrap_or(0);
            format!(
                "<li id=\"fn-{index}\">{}<a href=\"#fnref-{index}\" class=\"footnote-backref\">\u{21a9}</a></li>\n",
                children.concat()
            )
        })),
    );

    // Definitions are consumed by the reference table; nothing to render.
    registry.insert(
        "linkReferenceDefinition",
        Rule::new(Arc::new(|_, _, _| String::new())),
    );

    registry.insert(
        "lineBreak",
        Rule::new(Arc::new(|node, _, _| {
            if node.attrs.bool("hard") == Some(true) {
                "<br />\n".to_string()
            } else {
                "\n".to_string()
            }
        })),
    );

    registry
}

/// Allow-list clean of rendered output. Covers everything the default
/// registry emits; anything else, including raw HTML pass-through, is
/// stripped.
fn clean_html(html: &str) -> String {
    let tags: HashSet<&str> = [
        "a",
        "blockquote",
        "br",
        "code",
        "del",
        "div",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "img",
        "input",
        "li",
        "ol",
        "p",
        "pre",
        "section",
        "strong",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
    ]
    .into_iter()
    .collect();

    let generic_attributes: HashSet<&str> = ["class", "id"].into_iter().collect();

    let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    tag_attributes.insert("a", ["href", "title"].into_iter().collect());
    tag_attributes.insert("img", ["src", "alt", "title"].into_iter().collect());
    tag_attributes.insert("ol", ["start"].into_iter().collect());
    tag_attributes.insert("th", ["align"].into_iter().collect());
    tag_attributes.insert("td", ["align"].into_iter().collect());
    tag_attributes.insert("code", ["class"].into_iter().collect());
    tag_attributes.insert(
        "input",
        ["type", "checked", "disabled"].into_iter().collect(),
    );

    let url_schemes: HashSet<&str> = ["http", "https", "mailto", "tel", "ftp", "ftps"]
        .into_iter()
        .collect();

    ammonia::Builder::new()
        .tags(tags)
        .generic_attributes(generic_attributes)
        .tag_attributes(tag_attributes)
        .url_schemes(url_schemes)
        .link_rel(None)
        .clean(html)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{compile, compile_sanitized, escape_html};
    use crate::diagnostic::W_URL_BLOCKED;
    use crate::options::Options;
    use crate::registry::Override;
    use std::sync::Arc;

    #[test]
    fn paragraph_and_emphasis_render() {
        let result = compile("hello *world*", &Options::new()).unwrap();
        assert_eq!(result.output, "<p>hello <em>world</em></p>\n");
    }

    #[test]
    fn headings_carry_generated_ids() {
        let result = compile("# My Title", &Options::new()).unwrap();
        assert_eq!(result.output, "<h1 id=\"my-title\">My Title</h1>\n");
    }

    #[test]
    fn javascript_urls_are_blocked() {
        let result = compile("[x](javascript:alert(1))", &Options::new()).unwrap();
        assert!(result.output.contains("href=\"\""));
        assert!(result.diagnostics.iter().any(|d| d.code == W_URL_BLOCKED));
    }

    #[test]
    fn control_characters_do_not_defeat_the_url_policy() {
        let result = compile("[x](<java\tscript:alert(1)>)", &Options::new()).unwrap();
        assert!(result.output.contains("href=\"\""));
        assert!(!result.output.contains("script:"));
        assert!(result.diagnostics.iter().any(|d| d.code == W_URL_BLOCKED));
    }

    #[test]
    fn custom_sanitizer_replaces_the_policy() {
        let options = Options {
            sanitizer: Some(Arc::new(|_, url| Some(format!("/proxy?u={url}")))),
            ..Options::new()
        };
        let result = compile("[x](https://example.com)", &options).unwrap();
        assert!(result.output.contains("href=\"/proxy?u=https://example.com\""));
    }

    #[test]
    fn renderer_override_swaps_one_rule() {
        let mut options = Options::new();
        options.overrides.set(
            "paragraph",
            Override::renderer(Arc::new(|_, children, _| {
                format!("<section>{}</section>", children.concat())
            })),
        );
        let result = compile("text", &options).unwrap();
        assert_eq!(result.output, "<section>text</section>");
    }

    #[test]
    fn attr_override_merges_with_defaults() {
        let mut options = Options::new();
        options.overrides.set(
            "paragraph",
            Override::attrs(vec![("class".to_string(), "lede".to_string())]),
        );
        let result = compile("text", &options).unwrap();
        assert_eq!(result.output, "<p class=\"lede\">text</p>\n");
    }

    #[test]
    fn sanitized_output_strips_raw_html() {
        let result =
            compile_sanitized("before <script>alert(1)</script> after", &Options::new()).unwrap();
        assert!(!result.output.contains("<script"));
        assert!(result.output.contains("before"));
    }

    #[test]
    fn escaping_covers_html_metacharacters() {
        assert_eq!(escape_html("a<b&\"c\""), "a&lt;b&amp;&quot;c&quot;");
    }
}
