use std::collections::HashMap;

use crate::span::Span;

/// A link reference definition collected during the prepass.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkDef {
    pub label: String,
    pub url: String,
    pub title: Option<String>,
    pub span: Span,
}

/// A footnote definition. `index` is assigned when the first reference to
/// the label is seen, so footnote numbering follows reference order.
#[derive(Clone, Debug, PartialEq)]
pub struct FootnoteDef {
    pub label: String,
    pub index: Option<usize>,
    pub span: Span,
}

/// Definitions visible to the whole document. Filled by the prepass before
/// any inline content is parsed, so forward references resolve.
#[derive(Clone, Debug, Default)]
pub struct RefTable {
    link_defs: HashMap<String, LinkDef>,
    footnotes: HashMap<String, FootnoteDef>,
    footnote_order: Vec<String>,
    next_footnote_index: usize,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a link definition. The first definition for a label wins;
    /// returns `false` when the label was already taken.
    pub fn insert_link_def(&mut self, def: LinkDef) -> bool {
        let key = def.label.clone();
        if self.link_defs.contains_key(&key) {
            return false;
        }
        self.link_defs.insert(key, def);
        true
    }

    pub fn link_def(&self, normalized_label: &str) -> Option<&LinkDef> {
        self.link_defs.get(normalized_label)
    }

    /// Records a footnote definition, first-wins like link definitions.
    pub fn insert_footnote_def(&mut self, def: FootnoteDef) -> bool {
        let key = def.label.clone();
        if self.footnotes.contains_key(&key) {
            return false;
        }
        self.footnotes.insert(key, def);
        true
    }

    pub fn footnote_def(&self, normalized_label: &str) -> Option<&FootnoteDef> {
        self.footnotes.get(normalized_label)
    }

    /// Resolves a footnote reference, assigning the next index on first use.
    /// Returns `None` when no definition exists for the label.
    pub fn reference_footnote(&mut self, normalized_label: &str) -> Option<usize> {
        let def = self.footnotes.get_mut(normalized_label)?;
        if let Some(index) = def.index {
            return Some(index);
        }
        self.next_footnote_index += 1;
        def.index = Some(self.next_footnote_index);
        self.footnote_order.push(normalized_label.to_string());
        Some(self.next_footnote_index)
    }

    /// Referenced footnote labels in index order. Unreferenced definitions
    /// do not appear here.
    pub fn referenced_footnotes(&self) -> impl Iterator<Item = &FootnoteDef> {
        self.footnote_order
            .iter()
            .filter_map(|label| self.footnotes.get(label))
    }
}

/// Case-fold and whitespace-collapse a link label for matching. Backslash
/// escapes of `[`, `]` and `\` are resolved first.
pub(crate) fn normalize_link_label(bytes: &[u8]) -> String {
    let mut out = Vec::new();
    let mut escaped = false;
    let mut last_space = false;
    for (idx, &b) in bytes.iter().enumerate() {
        if escaped {
            out.push(b.to_ascii_lowercase());
            escaped = false;
            last_space = false;
            continue;
        }
        if b == b'\\' {
            if idx + 1 < bytes.len() && is_label_escape(bytes[idx + 1]) {
                escaped = true;
                continue;
            }
            out.push(b'\\');
            last_space = false;
            continue;
        }
        if b.is_ascii_whitespace() {
            if !out.is_empty() && !last_space {
                out.push(b' ');
                last_space = true;
            }
            continue;
        }
        last_space = false;
        out.push(b.to_ascii_lowercase());
    }
    if escaped {
        out.push(b'\\');
    }
    if out.last() == Some(&b' ') {
        out.pop();
    }
    let normalized = match String::from_utf8(out) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
    };
    let lowered = normalized.to_lowercase();
    lowered.replace('ß', "ss").replace('ẞ', "ss")
}

pub(crate) fn is_label_escape(byte: u8) -> bool {
    byte == b'[' || byte == b']' || byte == b'\\'
}

pub(crate) fn unescape_backslash_punct(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' && chars.peek().is_some_and(|next| next.is_ascii_punctuation()) {
            // Drop the backslash; the escaped character lands next iteration.
            continue;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{FootnoteDef, LinkDef, RefTable, normalize_link_label, unescape_backslash_punct};
    use crate::span::Span;

    fn link(label: &str, url: &str) -> LinkDef {
        LinkDef {
            label: label.to_string(),
            url: url.to_string(),
            title: None,
            span: Span::empty(0),
        }
    }

    #[test]
    fn first_link_definition_wins() {
        let mut table = RefTable::new();
        assert!(table.insert_link_def(link("foo", "/a")));
        assert!(!table.insert_link_def(link("foo", "/b")));
        assert_eq!(table.link_def("foo").map(|d| d.url.as_str()), Some("/a"));
    }

    #[test]
    fn footnote_indexes_follow_reference_order() {
        let mut table = RefTable::new();
        table.insert_footnote_def(FootnoteDef {
            label: "alpha".to_string(),
            index: None,
            span: Span::empty(0),
        });
        table.insert_footnote_def(FootnoteDef {
            label: "beta".to_string(),
            index: None,
            span: Span::empty(0),
        });

        assert_eq!(table.reference_footnote("beta"), Some(1));
        assert_eq!(table.reference_footnote("alpha"), Some(2));
        assert_eq!(table.reference_footnote("beta"), Some(1));
        assert_eq!(table.reference_footnote("missing"), None);

        let order: Vec<&str> = table
            .referenced_footnotes()
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(order, vec!["beta", "alpha"]);
    }

    #[test]
    fn labels_normalize_case_and_whitespace() {
        assert_eq!(normalize_link_label(b"  Foo \t Bar "), "foo bar");
        assert_eq!(normalize_link_label(b"\\[x\\]"), "[x]");
    }

    #[test]
    fn unescaping_keeps_multibyte_text_intact() {
        assert_eq!(unescape_backslash_punct("café"), "café");
        assert_eq!(unescape_backslash_punct("a\\*b"), "a*b");
        assert_eq!(unescape_backslash_punct("tail\\"), "tail\\");
        assert_eq!(unescape_backslash_punct("\\\\"), "\\");
    }
}
