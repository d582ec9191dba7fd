//! Post-parse passes over the finished tree: heading anchors, table shape
//! repair and footnote section assembly. Everything here is pure tree
//! surgery; no source text is consulted.

use crate::ast::{AttrValue, Node, NodeType, plain_text};
use crate::diagnostic::W_TABLE_RAGGED;
use crate::parse::Session;
use crate::slug::{Slugger, slugify};
use crate::span::Span;

pub(crate) fn finalize(root: &mut Node, session: &mut Session) {
    assign_heading_ids(root, session);
    reshape_tables(root, session);
    build_footnote_section(root, session);
}

/// Walks headings in document order and assigns unique `id` attributes.
/// A custom slug function replaces the base generation only; uniqueness
/// suffixes are always applied on top.
fn assign_heading_ids(root: &mut Node, session: &Session) {
    let mut slugger = Slugger::new();
    visit_headings(root, session, &mut slugger);
}

fn visit_headings(node: &mut Node, session: &Session, slugger: &mut Slugger) {
    if node.kind == NodeType::Heading {
        let text = plain_text(node);
        let base = match &session.slugify {
            Some(custom) => custom(&text),
            None => slugify(&text),
        };
        let id = slugger.assign_base(base);
        node.set_attr("id", AttrValue::Str(id));
    }
    for child in &mut node.children {
        visit_headings(child, session, slugger);
    }
}

/// Pads or truncates body rows so every row matches the header's column
/// count, reporting each repaired row.
fn reshape_tables(node: &mut Node, session: &mut Session) {
    if node.kind == NodeType::Table {
        reshape_table(node, session);
        return;
    }
    for child in &mut node.children {
        reshape_tables(child, session);
    }
}

fn reshape_table(table: &mut Node, session: &mut Session) {
    let columns = match table.attrs.int("columns") {
        Some(count) if count > 0 => count as usize,
        _ => return,
    };
    let aligns: Vec<String> = table
        .attrs
        .str("align")
        .map(|joined| joined.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    for row in &mut table.children {
        if row.kind != NodeType::TableRow {
            continue;
        }
        if row.children.len() == columns {
            continue;
        }
        let header = row.attrs.bool("header").unwrap_or(false);
        let found = row.children.len();
        if found > columns {
            row.children.truncate(columns);
        } else {
            for column in found..columns {
                let mut cell = Node::new(NodeType::TableCell, Span::empty(row.span.end));
                if header {
                    cell.set_attr("header", AttrValue::Bool(true));
                }
                if let Some(align) = aligns.get(column) {
                    if align != "none" {
                        cell.set_attr("align", AttrValue::Str(align.clone()));
                    }
                }
                row.children.push(cell);
            }
        }
        session.push_warning(
            row.span,
            W_TABLE_RAGGED,
            format!("table row has {found} cells, expected {columns}"),
        );
    }
}

/// Lifts footnote definitions out of the content flow. Definitions that were
/// referenced at least once become items of an ordered list appended to the
/// document, sorted by first-reference order; unreferenced definitions are
/// dropped entirely.
fn build_footnote_section(root: &mut Node, session: &mut Session) {
    let mut definitions = Vec::new();
    extract_footnote_defs(root, &mut definitions);
    if definitions.is_empty() {
        return;
    }

    let mut indexed: Vec<(usize, Node)> = Vec::new();
    for mut def in definitions {
        let label = def.attrs.str("label").unwrap_or("").to_string();
        let index = session
            .refs
            .footnote_def(&label)
            .and_then(|entry| entry.index);
        if let Some(index) = index {
            def.set_attr("index", AttrValue::Int(index as i64));
            indexed.push((index, def));
        }
    }
    if indexed.is_empty() {
        return;
    }
    indexed.sort_by_key(|(index, _)| *index);

    let span = Span::empty(root.span.end);
    let items: Vec<Node> = indexed.into_iter().map(|(_, def)| def).collect();
    let mut section = Node::with_children(NodeType::List, span, items);
    section.set_attr("ordered", AttrValue::Bool(true));
    section.set_attr("footnotes", AttrValue::Bool(true));
    root.children.push(section);
}

fn extract_footnote_defs(node: &mut Node, out: &mut Vec<Node>) {
    let mut kept = Vec::with_capacity(node.children.len());
    for mut child in node.children.drain(..) {
        if child.kind == NodeType::FootnoteDefinition {
            out.push(child);
            continue;
        }
        extract_footnote_defs(&mut child, out);
        kept.push(child);
    }
    node.children = kept;
}

#[cfg(test)]
mod tests {
    use crate::ast::NodeType;
    use crate::options::Options;
    use crate::parse::parse;

    #[test]
    fn duplicate_headings_get_unique_ids() {
        let result = parse("# Hello\n\n# Hello\n", &Options::new());
        let ids: Vec<&str> = result
            .root
            .children
            .iter()
            .filter(|node| node.kind == NodeType::Heading)
            .filter_map(|node| node.attrs.str("id"))
            .collect();
        assert_eq!(ids, vec!["hello", "hello-1"]);
    }

    #[test]
    fn ragged_rows_are_padded_to_header_width() {
        let source = "| a | b |\n| --- | --- |\n| only |\n";
        let result = parse(source, &Options::new());
        let table = result
            .root
            .children
            .iter()
            .find(|node| node.kind == NodeType::Table)
            .expect("table parsed");
        for row in &table.children {
            assert_eq!(row.children.len(), 2);
        }
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.code == crate::diagnostic::W_TABLE_RAGGED)
        );
    }

    #[test]
    fn unreferenced_footnotes_are_dropped() {
        let source = "text[^used]\n\n[^used]: kept\n\n[^orphan]: dropped\n";
        let result = parse(source, &Options::new());
        let section = result
            .root
            .children
            .iter()
            .find(|node| node.attrs.bool("footnotes") == Some(true))
            .expect("footnote section");
        assert_eq!(section.children.len(), 1);
        assert_eq!(section.children[0].attrs.str("label"), Some("used"));
    }
}
