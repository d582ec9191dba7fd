use treedown_core::{
    NodeType, Options, W_DUPLICATE_DEFINITION, W_FOOTNOTE_UNRESOLVED, compile, parse, plain_text,
};

#[test]
fn setext_underline_beats_thematic_break() {
    let result = parse("Foo\n---\nbar\n", &Options::new());
    let kinds: Vec<NodeType> = result.root.children.iter().map(|node| node.kind).collect();
    assert_eq!(kinds, vec![NodeType::Heading, NodeType::Paragraph]);
    assert_eq!(result.root.children[0].attrs.int("level"), Some(2));
}

#[test]
fn block_structure_wins_over_inline_spans() {
    // The backtick would span the list marker line; the block pass cuts it.
    let result = parse("a `code\n- b`\n", &Options::new());
    let kinds: Vec<NodeType> = result.root.children.iter().map(|node| node.kind).collect();
    assert_eq!(kinds, vec![NodeType::Paragraph, NodeType::List]);
    assert!(
        result.root.children[0]
            .children
            .iter()
            .all(|child| child.kind != NodeType::CodeInline)
    );
}

#[test]
fn first_definition_wins_and_duplicates_warn_once() {
    let source = "[ref][l]\n\n[l]: /first\n\n[l]: /second\n";
    let result = parse(source, &Options::new());
    let link = result.root.children[0]
        .children
        .iter()
        .find(|child| child.kind == NodeType::Link)
        .expect("link");
    assert_eq!(link.attrs.str("url"), Some("/first"));

    let dups: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|diag| diag.code == W_DUPLICATE_DEFINITION)
        .collect();
    assert_eq!(dups.len(), 1);
}

#[test]
fn undefined_footnote_stays_visible_with_a_warning() {
    let result = parse("text[^nope]\n", &Options::new());
    assert_eq!(plain_text(&result.root.children[0]), "text[^nope]");
    assert!(
        result
            .diagnostics
            .iter()
            .any(|diag| diag.code == W_FOOTNOTE_UNRESOLVED)
    );
}

#[test]
fn heading_plain_text_strips_markup() {
    let result = parse("# Hello *world*\n", &Options::new());
    let heading = &result.root.children[0];
    assert_eq!(plain_text(heading), "Hello world");
    assert_eq!(heading.attrs.str("id"), Some("hello-world"));
}

#[test]
fn deeply_nested_quotes_are_capped_not_crashed() {
    let mut source = String::new();
    for _ in 0..80 {
        source.push_str("> ");
    }
    source.push_str("deep\n");
    let result = parse(&source, &Options::new());
    assert!(!result.root.children.is_empty());

    let mut depth = 0;
    let mut node = &result.root.children[0];
    while node.kind == NodeType::BlockQuote {
        depth += 1;
        match node.children.first() {
            Some(child) => node = child,
            None => break,
        }
    }
    assert!(depth <= 64, "quote depth {} exceeds the cap", depth);
}

#[test]
fn disabling_raw_html_turns_tags_into_text() {
    let options = Options {
        disable_parsing_raw_html: true,
        ..Options::new()
    };
    let result = compile("<div>hi</div>\n", &options).unwrap();
    assert!(result.output.contains("&lt;div&gt;"));
    assert!(!result.output.contains("<div>"));
}

#[test]
fn raw_html_passes_through_by_default() {
    let result = compile("<div>\nhi\n</div>\n", &Options::new()).unwrap();
    assert!(result.output.contains("<div>"));
}

#[test]
fn code_fence_info_strings_keep_non_ascii() {
    let result = compile("```café\nlet x = 1;\n```\n", &Options::new()).unwrap();
    assert!(result.output.contains("language-café"));
}

#[test]
fn plain_text_round_trips_soft_line_breaks() {
    let result = parse("line one\nline two\n", &Options::new());
    assert_eq!(plain_text(&result.root.children[0]), "line one\nline two");

    let brk = result.root.children[0]
        .children
        .iter()
        .find(|child| child.kind == NodeType::LineBreak)
        .expect("line break");
    assert_eq!(brk.attrs.str("value"), Some("\n"));
}

#[test]
fn tables_keep_a_rectangular_shape() {
    let source = "| a | b | c |\n| - | - | - |\n| 1 |\n| 1 | 2 | 3 | 4 |\n";
    let result = parse(source, &Options::new());
    let table = result
        .root
        .children
        .iter()
        .find(|node| node.kind == NodeType::Table)
        .expect("table");
    for row in &table.children {
        assert_eq!(row.children.len(), 3);
    }
}

#[test]
fn footnotes_number_in_reference_order() {
    let source = "b[^b] then a[^a]\n\n[^a]: first defined\n\n[^b]: second defined\n";
    let result = parse(source, &Options::new());
    let section = result
        .root
        .children
        .iter()
        .find(|node| node.attrs.bool("footnotes") == Some(true))
        .expect("footnote section");
    let labels: Vec<&str> = section
        .children
        .iter()
        .filter_map(|def| def.attrs.str("label"))
        .collect();
    assert_eq!(labels, vec!["b", "a"]);
    assert_eq!(section.children[0].attrs.int("index"), Some(1));
}

#[test]
fn task_list_items_carry_checked_state() {
    let result = parse("- [x] done\n- [ ] todo\n", &Options::new());
    let list = &result.root.children[0];
    assert_eq!(list.children[0].kind, NodeType::TaskListItem);
    assert_eq!(list.children[0].attrs.bool("checked"), Some(true));
    assert_eq!(list.children[1].attrs.bool("checked"), Some(false));
}

#[test]
fn loose_lists_keep_item_paragraphs() {
    let result = parse("- a\n\n- b\n", &Options::new());
    let list = &result.root.children[0];
    assert_eq!(list.attrs.bool("tight"), Some(false));
    assert_eq!(list.children[0].children[0].kind, NodeType::Paragraph);

    let tight = parse("- a\n- b\n", &Options::new());
    let list = &tight.root.children[0];
    assert_eq!(list.attrs.bool("tight"), Some(true));
    assert_eq!(list.children[0].children[0].kind, NodeType::Text);
}
