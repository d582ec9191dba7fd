//! Block structure pass. Each `parse_*` method tries to read one block at
//! `lines[start]` and returns the node plus the index of the first
//! unconsumed line. Order of attempts in [`Session::parse_blocks`] encodes
//! block precedence; paragraph is the fallback, so parsing is total.

use crate::ast::{AttrValue, Node, NodeType};
use crate::diagnostic::W_DUPLICATE_DEFINITION;
use crate::inline::{
    InlineInput, parse_link_title, parse_plain_destination, percent_encode_url, scan_html_tag,
    unescape_and_decode,
};
use crate::normalize::{Line, advance_column, indent_prefix_len, indent_width, remove_indent_columns};
use crate::parse::{MAX_NESTING, Session};
use crate::refs::{FootnoteDef, LinkDef, normalize_link_label, unescape_backslash_punct};
use crate::span::Span;

impl Session {
    pub(crate) fn parse_blocks(&mut self, lines: &[Line]) -> Vec<Node> {
        let mut blocks = Vec::new();
        let mut idx = 0;
        while idx < lines.len() {
            if lines[idx].is_blank() {
                idx += 1;
                continue;
            }
            if let Some((node, next)) = self.parse_fenced_code(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_indented_code(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_atx_heading(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_thematic_break(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_html_block(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_block_quote(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_list(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_table(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_footnote_def(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            if let Some((node, next)) = self.parse_link_ref_def(lines, idx) {
                blocks.push(node);
                idx = next;
                continue;
            }
            let (node, next) = self.parse_paragraph(lines, idx);
            blocks.push(node);
            idx = next;
        }
        blocks
    }

    fn parse_fenced_code(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        let (indent_cols, rest) = split_indent(&line.text);
        if indent_cols >= 4 {
            return None;
        }
        let bytes = rest.as_bytes();
        let fence = *bytes.first()?;
        if fence != b'`' && fence != b'~' {
            return None;
        }
        let fence_len = count_leading(bytes, fence);
        if fence_len < 3 {
            return None;
        }
        let info = rest[fence_len..].trim();
        if fence == b'`' && info.contains('`') {
            return None;
        }

        let mut content = String::new();
        let mut idx = start + 1;
        let mut end_offset = line.end;
        while idx < lines.len() {
            let candidate = &lines[idx];
            let (cand_cols, cand_rest) = split_indent(&candidate.text);
            if cand_cols < 4 {
                let cand_bytes = cand_rest.as_bytes();
                if !cand_bytes.is_empty() && cand_bytes[0] == fence {
                    let close_len = count_leading(cand_bytes, fence);
                    if close_len >= fence_len && cand_rest[close_len..].trim().is_empty() {
                        end_offset = candidate.end;
                        idx += 1;
                        break;
                    }
                }
            }
            // Content keeps its own indentation beyond the fence's.
            content.push_str(&remove_indent_columns(&candidate.text, indent_cols));
            content.push('\n');
            end_offset = candidate.end;
            idx += 1;
        }

        let mut node = Node::new(
            NodeType::CodeBlock,
            Span {
                start: line.start,
                end: end_offset,
            },
        );
        node.set_attr("value", AttrValue::Str(content));
        let lang = info.split_whitespace().next().unwrap_or("");
        if !lang.is_empty() {
            node.set_attr("lang", AttrValue::Str(unescape_backslash_punct(lang)));
        }
        Some((node, idx))
    }

    fn parse_indented_code(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation || indent_width(&line.text) < 4 {
            return None;
        }
        let mut content_lines: Vec<String> = Vec::new();
        let mut idx = start;
        let mut last_content = start;
        while idx < lines.len() {
            let candidate = &lines[idx];
            if candidate.is_blank() {
                content_lines.push(remove_indent_columns(&candidate.text, 4));
            } else if indent_prefix_len(&candidate.text, 4).is_some() {
                content_lines.push(remove_indent_columns(&candidate.text, 4));
                last_content = idx;
            } else {
                break;
            }
            idx += 1;
        }
        // Trailing blank lines belong to whatever follows.
        content_lines.truncate(last_content - start + 1);
        let idx = last_content + 1;

        let mut value = content_lines.join("\n");
        value.push('\n');
        let mut node = Node::new(
            NodeType::CodeBlock,
            Span {
                start: line.start,
                end: lines[last_content].end,
            },
        );
        node.set_attr("value", AttrValue::Str(value));
        Some((node, idx))
    }

    fn parse_atx_heading(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        let (indent_cols, rest) = split_indent(&line.text);
        if indent_cols >= 4 {
            return None;
        }
        let bytes = rest.as_bytes();
        let level = count_leading(bytes, b'#');
        if level == 0 || level > 6 {
            return None;
        }
        match bytes.get(level).copied() {
            None => {}
            Some(b' ') | Some(b'\t') => {}
            Some(_) => return None,
        }

        let mut content = rest[level..].trim();
        // Optional closing run of '#', which must stand alone or follow a
        // space.
        if !content.is_empty() {
            let trimmed = content.trim_end_matches('#');
            if trimmed.is_empty() {
                content = "";
            } else if trimmed.len() < content.len()
                && (trimmed.ends_with(' ') || trimmed.ends_with('\t'))
            {
                content = trimmed.trim_end();
            }
        }

        let span = Span {
            start: line.start,
            end: line.end,
        };
        let children = if content.is_empty() || self.collecting {
            Vec::new()
        } else {
            let offset = line.start + slice_offset(&line.text, content);
            let input = InlineInput::from_slice(content, offset);
            self.parse_inline(&input)
        };
        let mut node = Node::with_children(NodeType::Heading, span, children);
        node.set_attr("level", AttrValue::Int(level as i64));
        Some((node, start + 1))
    }

    fn parse_thematic_break(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation || !is_thematic_break(&line.text) {
            return None;
        }
        let node = Node::new(
            NodeType::ThematicBreak,
            Span {
                start: line.start,
                end: line.end,
            },
        );
        Some((node, start + 1))
    }

    fn parse_html_block(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        if !self.raw_html_enabled {
            return None;
        }
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        let (indent_cols, rest) = split_indent(&line.text);
        if indent_cols >= 4 {
            return None;
        }
        let (end_kind, _) = html_block_start(rest)?;

        let mut raw = Vec::new();
        let mut idx = start;
        let mut end_offset = line.end;
        while idx < lines.len() {
            let candidate = &lines[idx];
            let done = match end_kind {
                HtmlEnd::Blank => {
                    if candidate.is_blank() {
                        break;
                    }
                    false
                }
                HtmlEnd::Container => {
                    let lower = candidate.text.to_ascii_lowercase();
                    ["</script>", "</pre>", "</style>", "</textarea>"]
                        .iter()
                        .any(|close| lower.contains(close))
                }
                HtmlEnd::Marker(marker) => candidate.text.contains(marker),
            };
            raw.push(candidate.text.clone());
            end_offset = candidate.end;
            idx += 1;
            if done {
                break;
            }
        }

        let mut node = Node::new(
            NodeType::HtmlBlock,
            Span {
                start: line.start,
                end: end_offset,
            },
        );
        node.set_attr("value", AttrValue::Str(raw.join("\n")));
        Some((node, idx))
    }

    fn parse_block_quote(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        quote_strip(&line.text)?;
        if self.depth >= MAX_NESTING {
            return None;
        }

        let mut inner: Vec<Line> = Vec::new();
        let mut idx = start;
        let mut end_offset = line.end;
        while idx < lines.len() {
            let candidate = &lines[idx];
            if let Some((stripped, consumed)) = quote_strip(&candidate.text) {
                inner.push(Line {
                    text: stripped,
                    start: candidate.start + consumed,
                    end: candidate.end,
                    has_newline: candidate.has_newline,
                    lazy_continuation: false,
                });
                end_offset = candidate.end;
                idx += 1;
                continue;
            }
            if candidate.is_blank() {
                break;
            }
            // Lazy continuation: a paragraph inside the quote may continue
            // without repeating the marker.
            let continues = inner
                .last()
                .map(|last| !last.is_blank())
                .unwrap_or(false)
                && !self.interrupts_paragraph(&candidate.text);
            if !continues {
                break;
            }
            inner.push(Line {
                text: candidate.text.clone(),
                start: candidate.start,
                end: candidate.end,
                has_newline: candidate.has_newline,
                lazy_continuation: true,
            });
            end_offset = candidate.end;
            idx += 1;
        }

        let variant = inner
            .first()
            .and_then(|first| alert_variant(first.text.trim()));
        self.depth += 1;
        let children = match variant {
            Some(_) => self.parse_blocks(&inner[1..]),
            None => self.parse_blocks(&inner),
        };
        self.depth -= 1;

        let span = Span {
            start: line.start,
            end: end_offset,
        };
        let node = match variant {
            Some(variant) => {
                let mut node = Node::with_children(NodeType::Alert, span, children);
                node.set_attr("variant", AttrValue::Str(variant.to_string()));
                node
            }
            None => Node::with_children(NodeType::BlockQuote, span, children),
        };
        Some((node, idx))
    }

    fn parse_list(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        let first = list_marker(&line.text)?;
        if self.depth >= MAX_NESTING {
            return None;
        }
        // A marker with blank content cannot open a list mid-paragraph; at
        // this point we are at a block boundary, so it can.

        let mut items: Vec<(Vec<Line>, Span)> = Vec::new();
        let mut idx = start;
        let mut loose = false;
        let mut blank_before_item = false;
        let mut list_end = line.end;
        while idx < lines.len() {
            let item_line = &lines[idx];
            if item_line.is_blank() {
                blank_before_item = true;
                idx += 1;
                continue;
            }
            // A thematic break made of the marker character ends the list.
            if is_thematic_break(&item_line.text) {
                break;
            }
            let marker = match list_marker(&item_line.text) {
                Some(marker) if marker.ordered == first.ordered && marker.delim == first.delim => {
                    marker
                }
                _ => break,
            };
            if blank_before_item && !items.is_empty() {
                loose = true;
            }
            blank_before_item = false;

            let item_start = item_line.start;
            let mut item_lines = vec![Line {
                text: item_line.text[marker.content_byte..].to_string(),
                start: item_line.start + marker.content_byte,
                end: item_line.end,
                has_newline: item_line.has_newline,
                lazy_continuation: false,
            }];
            let mut item_end = item_line.end;
            idx += 1;

            let mut pending_blanks = 0usize;
            while idx < lines.len() {
                let cont = &lines[idx];
                if cont.is_blank() {
                    pending_blanks += 1;
                    idx += 1;
                    continue;
                }
                if let Some(prefix) = indent_prefix_len(&cont.text, marker.content_col) {
                    if pending_blanks > 0 {
                        loose = true;
                        for _ in 0..pending_blanks {
                            item_lines.push(Line {
                                text: String::new(),
                                start: cont.start,
                                end: cont.start,
                                has_newline: true,
                                lazy_continuation: false,
                            });
                        }
                        pending_blanks = 0;
                    }
                    item_lines.push(Line {
                        text: remove_indent_columns(&cont.text, marker.content_col),
                        start: cont.start + prefix,
                        end: cont.end,
                        has_newline: cont.has_newline,
                        lazy_continuation: false,
                    });
                    item_end = cont.end;
                    idx += 1;
                    continue;
                }
                if pending_blanks == 0
                    && list_marker(&cont.text).is_none()
                    && !self.interrupts_paragraph(&cont.text)
                    && item_lines.last().map(|last| !last.is_blank()).unwrap_or(false)
                {
                    item_lines.push(Line {
                        text: cont.text.clone(),
                        start: cont.start,
                        end: cont.end,
                        has_newline: cont.has_newline,
                        lazy_continuation: true,
                    });
                    item_end = cont.end;
                    idx += 1;
                    continue;
                }
                break;
            }
            if pending_blanks > 0 {
                blank_before_item = true;
            }
            list_end = item_end;
            items.push((
                item_lines,
                Span {
                    start: item_start,
                    end: item_end,
                },
            ));
        }
        if items.is_empty() {
            return None;
        }

        self.depth += 1;
        let mut item_nodes = Vec::new();
        for (mut item_lines, span) in items {
            let mut task = None;
            if let Some(first_line) = item_lines.first_mut() {
                if let Some((checked, consumed)) = task_marker(&first_line.text) {
                    task = Some(checked);
                    first_line.text = first_line.text[consumed..].to_string();
                    first_line.start += consumed;
                }
            }
            let children = self.parse_blocks(&item_lines);
            let kind = if task.is_some() {
                NodeType::TaskListItem
            } else {
                NodeType::ListItem
            };
            let mut node = Node::with_children(kind, span, children);
            if let Some(checked) = task {
                node.set_attr("checked", AttrValue::Bool(checked));
            }
            item_nodes.push(node);
        }
        self.depth -= 1;

        let tight = !loose;
        if tight {
            for item in &mut item_nodes {
                unwrap_paragraphs(item);
            }
        }
        let mut list = Node::with_children(
            NodeType::List,
            Span {
                start: line.start,
                end: list_end,
            },
            item_nodes,
        );
        list.set_attr("ordered", AttrValue::Bool(first.ordered));
        if first.ordered {
            list.set_attr("start", AttrValue::Int(first.number));
        }
        list.set_attr("tight", AttrValue::Bool(tight));
        Some((list, idx))
    }

    fn parse_table(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        let (indent_cols, header_rest) = split_indent(&line.text);
        if indent_cols >= 4 || !header_rest.contains('|') {
            return None;
        }
        let delim_line = lines.get(start + 1)?;
        let aligns = table_delimiter_row(&delim_line.text)?;
        let header_cells = split_table_row(header_rest);
        if header_cells.len() != aligns.len() {
            return None;
        }

        let header_base = line.start + slice_offset(&line.text, header_rest);
        let mut rows = vec![self.table_row(line, header_base, header_cells, &aligns, true)];
        let mut idx = start + 2;
        let mut end_offset = delim_line.end;
        while idx < lines.len() {
            let candidate = &lines[idx];
            if candidate.is_blank() || candidate.lazy_continuation {
                break;
            }
            let (cand_cols, cand_rest) = split_indent(&candidate.text);
            if cand_cols >= 4 || self.interrupts_paragraph(&candidate.text) {
                break;
            }
            let base = candidate.start + slice_offset(&candidate.text, cand_rest);
            let cells = split_table_row(cand_rest);
            rows.push(self.table_row(candidate, base, cells, &aligns, false));
            end_offset = candidate.end;
            idx += 1;
        }

        let mut table = Node::with_children(
            NodeType::Table,
            Span {
                start: line.start,
                end: end_offset,
            },
            rows,
        );
        table.set_attr("columns", AttrValue::Int(aligns.len() as i64));
        table.set_attr("align", AttrValue::Str(aligns.join(",")));
        Some((table, idx))
    }

    fn table_row(
        &mut self,
        line: &Line,
        base: usize,
        cells: Vec<(String, usize)>,
        aligns: &[String],
        header: bool,
    ) -> Node {
        let mut cell_nodes = Vec::new();
        for (col, (raw, rel)) in cells.into_iter().enumerate() {
            let content = raw.trim();
            let offset = base + rel + slice_offset(&raw, content);
            let children = if content.is_empty() || self.collecting {
                Vec::new()
            } else {
                let input = InlineInput::from_slice(content, offset);
                self.parse_inline(&input)
            };
            let span = Span {
                start: offset.min(line.end),
                end: (offset + content.len()).min(line.end),
            };
            let mut cell = Node::with_children(NodeType::TableCell, span, children);
            cell.set_attr("header", AttrValue::Bool(header));
            if let Some(align) = aligns.get(col) {
                if align != "none" {
                    cell.set_attr("align", AttrValue::Str(align.clone()));
                }
            }
            cell_nodes.push(cell);
        }
        let mut row = Node::with_children(
            NodeType::TableRow,
            Span {
                start: line.start,
                end: line.end,
            },
            cell_nodes,
        );
        row.set_attr("header", AttrValue::Bool(header));
        row
    }

    fn parse_footnote_def(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        let (indent_cols, rest) = split_indent(&line.text);
        if indent_cols >= 4 || !rest.starts_with("[^") {
            return None;
        }
        let bytes = rest.as_bytes();
        let mut close = 2;
        while close < bytes.len() {
            let b = bytes[close];
            if b == b']' {
                break;
            }
            if b.is_ascii_whitespace() || b == b'[' {
                return None;
            }
            close += 1;
        }
        if close == 2 || bytes.get(close) != Some(&b']') || bytes.get(close + 1) != Some(&b':') {
            return None;
        }
        let label = normalize_link_label(&bytes[2..close]);

        let mut body: Vec<Line> = Vec::new();
        let first_content = rest[close + 2..].trim_start();
        if !first_content.is_empty() {
            let offset = line.start + slice_offset(&line.text, first_content);
            body.push(Line {
                text: first_content.to_string(),
                start: offset,
                end: line.end,
                has_newline: line.has_newline,
                lazy_continuation: false,
            });
        }
        let mut idx = start + 1;
        let mut end_offset = line.end;
        let mut pending_blanks = 0usize;
        while idx < lines.len() {
            let cont = &lines[idx];
            if cont.is_blank() {
                pending_blanks += 1;
                idx += 1;
                continue;
            }
            if let Some(prefix) = indent_prefix_len(&cont.text, 4) {
                for _ in 0..pending_blanks {
                    body.push(Line {
                        text: String::new(),
                        start: cont.start,
                        end: cont.start,
                        has_newline: true,
                        lazy_continuation: false,
                    });
                }
                pending_blanks = 0;
                body.push(Line {
                    text: remove_indent_columns(&cont.text, 4),
                    start: cont.start + prefix,
                    end: cont.end,
                    has_newline: cont.has_newline,
                    lazy_continuation: false,
                });
                end_offset = cont.end;
                idx += 1;
                continue;
            }
            if pending_blanks == 0
                && !self.interrupts_paragraph(&cont.text)
                && body.last().map(|last| !last.is_blank()).unwrap_or(false)
            {
                body.push(Line {
                    text: cont.text.clone(),
                    start: cont.start,
                    end: cont.end,
                    has_newline: cont.has_newline,
                    lazy_continuation: true,
                });
                end_offset = cont.end;
                idx += 1;
                continue;
            }
            break;
        }

        let span = Span {
            start: line.start,
            end: end_offset,
        };
        if self.collecting {
            let inserted = self.refs.insert_footnote_def(FootnoteDef {
                label: label.clone(),
                index: None,
                span,
            });
            if !inserted {
                self.push_warning(
                    span,
                    W_DUPLICATE_DEFINITION,
                    format!("footnote `{label}` is defined more than once"),
                );
            }
        }
        self.depth += 1;
        let children = self.parse_blocks(&body);
        self.depth -= 1;
        let mut node = Node::with_children(NodeType::FootnoteDefinition, span, children);
        node.set_attr("label", AttrValue::Str(label));
        Some((node, idx))
    }

    fn parse_link_ref_def(&mut self, lines: &[Line], start: usize) -> Option<(Node, usize)> {
        let line = &lines[start];
        if line.lazy_continuation {
            return None;
        }
        let (indent_cols, rest) = split_indent(&line.text);
        if indent_cols >= 4 || !rest.starts_with('[') || rest.starts_with("[^") {
            return None;
        }
        let bytes = rest.as_bytes();
        let close = find_label_end(bytes, 1)?;
        if close == 1 || bytes.get(close + 1) != Some(&b':') {
            return None;
        }
        let label = normalize_link_label(&bytes[1..close]);
        if label.is_empty() {
            return None;
        }

        let mut consumed = 1;
        let mut after = rest[close + 2..].trim_start();
        if after.is_empty() {
            // Destination on the next line.
            let next = lines.get(start + 1)?;
            if next.is_blank() {
                return None;
            }
            after = next.text.trim_start();
            consumed = 2;
        }
        let after_bytes = after.as_bytes();
        let (dest, dest_end) = parse_plain_destination(after_bytes, 0)?;
        let url = percent_encode_url(&unescape_and_decode(&dest));

        let mut title = None;
        let remainder = after[dest_end..].trim_start();
        if !remainder.is_empty() {
            // A title on the same line must run to the end of it.
            let (parsed, title_end) = parse_link_title(remainder.as_bytes(), 0, remainder.len())?;
            if !remainder[title_end..].trim().is_empty() {
                return None;
            }
            title = Some(parsed);
        } else if let Some(next) = lines.get(start + consumed) {
            // Optional title alone on the following line.
            let candidate = next.text.trim();
            if !candidate.is_empty() {
                if let Some((parsed, title_end)) =
                    parse_link_title(candidate.as_bytes(), 0, candidate.len())
                {
                    if candidate[title_end..].trim().is_empty() {
                        title = Some(parsed);
                        consumed += 1;
                    }
                }
            }
        }

        let end_line = &lines[start + consumed - 1];
        let span = Span {
            start: line.start,
            end: end_line.end,
        };
        if self.collecting {
            let inserted = self.refs.insert_link_def(LinkDef {
                label: label.clone(),
                url: url.clone(),
                title: title.clone(),
                span,
            });
            if !inserted {
                self.push_warning(
                    span,
                    W_DUPLICATE_DEFINITION,
                    format!("link reference `{label}` is defined more than once"),
                );
            }
        }
        let mut node = Node::new(NodeType::LinkReferenceDefinition, span);
        node.set_attr("label", AttrValue::Str(label));
        node.set_attr("url", AttrValue::Str(url));
        if let Some(title) = title {
            node.set_attr("title", AttrValue::Str(title));
        }
        Some((node, start + consumed))
    }

    fn parse_paragraph(&mut self, lines: &[Line], start: usize) -> (Node, usize) {
        let mut idx = start;
        let mut collected: Vec<&Line> = Vec::new();
        let mut setext: Option<i64> = None;
        let mut end_offset = lines[start].end;
        while idx < lines.len() {
            let candidate = &lines[idx];
            if candidate.is_blank() {
                break;
            }
            if !collected.is_empty() && !candidate.lazy_continuation {
                if let Some(level) = setext_level(&candidate.text) {
                    setext = Some(level);
                    end_offset = candidate.end;
                    idx += 1;
                    break;
                }
                if self.interrupts_paragraph(&candidate.text) {
                    break;
                }
            }
            collected.push(candidate);
            end_offset = candidate.end;
            idx += 1;
        }

        let mut input = InlineInput::new();
        let mut prev_end = 0;
        for (n, collected_line) in collected.iter().enumerate() {
            let last = n + 1 == collected.len();
            // Trailing spaces are kept on interior lines so hard breaks can
            // be detected; the final line is fully trimmed.
            let text = if last {
                collected_line.text.trim()
            } else {
                collected_line.text.trim_start()
            };
            let offset = collected_line.start + slice_offset(&collected_line.text, text);
            if n > 0 {
                input.push_newline(prev_end);
            }
            input.push_str(text, offset);
            prev_end = collected_line.end;
        }
        let children = if self.collecting {
            Vec::new()
        } else {
            self.parse_inline(&input)
        };

        let span = Span {
            start: lines[start].start,
            end: end_offset,
        };
        let node = match setext {
            Some(level) => {
                let mut node = Node::with_children(NodeType::Heading, span, children);
                node.set_attr("level", AttrValue::Int(level));
                node
            }
            None => Node::with_children(NodeType::Paragraph, span, children),
        };
        (node, idx)
    }

    /// Whether a line would interrupt a paragraph (and therefore also ends
    /// lazy continuation).
    pub(crate) fn interrupts_paragraph(&self, text: &str) -> bool {
        let (indent_cols, rest) = split_indent(text);
        if indent_cols >= 4 {
            return false;
        }
        if is_thematic_break(text) {
            return true;
        }
        let bytes = rest.as_bytes();
        match bytes.first().copied() {
            Some(b'#') => {
                let level = count_leading(bytes, b'#');
                level <= 6
                    && matches!(bytes.get(level).copied(), None | Some(b' ') | Some(b'\t'))
            }
            Some(b'>') => true,
            Some(b'`') | Some(b'~') => count_leading(bytes, bytes[0]) >= 3,
            Some(b'<') if self.raw_html_enabled => {
                matches!(html_block_start(rest), Some((_, true)))
            }
            _ => match list_marker(text) {
                // Only a list with visible content interrupts, and an
                // ordered one only when it starts at 1.
                Some(marker) => !marker.blank_content && (!marker.ordered || marker.number == 1),
                None => false,
            },
        }
    }
}

fn unwrap_paragraphs(item: &mut Node) {
    let children = std::mem::take(&mut item.children);
    for child in children {
        if child.kind == NodeType::Paragraph {
            item.children.extend(child.children);
        } else {
            item.children.push(child);
        }
    }
}

#[derive(Clone, Copy)]
struct ListItemMarker {
    ordered: bool,
    delim: u8,
    number: i64,
    /// Column continuation lines must be indented to.
    content_col: usize,
    /// Byte index of the content on the marker line.
    content_byte: usize,
    blank_content: bool,
}

fn list_marker(text: &str) -> Option<ListItemMarker> {
    let (indent_cols, rest) = split_indent(text);
    if indent_cols >= 4 {
        return None;
    }
    let indent_bytes = text.len() - rest.len();
    let bytes = rest.as_bytes();
    let (marker_len, ordered, delim, number) = match *bytes.first()? {
        b'-' | b'+' | b'*' => (1, false, bytes[0], 0),
        b'0'..=b'9' => {
            let mut digits = 0;
            while digits < bytes.len() && bytes[digits].is_ascii_digit() {
                digits += 1;
            }
            if digits > 9 {
                return None;
            }
            let delim = *bytes.get(digits)?;
            if delim != b'.' && delim != b')' {
                return None;
            }
            let number: i64 = rest[..digits].parse().ok()?;
            (digits + 1, true, delim, number)
        }
        _ => return None,
    };
    let after = &rest[marker_len..];
    if !after.is_empty() && !after.starts_with(' ') && !after.starts_with('\t') {
        return None;
    }

    let marker_cols = indent_cols + marker_len;
    let mut cols = marker_cols;
    let mut space_bytes = 0;
    for b in after.bytes() {
        match advance_column(cols, b) {
            Some(next) => {
                cols = next;
                space_bytes += 1;
            }
            None => break,
        }
    }
    let space_cols = cols - marker_cols;
    let blank_content = space_bytes == after.len();
    // Five or more spaces after the marker mean indented code in the item:
    // only one space belongs to the marker then.
    let (content_col, content_byte) = if blank_content || space_cols > 4 {
        (
            marker_cols + 1,
            indent_bytes + marker_len + usize::from(space_bytes > 0),
        )
    } else {
        (marker_cols + space_cols, indent_bytes + marker_len + space_bytes)
    };
    Some(ListItemMarker {
        ordered,
        delim,
        number,
        content_col,
        content_byte,
        blank_content,
    })
}

fn task_marker(text: &str) -> Option<(bool, usize)> {
    let bytes = text.as_bytes();
    if bytes.len() < 3 || bytes[0] != b'[' || bytes[2] != b']' {
        return None;
    }
    let checked = match bytes[1] {
        b' ' => false,
        b'x' | b'X' => true,
        _ => return None,
    };
    match bytes.get(3).copied() {
        None => Some((checked, 3)),
        Some(b' ') | Some(b'\t') => Some((checked, 4)),
        Some(_) => None,
    }
}

fn is_thematic_break(text: &str) -> bool {
    let (indent_cols, rest) = split_indent(text);
    if indent_cols >= 4 {
        return false;
    }
    let mut marker = None;
    let mut count = 0usize;
    for ch in rest.chars() {
        if ch == ' ' || ch == '\t' {
            continue;
        }
        match marker {
            None if matches!(ch, '-' | '_' | '*') => {
                marker = Some(ch);
                count = 1;
            }
            Some(m) if ch == m => count += 1,
            _ => return false,
        }
    }
    count >= 3
}

fn setext_level(text: &str) -> Option<i64> {
    let (indent_cols, rest) = split_indent(text);
    if indent_cols >= 4 {
        return None;
    }
    let trimmed = rest.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b == b'=') {
        return Some(1);
    }
    if trimmed.bytes().all(|b| b == b'-') {
        return Some(2);
    }
    None
}

fn quote_strip(text: &str) -> Option<(String, usize)> {
    let (indent_cols, rest) = split_indent(text);
    if indent_cols >= 4 || !rest.starts_with('>') {
        return None;
    }
    let after = &rest[1..];
    let consumed = text.len() - after.len();
    Some((remove_indent_columns(after, 1), consumed))
}

fn alert_variant(trimmed_first_line: &str) -> Option<&'static str> {
    let variants = [
        ("[!NOTE]", "note"),
        ("[!TIP]", "tip"),
        ("[!IMPORTANT]", "important"),
        ("[!WARNING]", "warning"),
        ("[!CAUTION]", "caution"),
    ];
    for (marker, variant) in variants {
        if trimmed_first_line.eq_ignore_ascii_case(marker) {
            return Some(variant);
        }
    }
    None
}

enum HtmlEnd {
    /// script/pre/style/textarea: ends on a line containing the close tag.
    Container,
    /// Ends on a line containing the marker.
    Marker(&'static str),
    /// Ends before the next blank line.
    Blank,
}

/// HTML block opening conditions. The boolean says whether the block may
/// interrupt a paragraph.
fn html_block_start(rest: &str) -> Option<(HtmlEnd, bool)> {
    if !rest.starts_with('<') {
        return None;
    }
    let lower = rest.to_ascii_lowercase();
    for open in ["<script", "<pre", "<style", "<textarea"] {
        if lower.starts_with(open) {
            let next = lower.as_bytes().get(open.len()).copied();
            if matches!(next, None | Some(b' ') | Some(b'\t') | Some(b'>')) {
                return Some((HtmlEnd::Container, true));
            }
        }
    }
    if rest.starts_with("<!--") {
        return Some((HtmlEnd::Marker("-->"), true));
    }
    if rest.starts_with("<?") {
        return Some((HtmlEnd::Marker("?>"), true));
    }
    if rest.starts_with("<![CDATA[") {
        return Some((HtmlEnd::Marker("]]>"), true));
    }
    if rest.starts_with("<!") && rest.as_bytes().get(2).is_some_and(u8::is_ascii_alphabetic) {
        return Some((HtmlEnd::Marker(">"), true));
    }

    let name_start = if lower.starts_with("</") { 2 } else { 1 };
    let bytes = lower.as_bytes();
    let mut name_end = name_start;
    while name_end < bytes.len()
        && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'-')
    {
        name_end += 1;
    }
    if name_end > name_start {
        let name = &lower[name_start..name_end];
        let tail = bytes.get(name_end).copied();
        let clean_tail = matches!(tail, None | Some(b' ') | Some(b'\t') | Some(b'>'))
            || (tail == Some(b'/') && bytes.get(name_end + 1) == Some(&b'>'));
        if clean_tail && BLOCK_TAGS.contains(&name) {
            return Some((HtmlEnd::Blank, true));
        }
    }

    // A complete tag alone on the line opens a non-interrupting block.
    let len = rest.trim_end().len();
    if let Some(end) = scan_html_tag(rest.as_bytes(), 0, len) {
        if end == len {
            return Some((HtmlEnd::Blank, false));
        }
    }
    None
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "center", "col", "colgroup",
    "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset", "figcaption", "figure",
    "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header",
    "hr", "html", "iframe", "legend", "li", "link", "main", "menu", "menuitem", "nav", "noframes",
    "ol", "optgroup", "option", "p", "param", "section", "source", "summary", "table", "tbody",
    "td", "tfoot", "th", "thead", "title", "tr", "track", "ul",
];

fn table_delimiter_row(text: &str) -> Option<Vec<String>> {
    let (indent_cols, rest) = split_indent(text);
    if indent_cols >= 4 || !rest.contains('|') {
        return None;
    }
    let mut aligns = Vec::new();
    for (cell, _) in split_table_row(rest) {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        let left = cell.starts_with(':');
        let right = cell.ends_with(':');
        let dashes = &cell[usize::from(left)..cell.len() - usize::from(right)];
        if dashes.is_empty() || !dashes.bytes().all(|b| b == b'-') {
            return None;
        }
        let align = match (left, right) {
            (true, true) => "center",
            (true, false) => "left",
            (false, true) => "right",
            (false, false) => "none",
        };
        aligns.push(align.to_string());
    }
    if aligns.is_empty() { None } else { Some(aligns) }
}

/// Splits a table row on unescaped pipes. One leading and one trailing pipe
/// are decorative and removed.
fn split_table_row(text: &str) -> Vec<(String, usize)> {
    let bytes = text.as_bytes();
    let mut cells: Vec<(String, usize)> = Vec::new();
    let mut current = String::new();
    let mut cell_start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'|') => {
                current.push_str("\\|");
                i += 2;
            }
            b'|' => {
                cells.push((std::mem::take(&mut current), cell_start));
                i += 1;
                cell_start = i;
            }
            _ => {
                let mut next = i + 1;
                while next < bytes.len() && !text.is_char_boundary(next) {
                    next += 1;
                }
                current.push_str(&text[i..next]);
                i = next;
            }
        }
    }
    cells.push((current, cell_start));
    if text.trim_start().starts_with('|') {
        if let Some(first) = cells.first() {
            if first.0.trim().is_empty() {
                cells.remove(0);
            }
        }
    }
    if text.trim_end().ends_with('|') {
        if let Some(last) = cells.last() {
            if last.0.trim().is_empty() {
                cells.pop();
            }
        }
    }
    cells
}

fn find_label_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    let mut escaped = false;
    while i < bytes.len() {
        let b = bytes[i];
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'[' {
            return None;
        } else if b == b']' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Column width and remainder of a line's leading indentation.
pub(crate) fn split_indent(text: &str) -> (usize, &str) {
    let mut cols = 0usize;
    let mut bytes_used = 0usize;
    for b in text.bytes() {
        match advance_column(cols, b) {
            Some(next) => {
                cols = next;
                bytes_used += 1;
            }
            None => break,
        }
    }
    (cols, &text[bytes_used..])
}

fn count_leading(bytes: &[u8], needle: u8) -> usize {
    bytes.iter().take_while(|&&b| b == needle).count()
}

/// Byte offset of `inner` within `outer`. `inner` must be a subslice.
pub(crate) fn slice_offset(outer: &str, inner: &str) -> usize {
    (inner.as_ptr() as usize).saturating_sub(outer.as_ptr() as usize)
}
