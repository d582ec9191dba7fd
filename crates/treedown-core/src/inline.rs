//! Inline pass. Each leaf block hands over a contiguous buffer plus a
//! byte-offset map back into the source; the scanner is a single forward
//! pass, with emphasis resolved afterwards over an explicit delimiter stack
//! and links over a bracket stack. No backtracking beyond the recorded
//! stacks, so pathological inputs stay near-linear.

use crate::ast::{AttrValue, Node, NodeType};
use crate::diagnostic::{W_FOOTNOTE_UNRESOLVED, W_REF_UNRESOLVED};
use crate::entities::decode_entity;
use crate::parse::Session;
use crate::refs::normalize_link_label;
use crate::span::Span;

/// Inline source text with per-byte offsets into the original document.
pub(crate) struct InlineInput {
    pub(crate) buffer: String,
    pub(crate) offsets: Vec<usize>,
}

impl InlineInput {
    pub(crate) fn new() -> Self {
        Self {
            buffer: String::new(),
            offsets: Vec::new(),
        }
    }

    pub(crate) fn from_slice(text: &str, offset: usize) -> Self {
        let mut input = Self::new();
        input.push_str(text, offset);
        input
    }

    pub(crate) fn push_str(&mut self, text: &str, offset: usize) {
        self.buffer.push_str(text);
        self.offsets.extend(offset..offset + text.len());
    }

    pub(crate) fn push_newline(&mut self, offset: usize) {
        self.buffer.push('\n');
        self.offsets.push(offset);
    }
}

#[derive(Clone, Debug)]
struct Delimiter {
    ch: u8,
    len: usize,
    node_index: usize,
    can_open: bool,
    can_close: bool,
    orig_can_open: bool,
    orig_can_close: bool,
}

#[derive(Clone, Debug)]
struct BracketEntry {
    node_index: usize,
    /// Buffer position of the `[` (or `!` for images).
    start: usize,
    /// Buffer position of the first byte of the bracket text.
    text_pos: usize,
    image: bool,
    active: bool,
}

impl Session {
    pub(crate) fn parse_inline(&mut self, input: &InlineInput) -> Vec<Node> {
        let buffer = input.buffer.as_str();
        let offsets = input.offsets.as_slice();
        let bytes = buffer.as_bytes();
        let end = bytes.len();

        let mut nodes: Vec<Node> = Vec::new();
        let mut delims: Vec<Delimiter> = Vec::new();
        let mut brackets: Vec<BracketEntry> = Vec::new();
        let mut literal = String::new();
        let mut literal_start = 0usize;
        let mut i = 0usize;

        while i < end {
            let b = bytes[i];
            match b {
                b'\\' => {
                    let next = bytes.get(i + 1).copied();
                    if next == Some(b'\n') {
                        flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                        let mut node =
                            Node::new(NodeType::LineBreak, span_from_offsets(offsets, i, i + 2));
                        node.set_attr("value", AttrValue::Str("\n".to_string()));
                        node.set_attr("hard", AttrValue::Bool(true));
                        nodes.push(node);
                        i += 2;
                        continue;
                    }
                    if next.is_some_and(is_ascii_punctuation) {
                        if literal.is_empty() {
                            literal_start = i;
                        }
                        literal.push(bytes[i + 1] as char);
                        i += 2;
                        continue;
                    }
                    if literal.is_empty() {
                        literal_start = i;
                    }
                    literal.push('\\');
                    i += 1;
                }
                b'`' => {
                    if let Some((node, next)) = self.parse_code_span(buffer, offsets, i, end) {
                        flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                        nodes.push(node);
                        i = next;
                    } else {
                        let run = count_run(bytes, i, end, b'`');
                        if literal.is_empty() {
                            literal_start = i;
                        }
                        literal.push_str(&buffer[i..i + run]);
                        i += run;
                    }
                }
                b'\n' => {
                    let trimmed_len = literal.trim_end_matches(' ').len();
                    let hard = literal.len() - trimmed_len >= 2;
                    literal.truncate(trimmed_len);
                    flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                    let mut node =
                        Node::new(NodeType::LineBreak, span_from_offsets(offsets, i, i + 1));
                    node.set_attr("value", AttrValue::Str("\n".to_string()));
                    node.set_attr("hard", AttrValue::Bool(hard));
                    nodes.push(node);
                    i += 1;
                }
                b'<' => {
                    if let Some((node, next)) = self.parse_autolink(buffer, offsets, i, end) {
                        flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                        nodes.push(node);
                        i = next;
                        continue;
                    }
                    if self.raw_html_enabled {
                        if let Some((node, next)) = self.parse_html_span(buffer, offsets, i, end) {
                            flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                            nodes.push(node);
                            i = next;
                            continue;
                        }
                    }
                    if literal.is_empty() {
                        literal_start = i;
                    }
                    literal.push('<');
                    i += 1;
                }
                b'&' => {
                    if let Some((decoded, next)) = decode_entity(bytes, i, end) {
                        flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                        let text = String::from_utf8_lossy(&decoded).to_string();
                        nodes.push(Node::text(span_from_offsets(offsets, i, next), text));
                        i = next;
                    } else {
                        if literal.is_empty() {
                            literal_start = i;
                        }
                        literal.push('&');
                        i += 1;
                    }
                }
                b'!' => {
                    if bytes.get(i + 1) == Some(&b'[') {
                        flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                        nodes.push(Node::text(span_from_offsets(offsets, i, i + 2), "!["));
                        brackets.push(BracketEntry {
                            node_index: nodes.len() - 1,
                            start: i,
                            text_pos: i + 2,
                            image: true,
                            active: true,
                        });
                        i += 2;
                    } else {
                        if literal.is_empty() {
                            literal_start = i;
                        }
                        literal.push('!');
                        i += 1;
                    }
                }
                b'[' => {
                    if bytes.get(i + 1) == Some(&b'^') {
                        flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                        if let Some(next) =
                            self.parse_footnote_ref(buffer, offsets, i, end, &mut nodes)
                        {
                            i = next;
                            continue;
                        }
                    }
                    flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                    nodes.push(Node::text(span_from_offsets(offsets, i, i + 1), "["));
                    brackets.push(BracketEntry {
                        node_index: nodes.len() - 1,
                        start: i,
                        text_pos: i + 1,
                        image: false,
                        active: true,
                    });
                    i += 1;
                }
                b']' => {
                    flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                    match self.try_close_link(
                        buffer,
                        offsets,
                        end,
                        i,
                        &mut nodes,
                        &mut delims,
                        &mut brackets,
                    ) {
                        Some(next) => i = next,
                        None => {
                            literal_start = i;
                            literal.push(']');
                            i += 1;
                        }
                    }
                }
                b'*' | b'_' | b'~' => {
                    let run = count_run(bytes, i, end, b);
                    // Strikethrough needs exactly a double tilde.
                    if b == b'~' && run != 2 {
                        if literal.is_empty() {
                            literal_start = i;
                        }
                        literal.push_str(&buffer[i..i + run]);
                        i += run;
                        continue;
                    }
                    let (can_open, can_close) = delimiter_properties(buffer, end, i, run, b);
                    flush_literal(&mut nodes, offsets, &mut literal, literal_start, i);
                    nodes.push(Node::text(
                        span_from_offsets(offsets, i, i + run),
                        buffer[i..i + run].to_string(),
                    ));
                    delims.push(Delimiter {
                        ch: b,
                        len: run,
                        node_index: nodes.len() - 1,
                        can_open,
                        can_close,
                        orig_can_open: can_open,
                        orig_can_close: can_close,
                    });
                    i += run;
                }
                _ => {
                    let mut next = i + 1;
                    while next < end && !buffer.is_char_boundary(next) {
                        next += 1;
                    }
                    if literal.is_empty() {
                        literal_start = i;
                    }
                    literal.push_str(&buffer[i..next]);
                    i = next;
                }
            }
        }
        flush_literal(&mut nodes, offsets, &mut literal, literal_start, end);
        self.process_emphasis(&mut nodes, &mut delims);
        autolink_nodes(&mut nodes);
        nodes
    }

    fn parse_footnote_ref(
        &mut self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
        nodes: &mut Vec<Node>,
    ) -> Option<usize> {
        let bytes = buffer.as_bytes();
        let mut i = start + 2;
        while i < end {
            let b = bytes[i];
            if b == b']' {
                break;
            }
            if b.is_ascii_whitespace() || b == b'[' || b == b'^' {
                return None;
            }
            i += 1;
        }
        if i >= end || i == start + 2 {
            return None;
        }
        let label = normalize_link_label(&bytes[start + 2..i]);
        let span = span_from_offsets(offsets, start, i + 1);
        match self.refs.reference_footnote(&label) {
            Some(index) => {
                let mut node = Node::new(NodeType::FootnoteReference, span);
                node.set_attr("label", AttrValue::Str(label));
                node.set_attr("index", AttrValue::Int(index as i64));
                nodes.push(node);
            }
            None => {
                // No definition: keep the marker visible as literal text.
                self.push_warning(
                    span,
                    W_FOOTNOTE_UNRESOLVED,
                    format!("footnote `{label}` has no definition"),
                );
                nodes.push(Node::text(span, buffer[start..i + 1].to_string()));
            }
        }
        Some(i + 1)
    }

    fn parse_code_span(
        &self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> Option<(Node, usize)> {
        let bytes = buffer.as_bytes();
        let run_len = count_run(bytes, start, end, b'`');
        let mut i = start + run_len;
        while i < end {
            if bytes[i] == b'`' {
                let close_len = count_run(bytes, i, end, b'`');
                if close_len == run_len {
                    let mut content = buffer[start + run_len..i].replace('\n', " ");
                    if content.starts_with(' ') && content.ends_with(' ') && content.len() >= 2 {
                        let has_non_space = content.bytes().any(|b| b != b' ');
                        if has_non_space {
                            content = content[1..content.len() - 1].to_string();
                        }
                    }
                    let span = span_from_offsets(offsets, start, i + run_len);
                    let mut node = Node::new(NodeType::CodeInline, span);
                    node.set_attr("value", AttrValue::Str(content));
                    return Some((node, i + run_len));
                }
                i += close_len;
                continue;
            }
            i += 1;
        }
        None
    }

    fn parse_autolink(
        &self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> Option<(Node, usize)> {
        let bytes = buffer.as_bytes();
        if start + 2 >= end {
            return None;
        }
        let mut i = start + 1;
        while i < end {
            let b = bytes[i];
            if b == b'>' {
                break;
            }
            if b.is_ascii_whitespace() || b == b'<' {
                return None;
            }
            i += 1;
        }
        if i >= end || bytes[i] != b'>' {
            return None;
        }
        let inner = &buffer[start + 1..i];
        let url = if is_autolink_scheme(inner) {
            percent_encode_autolink_url(inner)
        } else if is_autolink_email(inner) {
            format!("mailto:{inner}")
        } else {
            return None;
        };

        let span = span_from_offsets(offsets, start, i + 1);
        let child = Node::text(span_from_offsets(offsets, start + 1, i), inner.to_string());
        let mut node = Node::with_children(NodeType::Link, span, vec![child]);
        node.set_attr("url", AttrValue::Str(url));
        Some((node, i + 1))
    }

    fn parse_html_span(
        &self,
        buffer: &str,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> Option<(Node, usize)> {
        let bytes = buffer.as_bytes();
        let rest = &buffer[start..end];
        let close = if rest.starts_with("<!--") {
            rest.find("-->").map(|pos| start + pos + 3)?
        } else if rest.starts_with("<![CDATA[") {
            rest.find("]]>").map(|pos| start + pos + 3)?
        } else if rest.starts_with("<?") {
            rest[2..].find("?>").map(|pos| start + 2 + pos + 2)?
        } else if rest.starts_with("<!") {
            if !bytes.get(start + 2).copied().is_some_and(|b| b.is_ascii_alphabetic()) {
                return None;
            }
            rest.find('>').map(|pos| start + pos + 1)?
        } else {
            scan_html_tag(bytes, start, end)?
        };
        let span = span_from_offsets(offsets, start, close);
        let mut node = Node::new(NodeType::HtmlInline, span);
        node.set_attr("value", AttrValue::Str(buffer[start..close].to_string()));
        Some((node, close))
    }

    #[allow(clippy::too_many_arguments)]
    fn try_close_link(
        &mut self,
        buffer: &str,
        offsets: &[usize],
        end: usize,
        current: usize,
        nodes: &mut Vec<Node>,
        delims: &mut Vec<Delimiter>,
        brackets: &mut Vec<BracketEntry>,
    ) -> Option<usize> {
        let opener_pos = brackets.iter().rposition(|entry| entry.active)?;
        let opener = brackets[opener_pos].clone();
        let bytes = buffer.as_bytes();

        let resolved: (String, Option<String>, usize) = if let Some((url, title, close)) =
            parse_inline_link_destination(buffer, current + 1, end)
        {
            (url, title, close)
        } else {
            let mut next = current + 1;
            let mut label: Option<String> = None;
            let mut explicit = false;
            if next < end && bytes[next] == b'[' {
                if let Some((label_end, _)) = find_bracket_end(bytes, next + 1, end) {
                    let raw = &buffer[next + 1..label_end];
                    if !raw.is_empty() {
                        label = Some(raw.to_string());
                        explicit = true;
                    }
                    next = label_end + 1;
                }
            }
            let text_label = buffer[opener.text_pos..current].to_string();
            let lookup = label.unwrap_or(text_label);
            if lookup.is_empty() {
                brackets.remove(opener_pos);
                return None;
            }
            let normalized = normalize_link_label(lookup.as_bytes());
            match self.refs.link_def(&normalized) {
                Some(def) => (def.url.clone(), def.title.clone(), next - 1),
                None => {
                    if explicit {
                        let span = span_from_offsets(offsets, opener.start, next.min(end));
                        self.push_warning(
                            span,
                            W_REF_UNRESOLVED,
                            format!("unresolved link reference `{normalized}`"),
                        );
                    }
                    brackets.remove(opener_pos);
                    return None;
                }
            }
        };
        let (url, title, close) = resolved;

        if opener.node_index >= nodes.len() {
            return None;
        }
        let mut children = nodes.split_off(opener.node_index + 1);
        nodes.pop()?;

        let mut child_delims = Vec::new();
        let mut remaining = Vec::new();
        for delim in delims.drain(..) {
            if delim.node_index > opener.node_index {
                let mut shifted = delim;
                shifted.node_index -= opener.node_index + 1;
                child_delims.push(shifted);
            } else {
                remaining.push(delim);
            }
        }
        *delims = remaining;
        if !child_delims.is_empty() {
            self.process_emphasis(&mut children, &mut child_delims);
        }

        let span = span_from_offsets(offsets, opener.start, close + 1);
        let kind = if opener.image {
            NodeType::Image
        } else {
            NodeType::Link
        };
        let mut node = Node::with_children(kind, span, children);
        node.set_attr("url", AttrValue::Str(url));
        if let Some(title) = title {
            node.set_attr("title", AttrValue::Str(title));
        }
        nodes.push(node);

        // Links cannot nest: earlier link openers are dead now.
        if !opener.image {
            for entry in brackets.iter_mut() {
                if !entry.image {
                    entry.active = false;
                }
            }
        }
        brackets.retain(|entry| entry.node_index < opener.node_index);
        Some(close + 1)
    }

    fn process_emphasis(&self, nodes: &mut Vec<Node>, delims: &mut Vec<Delimiter>) {
        loop {
            let mut closer_index = None;
            for (idx, delim) in delims.iter().enumerate() {
                if delim.can_close {
                    closer_index = Some(idx);
                    break;
                }
            }
            let closer_index = match closer_index {
                Some(idx) => idx,
                None => break,
            };
            let closer = match delims.get(closer_index) {
                Some(entry) => entry.clone(),
                None => break,
            };
            let mut opener_index = None;
            let mut use_len = 1;
            for idx in (0..closer_index).rev() {
                let opener = match delims.get(idx) {
                    Some(entry) => entry,
                    None => continue,
                };
                if opener.ch != closer.ch || !opener.can_open {
                    continue;
                }
                let candidate = if opener.len >= 2 && closer.len >= 2 { 2 } else { 1 };
                if opener.ch == b'~' && candidate != 2 {
                    continue;
                }
                if opener.ch != b'~' && delimiter_blocked(opener, &closer) {
                    continue;
                }
                opener_index = Some(idx);
                use_len = candidate;
                break;
            }
            let opener_index = match opener_index {
                Some(idx) => idx,
                None => {
                    if let Some(entry) = delims.get_mut(closer_index) {
                        entry.can_close = false;
                    }
                    continue;
                }
            };
            self.apply_emphasis(nodes, delims, opener_index, closer_index, use_len);
        }
    }

    fn apply_emphasis(
        &self,
        nodes: &mut Vec<Node>,
        delims: &mut Vec<Delimiter>,
        opener_index: usize,
        closer_index: usize,
        use_len: usize,
    ) {
        let opener = match delims.get(opener_index) {
            Some(entry) => entry.clone(),
            None => return,
        };
        let closer = match delims.get(closer_index) {
            Some(entry) => entry.clone(),
            None => return,
        };
        if opener.node_index >= closer.node_index {
            return;
        }
        let removed_len = closer.node_index + 1 - opener.node_index;
        let removed: Vec<Node> = nodes
            .drain(opener.node_index..closer.node_index + 1)
            .collect();
        let mut iter = removed.into_iter();
        let opener_node = match iter.next() {
            Some(node) => node,
            None => return,
        };
        let closer_node = match iter.next_back() {
            Some(node) => node,
            None => return,
        };
        let children: Vec<Node> = iter.collect();

        let opener_remain = opener.len.saturating_sub(use_len);
        let closer_remain = closer.len.saturating_sub(use_len);
        let mut replacement = Vec::new();
        if opener_remain > 0 {
            let span = Span {
                start: opener_node.span.start,
                end: opener_node.span.start + opener_remain,
            };
            let text: String = std::iter::repeat(opener.ch as char)
                .take(opener_remain)
                .collect();
            replacement.push(Node::text(span, text));
        }

        let emph_start = opener_node.span.start + opener_remain;
        let emph_span = Span {
            start: emph_start,
            end: closer_node.span.end.saturating_sub(closer_remain).max(emph_start),
        };
        let kind = if opener.ch == b'~' {
            NodeType::Strikethrough
        } else if use_len == 2 {
            NodeType::Strong
        } else {
            NodeType::Emphasis
        };
        replacement.push(Node::with_children(kind, emph_span, children));

        if closer_remain > 0 {
            let span = Span {
                start: closer_node.span.end.saturating_sub(closer_remain),
                end: closer_node.span.end,
            };
            let text: String = std::iter::repeat(closer.ch as char)
                .take(closer_remain)
                .collect();
            replacement.push(Node::text(span, text));
        }

        let replacement_len = replacement.len();
        nodes.splice(opener.node_index..opener.node_index, replacement);

        let delta = replacement_len as isize - removed_len as isize;
        let mut updated = Vec::new();
        for (idx, delim) in delims.iter().enumerate() {
            if idx == opener_index || idx == closer_index {
                continue;
            }
            if delim.node_index < opener.node_index {
                updated.push(delim.clone());
            } else if delim.node_index > closer.node_index {
                let mut shifted = delim.clone();
                if delta.is_negative() {
                    shifted.node_index = shifted.node_index.saturating_sub(delta.unsigned_abs());
                } else {
                    shifted.node_index = shifted.node_index.saturating_add(delta.unsigned_abs());
                }
                updated.push(shifted);
            }
        }

        let mut next_index = opener.node_index;
        if opener_remain > 0 {
            updated.push(Delimiter {
                ch: opener.ch,
                len: opener_remain,
                node_index: next_index,
                can_open: opener.can_open,
                can_close: opener.can_close,
                orig_can_open: opener.orig_can_open,
                orig_can_close: opener.orig_can_close,
            });
            next_index += 1;
        }
        next_index += 1;
        if closer_remain > 0 {
            updated.push(Delimiter {
                ch: closer.ch,
                len: closer_remain,
                node_index: next_index,
                can_open: closer.can_open,
                can_close: closer.can_close,
                orig_can_open: closer.orig_can_open,
                orig_can_close: closer.orig_can_close,
            });
        }
        updated.sort_by_key(|delim| delim.node_index);
        *delims = updated;
    }
}

fn flush_literal(
    nodes: &mut Vec<Node>,
    offsets: &[usize],
    literal: &mut String,
    start: usize,
    end: usize,
) {
    if literal.is_empty() {
        return;
    }
    let span = span_from_offsets(offsets, start, end);
    nodes.push(Node::text(span, std::mem::take(literal)));
}

pub(crate) fn span_from_offsets(offsets: &[usize], start: usize, end: usize) -> Span {
    let fallback = offsets.last().map(|last| last + 1).unwrap_or(0);
    let span_start = offsets.get(start).copied().unwrap_or(fallback);
    let span_end = if end > start {
        offsets.get(end - 1).map(|last| last + 1).unwrap_or(fallback)
    } else {
        span_start
    };
    Span {
        start: span_start,
        end: span_end.max(span_start),
    }
}

fn delimiter_properties(
    buffer: &str,
    end: usize,
    pos: usize,
    run_len: usize,
    delim: u8,
) -> (bool, bool) {
    let before = buffer[..pos].chars().next_back();
    let after_pos = pos + run_len;
    let after = if after_pos < end {
        buffer[after_pos..end].chars().next()
    } else {
        None
    };

    let before_is_whitespace = before.map(|ch| ch.is_whitespace()).unwrap_or(true);
    let after_is_whitespace = after.map(|ch| ch.is_whitespace()).unwrap_or(true);
    let before_is_punctuation = before.is_some_and(is_unicode_punctuation);
    let after_is_punctuation = after.is_some_and(is_unicode_punctuation);

    let left_flanking = !after_is_whitespace
        && (!after_is_punctuation || before_is_whitespace || before_is_punctuation);
    let right_flanking = !before_is_whitespace
        && (!before_is_punctuation || after_is_whitespace || after_is_punctuation);

    if delim == b'_' {
        // Intraword underscores never open or close.
        let can_open = left_flanking && (!right_flanking || before_is_punctuation);
        let can_close = right_flanking && (!left_flanking || after_is_punctuation);
        (can_open, can_close)
    } else {
        (left_flanking, right_flanking)
    }
}

fn is_unicode_punctuation(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_alphanumeric()
}

/// Rule of three: a run that can both open and close cannot pair when the
/// combined length is a multiple of three, unless both lengths are.
fn delimiter_blocked(opener: &Delimiter, closer: &Delimiter) -> bool {
    if opener.ch != closer.ch {
        return false;
    }
    let opener_both = opener.orig_can_open && opener.orig_can_close;
    let closer_both = closer.orig_can_open && closer.orig_can_close;
    if !opener_both && !closer_both {
        return false;
    }
    if (opener.len + closer.len) % 3 != 0 {
        return false;
    }
    opener.len % 3 != 0 || closer.len % 3 != 0
}

fn find_bracket_end(bytes: &[u8], start: usize, end: usize) -> Option<(usize, bool)> {
    let mut i = start;
    let mut depth = 0usize;
    let mut escaped = false;
    let mut had_newline = false;
    while i < end {
        let b = bytes[i];
        if b == b'\n' {
            had_newline = true;
        }
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }
        if b == b'\\' {
            escaped = true;
            i += 1;
            continue;
        }
        if b == b'[' {
            depth += 1;
        } else if b == b']' {
            if depth == 0 {
                return Some((i, had_newline));
            }
            depth -= 1;
        }
        i += 1;
    }
    None
}

pub(crate) fn parse_link_title(bytes: &[u8], start: usize, end: usize) -> Option<(String, usize)> {
    if start >= end {
        return None;
    }
    let open = bytes[start];
    let close = match open {
        b'"' => b'"',
        b'\'' => b'\'',
        b'(' => b')',
        _ => return None,
    };
    let mut i = start + 1;
    let mut out = Vec::new();
    let mut escaped = false;
    while i < end {
        let b = bytes[i];
        if b == b'\n' {
            return None;
        }
        if escaped {
            out.push(b);
            escaped = false;
            i += 1;
            continue;
        }
        if b == b'\\' {
            if i + 1 < end && is_ascii_punctuation(bytes[i + 1]) {
                escaped = true;
                i += 1;
                continue;
            }
            out.push(b'\\');
            i += 1;
            continue;
        }
        if b == close {
            let title = String::from_utf8_lossy(&out).to_string();
            return Some((unescape_and_decode(&title), i + 1));
        }
        out.push(b);
        i += 1;
    }
    None
}

/// Link destination at a definition site: `<...>` or a bare run ending at
/// whitespace. Returns the raw destination and the index past it.
pub(crate) fn parse_plain_destination(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let end = bytes.len();
    if start >= end {
        return None;
    }
    let mut out = Vec::new();
    if bytes[start] == b'<' {
        let mut i = start + 1;
        while i < end {
            let b = bytes[i];
            if b == b'\n' || b == b'<' {
                return None;
            }
            if b == b'\\' && i + 1 < end && is_ascii_punctuation(bytes[i + 1]) {
                out.push(b'\\');
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if b == b'>' {
                let dest = String::from_utf8_lossy(&out).to_string();
                return Some((dest, i + 1));
            }
            out.push(b);
            i += 1;
        }
        return None;
    }
    let mut i = start;
    while i < end && !bytes[i].is_ascii_whitespace() {
        if bytes[i] == b'\\' && i + 1 < end && is_ascii_punctuation(bytes[i + 1]) {
            out.push(b'\\');
            out.push(bytes[i + 1]);
            i += 2;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    if i == start {
        return None;
    }
    Some((String::from_utf8_lossy(&out).to_string(), i))
}

/// `(url "title")` after an inline link's `]`. Returns the encoded URL, the
/// optional title, and the index of the closing `)`.
fn parse_inline_link_destination(
    buffer: &str,
    start: usize,
    end: usize,
) -> Option<(String, Option<String>, usize)> {
    let bytes = buffer.as_bytes();
    let mut i = start;
    if i >= end || bytes[i] != b'(' {
        return None;
    }
    i += 1;
    while i < end && bytes[i].is_ascii_whitespace() {
        if bytes[i] == b'\n' {
            return None;
        }
        i += 1;
    }
    if i >= end {
        return None;
    }

    let mut url_bytes = Vec::new();
    if bytes[i] == b'<' {
        i += 1;
        let mut closed = false;
        while i < end {
            let b = bytes[i];
            if b == b'\n' {
                return None;
            }
            if b == b'\\' {
                if i + 1 < end && is_ascii_punctuation(bytes[i + 1]) {
                    url_bytes.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                url_bytes.push(b'\\');
                i += 1;
                continue;
            }
            if b == b'>' {
                closed = true;
                i += 1;
                break;
            }
            url_bytes.push(b);
            i += 1;
        }
        if !closed {
            return None;
        }
    } else {
        let mut depth = 0usize;
        while i < end {
            let b = bytes[i];
            if b.is_ascii_whitespace() {
                break;
            }
            if b == b'\\' {
                if i + 1 < end && is_ascii_punctuation(bytes[i + 1]) {
                    url_bytes.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                url_bytes.push(b'\\');
                i += 1;
                continue;
            }
            if b == b'(' {
                depth += 1;
                url_bytes.push(b);
                i += 1;
                continue;
            }
            if b == b')' {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                url_bytes.push(b);
                i += 1;
                continue;
            }
            url_bytes.push(b);
            i += 1;
        }
        if depth > 0 {
            return None;
        }
    }

    let url = match String::from_utf8(url_bytes) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
    };
    let url = percent_encode_url(&unescape_and_decode(&url));

    let mut had_space = false;
    while i < end && bytes[i].is_ascii_whitespace() {
        had_space = true;
        i += 1;
    }
    if i >= end {
        return None;
    }
    if bytes[i] == b')' {
        return Some((url, None, i));
    }
    if !had_space {
        return None;
    }

    let (title, next) = parse_link_title(bytes, i, end)?;
    i = next;
    while i < end && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= end || bytes[i] != b')' {
        return None;
    }
    Some((url, Some(title), i))
}

pub(crate) fn is_ascii_punctuation(byte: u8) -> bool {
    byte.is_ascii_punctuation()
}

fn count_run(bytes: &[u8], start: usize, end: usize, needle: u8) -> usize {
    let mut i = start;
    while i < end && bytes[i] == needle {
        i += 1;
    }
    i - start
}

/// Resolves backslash escapes and character references in a raw span, for
/// destinations, titles and info strings.
pub(crate) fn unescape_and_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && i + 1 < bytes.len() && is_ascii_punctuation(bytes[i + 1]) {
            out.push(bytes[i + 1]);
            i += 2;
            continue;
        }
        if b == b'&' {
            if let Some((decoded, next)) = decode_entity(bytes, i, bytes.len()) {
                out.extend_from_slice(&decoded);
                i = next;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
    }
}

/// Percent-encodes spaces and non-ASCII characters; all other ASCII passes
/// through verbatim.
pub(crate) fn percent_encode_url(url: &str) -> String {
    let mut result = String::new();
    for ch in url.chars() {
        if ch == ' ' {
            result.push_str("%20");
        } else if ch.is_ascii() {
            result.push(ch);
        } else {
            let mut buf = [0u8; 4];
            let encoded = ch.encode_utf8(&mut buf);
            for &byte in encoded.as_bytes() {
                result.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    result
}

fn percent_encode_autolink_url(url: &str) -> String {
    let encoded = percent_encode_url(url);
    let encoded = encoded.replace('\\', "%5C");
    let encoded = encoded.replace('[', "%5B");
    encoded.replace(']', "%5D")
}

fn is_autolink_scheme(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() || !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        if b == b':' {
            return i >= 2 && i + 1 < bytes.len();
        }
        if !(b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
            return false;
        }
    }
    false
}

fn is_autolink_email(value: &str) -> bool {
    let mut parts = value.split('@');
    let local = match parts.next() {
        Some(part) if !part.is_empty() => part,
        _ => return false,
    };
    let domain = match parts.next() {
        Some(part) if !part.is_empty() => part,
        _ => return false,
    };
    if parts.next().is_some() {
        return false;
    }
    let local_ok = local.bytes().all(|b| {
        b.is_ascii_alphanumeric()
            || matches!(
                b,
                b'.' | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'/' | b'='
                    | b'?' | b'^' | b'_' | b'`' | b'{' | b'|' | b'}' | b'~' | b'-'
            )
    });
    if !local_ok {
        return false;
    }
    if !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|part| {
        !part.is_empty()
            && !part.starts_with('-')
            && !part.ends_with('-')
            && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

/// Scans a single raw HTML tag (open or close) starting at `<`. Returns
/// the index just past the closing `>`.
pub(crate) fn scan_html_tag(bytes: &[u8], start: usize, end: usize) -> Option<usize> {
    if start >= end || bytes[start] != b'<' {
        return None;
    }
    let mut i = start + 1;
    let closing = if i < end && bytes[i] == b'/' {
        i += 1;
        true
    } else {
        false
    };
    if i >= end || !bytes[i].is_ascii_alphabetic() {
        return None;
    }
    while i < end && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    if closing {
        while i < end && matches!(bytes[i], b' ' | b'\t' | b'\n') {
            i += 1;
        }
        if i < end && bytes[i] == b'>' {
            return Some(i + 1);
        }
        return None;
    }
    loop {
        let ws_start = i;
        while i < end && matches!(bytes[i], b' ' | b'\t' | b'\n') {
            i += 1;
        }
        if i < end && bytes[i] == b'>' {
            return Some(i + 1);
        }
        if i + 1 < end && bytes[i] == b'/' && bytes[i + 1] == b'>' {
            return Some(i + 2);
        }
        if i == ws_start || i >= end {
            return None;
        }
        if !(bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' || bytes[i] == b':') {
            return None;
        }
        while i < end && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b':' | b'.' | b'-'))
        {
            i += 1;
        }
        let mut j = i;
        while j < end && matches!(bytes[j], b' ' | b'\t' | b'\n') {
            j += 1;
        }
        if j < end && bytes[j] == b'=' {
            j += 1;
            while j < end && matches!(bytes[j], b' ' | b'\t' | b'\n') {
                j += 1;
            }
            if j >= end {
                return None;
            }
            let quote = bytes[j];
            if quote == b'"' || quote == b'\'' {
                j += 1;
                while j < end && bytes[j] != quote {
                    j += 1;
                }
                if j >= end {
                    return None;
                }
                j += 1;
            } else {
                let value_start = j;
                while j < end
                    && !bytes[j].is_ascii_whitespace()
                    && !matches!(bytes[j], b'"' | b'\'' | b'=' | b'<' | b'>' | b'`')
                {
                    if bytes[j] == b'/' && j + 1 < end && bytes[j + 1] == b'>' {
                        break;
                    }
                    j += 1;
                }
                if j == value_start {
                    return None;
                }
            }
            i = j;
        }
    }
}

/// Splits bare `http(s)://`, `www.` and e-mail autolinks out of plain text
/// nodes. Runs after emphasis so code spans and explicit links stay intact.
fn autolink_nodes(nodes: &mut Vec<Node>) {
    let mut out = Vec::new();
    for node in nodes.drain(..) {
        match node.kind {
            NodeType::Text => {
                split_autolinks(&node, &mut out);
            }
            NodeType::Emphasis | NodeType::Strong | NodeType::Strikethrough => {
                let mut node = node;
                autolink_nodes(&mut node.children);
                out.push(node);
            }
            _ => out.push(node),
        }
    }
    *nodes = out;
}

fn split_autolinks(node: &Node, out: &mut Vec<Node>) {
    let text = node.value();
    let span = node.span;
    let bytes = text.as_bytes();
    let clamp = |offset: usize| {
        let pos = span.start.saturating_add(offset);
        pos.min(span.end)
    };
    let mut i = 0usize;
    let mut last = 0usize;
    while i < bytes.len() {
        if !text.is_char_boundary(i) {
            i += 1;
            continue;
        }
        if let Some(link) = match_autolink_literal(text, i) {
            if link.start > last {
                let span = Span {
                    start: clamp(last),
                    end: clamp(link.start),
                };
                out.push(Node::text(span, text[last..link.start].to_string()));
            }
            let link_span = Span {
                start: clamp(link.start),
                end: clamp(link.end),
            };
            let child = Node::text(link_span, link.display);
            let mut link_node = Node::with_children(NodeType::Link, link_span, vec![child]);
            link_node.set_attr("url", AttrValue::Str(link.url));
            out.push(link_node);
            i = link.end;
            last = link.end;
            continue;
        }
        i += 1;
    }
    if last == 0 {
        out.push(node.clone());
        return;
    }
    if last < bytes.len() {
        let span = Span {
            start: clamp(last),
            end: clamp(bytes.len()),
        };
        out.push(Node::text(span, text[last..].to_string()));
    }
}

struct AutolinkLiteral {
    start: usize,
    end: usize,
    url: String,
    display: String,
}

fn match_autolink_literal(text: &str, start: usize) -> Option<AutolinkLiteral> {
    let bytes = text.as_bytes();
    let prev = if start == 0 {
        None
    } else {
        bytes.get(start - 1).copied()
    };
    if !is_autolink_boundary(prev) {
        return None;
    }
    if text[start..].starts_with("http://") || text[start..].starts_with("https://") {
        let end = scan_autolink_end(text, start);
        return build_autolink(text, start, end, false);
    }
    if text[start..].starts_with("www.") {
        let end = scan_autolink_end(text, start);
        if end <= start + 4 {
            return None;
        }
        if !text[start + 4..end].contains('.') {
            return None;
        }
        return build_autolink(text, start, end, true);
    }
    let end = scan_email_end(text, start)?;
    let candidate = &text[start..end];
    if candidate.contains('@') && is_autolink_email(candidate) {
        return Some(AutolinkLiteral {
            start,
            end,
            url: format!("mailto:{candidate}"),
            display: candidate.to_string(),
        });
    }
    None
}

fn build_autolink(text: &str, start: usize, end: usize, www: bool) -> Option<AutolinkLiteral> {
    if end <= start {
        return None;
    }
    let display = text[start..end].to_string();
    let url = if www {
        format!("http://{display}")
    } else {
        display.clone()
    };
    // Reject empty authority like a bare "http://".
    let after_scheme = if www {
        display.as_str()
    } else {
        display.split("://").nth(1).unwrap_or("")
    };
    if after_scheme.is_empty() {
        return None;
    }
    Some(AutolinkLiteral {
        start,
        end,
        url: percent_encode_autolink_url(&url),
        display,
    })
}

fn is_autolink_boundary(prev: Option<u8>) -> bool {
    match prev {
        None => true,
        Some(b) => b.is_ascii_whitespace() || matches!(b, b'(' | b'[' | b'{' | b'"' | b'\''),
    }
}

fn scan_autolink_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_whitespace() || matches!(b, b'<' | b'>' | b'"' | b'\'') {
            break;
        }
        end += 1;
    }
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    trim_autolink_punct(text, start, end)
}

fn scan_email_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_whitespace() || matches!(b, b'<' | b'>' | b'"' | b'\'') {
            break;
        }
        end += 1;
    }
    if end == start {
        None
    } else {
        Some(trim_autolink_punct(text, start, end))
    }
}

fn trim_autolink_punct(text: &str, start: usize, mut end: usize) -> usize {
    let bytes = text.as_bytes();
    while end > start {
        let b = bytes[end - 1];
        if matches!(b, b'.' | b',' | b';' | b':' | b'!' | b'?') {
            end -= 1;
            continue;
        }
        break;
    }
    if end > start && bytes[end - 1] == b')' {
        end = trim_autolink_brackets(bytes, start, end, b'(', b')');
    }
    if end > start && bytes[end - 1] == b']' {
        end = trim_autolink_brackets(bytes, start, end, b'[', b']');
    }
    if end > start && bytes[end - 1] == b'}' {
        end = trim_autolink_brackets(bytes, start, end, b'{', b'}');
    }
    end
}

fn trim_autolink_brackets(bytes: &[u8], start: usize, mut end: usize, open: u8, close: u8) -> usize {
    let mut open_count = 0usize;
    let mut close_count = 0usize;
    for b in &bytes[start..end] {
        if *b == open {
            open_count += 1;
        } else if *b == close {
            close_count += 1;
        }
    }
    while end > start && bytes[end - 1] == close && close_count > open_count {
        end -= 1;
        close_count = close_count.saturating_sub(1);
    }
    end
}

#[cfg(test)]
mod tests {
    use crate::ast::{Node, NodeType, plain_text};
    use crate::options::Options;
    use crate::parse::parse;

    fn paragraph(source: &str) -> Node {
        let result = parse(source, &Options::new());
        result
            .root
            .children
            .into_iter()
            .find(|node| node.kind == NodeType::Paragraph)
            .expect("paragraph")
    }

    #[test]
    fn emphasis_nests_inside_emphasis() {
        let para = paragraph("*foo *bar* baz*");
        assert_eq!(para.children.len(), 1);
        let outer = &para.children[0];
        assert_eq!(outer.kind, NodeType::Emphasis);
        assert!(
            outer
                .children
                .iter()
                .any(|child| child.kind == NodeType::Emphasis)
        );
        assert_eq!(plain_text(outer), "foo bar baz");
    }

    #[test]
    fn code_spans_swallow_delimiters() {
        let para = paragraph("*a `b* c`");
        let code = para
            .children
            .iter()
            .find(|child| child.kind == NodeType::CodeInline)
            .expect("code span");
        assert_eq!(code.value(), "b* c");
        assert!(para.children.iter().all(|c| c.kind != NodeType::Emphasis));
    }

    #[test]
    fn double_tilde_is_strikethrough_single_is_literal() {
        let para = paragraph("~~gone~~ and ~kept~");
        assert!(
            para.children
                .iter()
                .any(|child| child.kind == NodeType::Strikethrough)
        );
        assert_eq!(plain_text(&para), "gone and ~kept~");
    }

    #[test]
    fn intraword_underscores_stay_literal() {
        let para = paragraph("snake_case_name");
        assert_eq!(para.children.len(), 1);
        assert_eq!(para.children[0].kind, NodeType::Text);
        assert_eq!(plain_text(&para), "snake_case_name");
    }

    #[test]
    fn bare_autolinks_trim_trailing_punctuation() {
        let para = paragraph("see https://example.com/a.");
        let link = para
            .children
            .iter()
            .find(|child| child.kind == NodeType::Link)
            .expect("link");
        assert_eq!(link.attrs.str("url"), Some("https://example.com/a"));
        assert_eq!(plain_text(&para), "see https://example.com/a.");
    }

    #[test]
    fn angle_autolinks_build_links() {
        let para = paragraph("<https://example.com> and <user@example.com>");
        let urls: Vec<&str> = para
            .children
            .iter()
            .filter(|child| child.kind == NodeType::Link)
            .filter_map(|child| child.attrs.str("url"))
            .collect();
        assert_eq!(urls, vec!["https://example.com", "mailto:user@example.com"]);
    }

    #[test]
    fn entities_decode_to_text() {
        let para = paragraph("fish &amp; chips &#65;");
        assert_eq!(plain_text(&para), "fish & chips A");
    }

    #[test]
    fn two_trailing_spaces_make_a_hard_break() {
        let para = paragraph("a  \nb");
        let brk = para
            .children
            .iter()
            .find(|child| child.kind == NodeType::LineBreak)
            .expect("line break");
        assert_eq!(brk.attrs.bool("hard"), Some(true));
    }

    #[test]
    fn inline_links_carry_title_and_escaped_text() {
        let para = paragraph("[a *b*](/url \"the title\")");
        let link = &para.children[0];
        assert_eq!(link.kind, NodeType::Link);
        assert_eq!(link.attrs.str("url"), Some("/url"));
        assert_eq!(link.attrs.str("title"), Some("the title"));
        assert!(
            link.children
                .iter()
                .any(|child| child.kind == NodeType::Emphasis)
        );
    }

    #[test]
    fn reference_links_resolve_through_definitions() {
        let para = paragraph("[text][label]\n\n[label]: /dest");
        let link = &para.children[0];
        assert_eq!(link.kind, NodeType::Link);
        assert_eq!(link.attrs.str("url"), Some("/dest"));
    }

    #[test]
    fn shortcut_references_use_the_bracket_text() {
        let para = paragraph("[label]\n\n[label]: /dest");
        let link = &para.children[0];
        assert_eq!(link.kind, NodeType::Link);
        assert_eq!(link.attrs.str("url"), Some("/dest"));
    }

    #[test]
    fn unmatched_brackets_fall_back_to_text() {
        let para = paragraph("plain [bracket text");
        assert_eq!(plain_text(&para), "plain [bracket text");
        assert!(para.children.iter().all(|c| c.kind != NodeType::Link));
    }
}
