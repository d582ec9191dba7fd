//! Line-level view of the source. The block scanner works on whole lines;
//! byte spans are kept so every node can point back into the original text.

#[derive(Clone, Debug)]
pub(crate) struct Line {
    pub(crate) text: String,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) has_newline: bool,
    pub(crate) lazy_continuation: bool,
}

impl Line {
    pub(crate) fn is_blank(&self) -> bool {
        self.text.bytes().all(|b| b == b' ' || b == b'\t')
    }
}

pub(crate) fn split_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (idx, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            let mut text = &source[start..idx];
            // Normalize CRLF; a bare CR inside a line is left alone.
            if text.ends_with('\r') {
                text = &text[..text.len() - 1];
            }
            lines.push(Line {
                text: text.to_string(),
                start,
                end: idx,
                has_newline: true,
                lazy_continuation: false,
            });
            start = idx + 1;
        }
    }
    if start <= source.len() {
        let text = source[start..].to_string();
        lines.push(Line {
            text,
            start,
            end: source.len(),
            has_newline: false,
            lazy_continuation: false,
        });
    }
    lines
}

/// Advances a column counter over one byte of indentation. Tabs snap to the
/// next multiple of four. Returns `None` on the first non-indent byte.
pub(crate) fn advance_column(columns: usize, byte: u8) -> Option<usize> {
    match byte {
        b' ' => Some(columns + 1),
        b'\t' => Some(columns + (4 - (columns % 4))),
        _ => None,
    }
}

/// Indentation width of a line in columns.
pub(crate) fn indent_width(text: &str) -> usize {
    let mut columns = 0;
    for byte in text.bytes() {
        match advance_column(columns, byte) {
            Some(next) => columns = next,
            None => break,
        }
    }
    columns
}

/// Byte length of the prefix needed to cover at least `required` columns of
/// indentation, or `None` when the line is not indented that far.
pub(crate) fn indent_prefix_len(text: &str, required: usize) -> Option<usize> {
    if required == 0 {
        return Some(0);
    }
    let bytes = text.as_bytes();
    let mut columns = 0;
    for (idx, byte) in bytes.iter().enumerate() {
        let next_cols = match advance_column(columns, *byte) {
            Some(next) => next,
            None => break,
        };
        columns = next_cols;
        if columns >= required {
            return Some(idx + 1);
        }
    }
    None
}

/// Removes up to `columns` columns of indentation from the start of a line,
/// expanding tabs. A tab straddling the boundary contributes the leftover
/// spaces to the output.
pub(crate) fn remove_indent_columns(text: &str, columns: usize) -> String {
    let bytes = text.as_bytes();
    let mut col = 0;
    let mut byte_pos = 0;

    while byte_pos < bytes.len() && col < columns {
        match bytes[byte_pos] {
            b' ' => {
                col += 1;
                byte_pos += 1;
            }
            b'\t' => {
                let next_col = col + (4 - (col % 4));
                if next_col > columns {
                    break;
                }
                col = next_col;
                byte_pos += 1;
            }
            _ => break,
        }
    }

    let mut result = String::new();
    if col < columns && byte_pos < bytes.len() && bytes[byte_pos] == b'\t' {
        let tab_end = col + (4 - (col % 4));
        for _ in 0..tab_end.saturating_sub(columns) {
            result.push(' ');
        }
        byte_pos += 1;
    }
    result.push_str(&text[byte_pos..]);
    result
}

#[cfg(test)]
mod tests {
    use super::{indent_prefix_len, indent_width, remove_indent_columns, split_lines};

    #[test]
    fn split_lines_keeps_offsets() {
        let lines = split_lines("one\ntwo\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "one");
        assert_eq!(lines[1].start, 4);
        assert!(lines[1].has_newline);
        assert_eq!(lines[2].text, "");
        assert!(!lines[2].has_newline);
    }

    #[test]
    fn split_lines_strips_carriage_return() {
        let lines = split_lines("a\r\nb");
        assert_eq!(lines[0].text, "a");
        assert_eq!(lines[1].text, "b");
    }

    #[test]
    fn tabs_count_to_the_next_stop() {
        assert_eq!(indent_width("\tfoo"), 4);
        assert_eq!(indent_width("  \tfoo"), 4);
        assert_eq!(indent_prefix_len("\tfoo", 4), Some(1));
        assert_eq!(indent_prefix_len("  foo", 4), None);
    }

    #[test]
    fn partial_tab_removal_emits_spaces() {
        assert_eq!(remove_indent_columns("\tfoo", 2), "  foo");
        assert_eq!(remove_indent_columns("    foo", 4), "foo");
    }
}
