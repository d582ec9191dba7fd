use crate::span::Span;

/// Zero-based line/character position. `character` counts characters from
/// the line start, not bytes, so multi-byte text reports the column an
/// editor shows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// Translates byte spans in the original source into line/character ranges
/// for diagnostics.
#[derive(Clone, Debug)]
pub struct SourceMap {
    source: String,
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            source: source.to_string(),
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of a byte offset. Offsets past the end clamp to the last
    /// position; offsets inside a multi-byte character snap back to its
    /// start.
    pub fn position(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.source.len());
        while offset > 0 && !self.source.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.line_starts[line];
        Position {
            line,
            character: self.source[line_start..offset].chars().count(),
        }
    }

    pub fn range(&self, span: Span) -> Range {
        Range {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Position, SourceMap};
    use crate::span::Span;

    #[test]
    fn character_columns_count_chars_not_bytes() {
        let source = "héllo\nwörld\n";
        let map = SourceMap::new(source);

        // `é` occupies two bytes but one column.
        assert_eq!(
            map.position("hé".len()),
            Position {
                line: 0,
                character: 2
            }
        );
        assert_eq!(
            map.position(source.find('d').unwrap()),
            Position {
                line: 1,
                character: 4
            }
        );
    }

    #[test]
    fn ranges_span_lines_and_clamp_to_the_source() {
        let map = SourceMap::new("ab\ncd");
        assert_eq!(map.line_count(), 2);

        let range = map.range(Span { start: 1, end: 4 });
        assert_eq!(
            range.start,
            Position {
                line: 0,
                character: 1
            }
        );
        assert_eq!(
            range.end,
            Position {
                line: 1,
                character: 1
            }
        );

        assert_eq!(
            map.position(999),
            Position {
                line: 1,
                character: 2
            }
        );
    }

    #[test]
    fn offsets_inside_a_multibyte_char_snap_back() {
        let map = SourceMap::new("é");
        assert_eq!(
            map.position(1),
            Position {
                line: 0,
                character: 0
            }
        );
    }
}
