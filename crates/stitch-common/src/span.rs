use serde::Serialize;

/// Byte-offset span into source text. Start is inclusive, end is exclusive.
///
/// Declarations created by the rewriter carry [`Span::SYNTHETIC`]; they have
/// no counterpart in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Span of a declaration that does not exist in source.
    pub const SYNTHETIC: Span = Span {
        start: u32::MAX,
        end: u32::MAX,
    };

    /// Create a new span from byte offsets.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Self { start, end }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_synthetic(&self) -> bool {
        *self == Span::SYNTHETIC
    }

    /// Merge two spans into one that covers both. Synthetic spans are ignored.
    pub fn merge(self, other: Span) -> Span {
        if self.is_synthetic() {
            return other;
        }
        if other.is_synthetic() {
            return self;
        }
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// `self` unless it is synthetic, in which case `fallback`.
    pub fn or(self, fallback: Span) -> Span {
        if self.is_synthetic() {
            fallback
        } else {
            self
        }
    }
}

/// Pre-computed index of line start positions for on-demand line/column lookup.
///
/// Constructed once per source file, then used to convert byte offsets to
/// human-readable (line, column) pairs via binary search.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line. The first entry is always 0.
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to a 1-based (line, column) pair.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        // partition_point returns the first line start past the offset.
        let line_idx = self.line_starts.partition_point(|&start| start <= offset);
        let line_idx = line_idx.saturating_sub(1);
        let line = (line_idx as u32) + 1;
        let col = offset - self.line_starts[line_idx] + 1;
        (line, col)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Render `file:line:col` for the start of a span, or just `file` for
    /// synthetic spans.
    pub fn location(&self, file: &str, span: Span) -> String {
        if span.is_synthetic() {
            return file.to_string();
        }
        let (line, col) = self.line_col(span.start);
        format!("{file}:{line}:{col}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_new_and_len() {
        let span = Span::new(5, 10);
        assert_eq!(span.len(), 5);
        assert!(!span.is_empty());
        assert!(!span.is_synthetic());
    }

    #[test]
    fn span_merge_skips_synthetic() {
        let a = Span::new(5, 10);
        assert_eq!(a.merge(Span::new(8, 15)), Span::new(5, 15));
        assert_eq!(Span::SYNTHETIC.merge(a), a);
        assert_eq!(a.merge(Span::SYNTHETIC), a);
    }

    #[test]
    fn span_or_falls_back_only_for_synthetic() {
        let real = Span::new(1, 2);
        assert_eq!(Span::SYNTHETIC.or(real), real);
        assert_eq!(real.or(Span::new(7, 9)), real);
    }

    #[test]
    fn line_index_multiple_lines() {
        let idx = LineIndex::new("class A\n  val x\nend");
        assert_eq!(idx.line_col(0), (1, 1));
        assert_eq!(idx.line_col(8), (2, 1));
        assert_eq!(idx.line_col(12), (2, 5));
        assert_eq!(idx.line_count(), 3);
    }

    #[test]
    fn location_formats_file_line_col() {
        let idx = LineIndex::new("ab\ncd");
        assert_eq!(idx.location("Foo.kt", Span::new(3, 4)), "Foo.kt:2:1");
        assert_eq!(idx.location("Foo.kt", Span::SYNTHETIC), "Foo.kt");
    }
}
