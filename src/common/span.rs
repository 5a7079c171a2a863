use std::{
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

use crate::common::source::Source;

/// A `Span` refers to a section of a source,
/// much like a `&str`, but with a reference to a `Source` rather than a `String`.
/// A `Span` is meant to be paired with other datastructures,
/// to be used during error reporting.
#[derive(Clone, Eq, PartialEq)]
pub struct Span {
    source: Rc<Source>,
    offset: usize,
    length: usize,
}

impl Span {
    /// Create a new `Span` from an offset with a length.
    /// All `Span`s have access to the `Source` from whence they came,
    /// So they can't be misinterpreted or miscombined.
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span {
            source: Rc::clone(source),
            offset,
            length,
        }
    }

    /// A `Span` covering an entire `Source`.
    pub fn all(source: &Rc<Source>) -> Span {
        Span::new(source, 0, source.contents.len())
    }

    pub fn source(&self) -> &Rc<Source> {
        &self.source
    }

    /// Return the index of the start of the `Span`.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Return the index of the end of the `Span`.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Creates a new `Span` which spans the space of the previous two.
    /// ```plain
    /// hello this is cool
    /// ^^^^^              | Span a
    ///            ^^      | Span b
    /// ^^^^^^^^^^^^^      | combined
    /// ```
    pub fn combine(a: &Span, b: &Span) -> Span {
        if a.source != b.source {
            panic!("Can't combine two Spans with separate sources");
        }

        let offset = a.offset.min(b.offset);
        let end = a.end().max(b.end());

        Span::new(&a.source, offset, end - offset)
    }

    /// Combines a set of `Span`s (think fold-left over `Span::combine`).
    /// If the vector of spans passed in is empty, this method panics.
    pub fn join(mut spans: Vec<Span>) -> Span {
        let mut combined = spans.pop().expect("Expected at least one span");

        while let Some(span) = spans.pop() {
            combined = Span::combine(&combined, &span)
        }

        combined
    }

    /// Returns the contents of a `Span`.
    /// This indexes into the source file,
    /// so if the `Span` is along an invalid byte boundary,
    /// the program will panic.
    pub fn contents(&self) -> String {
        self.source.contents[self.offset..self.end()].to_string()
    }

    /// The full source lines this `Span` touches.
    pub fn lines(&self) -> Vec<String> {
        let lines: Vec<_> = self.source.contents.split('\n').collect();
        let start_line = self.line(self.offset);
        let end_line = self.line(self.end());

        lines[start_line..=end_line]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn path(&self) -> String {
        self.source.path.to_string_lossy().to_string()
    }

    /// Zero-based line number of a byte index into the source.
    pub fn line(&self, index: usize) -> usize {
        self.source.contents[..index].matches('\n').count()
    }

    /// Zero-based column (in chars) of a byte index into the source.
    pub fn col(&self, index: usize) -> usize {
        self.source.contents[..index]
            .rsplit('\n')
            .next()
            .unwrap_or("")
            .chars()
            .count()
    }

    pub fn format(&self) -> FormattedSpan {
        FormattedSpan {
            path: self.path(),
            start: self.line(self.offset),
            lines: self.lines(),
            start_col: self.col(self.offset),
            end_col: self.col(self.end()),
        }
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("contents", &self.contents())
            .field("start", &self.offset)
            .field("end", &self.end())
            .finish()
    }
}

impl Display for Span {
    /// Given a `Span`, `fmt` will print out where the `Span` occurs in its source.
    /// Single-line `Span`s:
    /// ```plain
    /// 12 | x = blatant { error }
    ///    |     ^^^^^^^^^^^^^^^^^
    /// ```
    /// Multi-line `Span`s:
    /// ```plain
    /// 12 > int Main(){
    /// 13 >     x = y + 1;
    /// 14 > }
    /// ```
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Represents a formatted span, ready to be displayed.
/// Contains information about where the span is from,
/// and where in the text it starts and ends
/// relative to the lines in the source.
pub struct FormattedSpan {
    pub path: String,
    pub start: usize,
    pub lines: Vec<String>,
    pub start_col: usize,
    pub end_col: usize,
}

impl FormattedSpan {
    pub fn gutter_padding(&self) -> usize {
        (self.start + self.lines.len()).to_string().len()
    }

    /// If a single line span, returns the number of carrots between cols.
    pub fn carrots(&self) -> Option<usize> {
        if self.lines.len() == 1 {
            Some(self.end_col.saturating_sub(self.start_col))
        } else {
            None
        }
    }
}

impl Display for FormattedSpan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "In {}:{}:{}",
            self.path,
            self.start + 1,
            self.start_col + 1
        )?;
        let gutter = " ".repeat(self.gutter_padding());
        writeln!(f, "{} |", gutter)?;

        if let Some(carrots) = self.carrots() {
            let line_no = (self.start + 1).to_string();
            let padding = " ".repeat(self.gutter_padding() - line_no.len());
            writeln!(f, "{}{} | {}", padding, line_no, self.lines[0])?;
            writeln!(
                f,
                "{} | {}{}",
                gutter,
                " ".repeat(self.start_col),
                "^".repeat(carrots.max(1)),
            )?;
        } else {
            for (index, line) in self.lines.iter().enumerate() {
                let line_no = (self.start + index + 1).to_string();
                let padding = " ".repeat(self.gutter_padding() - line_no.len());
                writeln!(f, "{}{} > {}", padding, line_no, line)?;
            }
        }

        Ok(())
    }
}

/// A wrapper for spanning types.
/// For example, an instruction emitted by the parser
/// is spanned (a `Spanned<Instruction>`) to indicate which
/// piece of source it was lowered from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Takes a generic item, and wraps in in a `Span` to make it `Spanned`.
    pub fn new(item: T, span: Span) -> Spanned<T> {
        Spanned { item, span }
    }
}
