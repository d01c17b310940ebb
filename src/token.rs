//! The token definition for URL-style query parameter strings.

/// A token is a single unit of the parameter string, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// A key or subscript segment, still percent-encoded.
    Word(&'a str),
    /// Everything between `=` and the next `&`, still percent-encoded.
    Value(&'a str),

    // Punctuation
    LBracket, // [ or %5B
    RBracket, // ] or %5D
    Eq,       // =
    Amp,      // &
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
