use std::fmt::Display;

use crate::common::span::Span;

/// The three bracket kinds the lexer groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, proptest_derive::Arbitrary)]
pub enum Delim {
    Paren,
    Curly,
    Square,
}

impl Delim {
    pub fn opened_by(c: char) -> Option<Delim> {
        match c {
            '(' => Some(Delim::Paren),
            '{' => Some(Delim::Curly),
            '[' => Some(Delim::Square),
            _ => None,
        }
    }

    pub fn closed_by(c: char) -> Option<Delim> {
        match c {
            ')' => Some(Delim::Paren),
            '}' => Some(Delim::Curly),
            ']' => Some(Delim::Square),
            _ => None,
        }
    }

    pub fn open(&self) -> char {
        match self {
            Delim::Paren => '(',
            Delim::Curly => '{',
            Delim::Square => '[',
        }
    }

    pub fn close(&self) -> char {
        match self {
            Delim::Paren => ')',
            Delim::Curly => '}',
            Delim::Square => ']',
        }
    }
}

impl Display for Delim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Delim::Paren => "parenthesis",
            Delim::Curly => "curly brackets",
            Delim::Square => "square brackets",
        };

        write!(f, "{}", name)
    }
}

/// What a `Token` was lexed as.
/// Groups keep their interior source text un-lexed,
/// it is lexed again on demand by whichever parse step needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, proptest_derive::Arbitrary)]
pub enum TokenKind {
    Iden,
    Int,
    Float,
    Str,
    Char,
    Group(Delim),
    Punct,
}

pub type Tokens = Vec<Token>;

/// A classified lexical unit.
/// `text` is the raw text of the token, except for literals and groups,
/// where it excludes the delimiting characters.
/// `span` always covers the delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str, span: Span) -> Token {
        Token {
            kind,
            text: text.to_string(),
            span,
        }
    }

    pub fn is_iden(&self, name: &str) -> bool {
        self.kind == TokenKind::Iden && self.text == name
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    pub fn is_group(&self, delim: Delim) -> bool {
        self.kind == TokenKind::Group(delim)
    }

    /// The span between the delimiters of a grouped or quoted token.
    /// For every other token this is just the token's span.
    pub fn inner(&self) -> Span {
        match self.kind {
            TokenKind::Group(_) | TokenKind::Str | TokenKind::Char => Span::new(
                self.span.source(),
                self.span.offset() + 1,
                self.span.len() - 2,
            ),
            _ => self.span.clone(),
        }
    }

    /// Joins the spans of a run of tokens.
    /// Returns `None` if there are no tokens.
    pub fn spanning(tokens: &[Token]) -> Option<Span> {
        if tokens.is_empty() {
            return None;
        }
        Some(Span::join(tokens.iter().map(|t| t.span.clone()).collect()))
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // pretty formatting for tokens
        // just use debug if you're not printing a message or something.
        match self.kind {
            TokenKind::Iden => write!(f, "identifier `{}`", self.text),
            TokenKind::Int | TokenKind::Float => {
                write!(f, "number `{}`", self.text)
            },
            TokenKind::Str => write!(f, "string \"{}\"", self.text),
            TokenKind::Char => write!(f, "character '{}'", self.text),
            TokenKind::Group(delim) => write!(f, "tokens grouped by {}", delim),
            TokenKind::Punct => write!(f, "`{}`", self.text),
        }
    }
}
