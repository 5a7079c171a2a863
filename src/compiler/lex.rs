use std::rc::Rc;

use crate::{
    common::{source::Source, span::Span},
    compiler::syntax::{Note, Syntax},
    construct::token::{Delim, Token, TokenKind, Tokens},
};

/// A single left-to-right scan over some region of a source.
/// Bracketed groups are not descended into:
/// a group becomes one token holding its interior text,
/// which is lexed again by whoever needs its contents.
#[derive(Debug)]
pub struct Lexer {
    source: Rc<Source>,
    index: usize,
    end: usize,
    tokens: Tokens,
}

impl Lexer {
    /// Lexes a source file into a stream of tokens.
    pub fn lex(source: Rc<Source>) -> Result<Tokens, Syntax> {
        Lexer::lex_span(&Span::all(&source))
    }

    /// Lexes the region of a source covered by a span,
    /// e.g. the interior of a group token.
    /// Token spans are relative to the whole source, not the region.
    pub fn lex_span(span: &Span) -> Result<Tokens, Syntax> {
        let mut lexer = Lexer {
            source: Rc::clone(span.source()),
            index: span.offset(),
            end: span.end(),
            tokens: vec![],
        };

        // prime the lexer
        lexer.strip();

        // consume all!
        while lexer.index < lexer.end {
            let token = lexer.next_token()?;
            lexer.tokens.push(token);
            lexer.strip();
        }

        Ok(lexer.tokens)
    }

    /// Returns all characters after the current index
    /// position, up to the end of the region being lexed.
    fn remaining(&self) -> &str {
        &self.source.contents[self.index..self.end]
    }

    fn strip(&mut self) {
        let stripped = self.take_while(self.remaining(), char::is_whitespace);
        self.index += stripped;
    }

    /// Counts the bytes of the longest prefix of `text`
    /// whose characters all match `pred`.
    fn take_while(&self, text: &str, pred: impl Fn(char) -> bool) -> usize {
        text.char_indices()
            .find(|(_, c)| !pred(*c))
            .map(|(i, _)| i)
            .unwrap_or(text.len())
    }

    fn span(&self, len: usize) -> Span {
        Span::new(&self.source, self.index, len)
    }

    /// A run of digits, promoted to a float by the first `.` in it.
    /// A second `.` ends the number.
    fn number(&self) -> (TokenKind, usize) {
        let mut kind = TokenKind::Int;
        let mut len = 0;

        for c in self.remaining().chars() {
            match c {
                '0'..='9' => len += 1,
                '.' if kind == TokenKind::Int => {
                    kind = TokenKind::Float;
                    len += 1;
                },
                _ => break,
            }
        }

        (kind, len)
    }

    /// Finds the length of a quoted literal starting at `offset` bytes
    /// past the current index, including both quotes.
    /// A backslash skips the next character, whatever it is.
    fn quoted(&self, offset: usize, quote: char) -> Result<usize, Syntax> {
        let start = self.index + offset;
        let mut chars = self.source.contents[start..self.end].char_indices().skip(1);

        while let Some((i, c)) = chars.next() {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                return Ok(offset + i + c.len_utf8());
            }
        }

        let what = if quote == '"' { "string" } else { "character" };
        Err(Syntax::error_with_note(
            &format!("Unexpected end of source while parsing {} literal", what),
            Note::new_with_hint(
                &format!("the {} literal starting here is never closed", what),
                &Span::new(&self.source, start, quote.len_utf8()),
            ),
        ))
    }

    /// Scans to the bracket that brings the nesting depth back to zero.
    /// Depth is shared between all three bracket kinds;
    /// only the outermost pair has to agree.
    fn group(&self, open: Delim) -> Result<(Token, usize), Syntax> {
        let mut depth = 0;
        let mut offset = 0;

        while self.index + offset < self.end {
            let c = self.source.contents[self.index + offset..]
                .chars()
                .next()
                .expect("index is on a char boundary");

            if c == '"' || c == '\'' {
                offset = self.quoted(offset, c)?;
                continue;
            }

            offset += c.len_utf8();
            if Delim::opened_by(c).is_some() {
                depth += 1;
            } else if let Some(close) = Delim::closed_by(c) {
                depth -= 1;
                if depth > 0 {
                    continue;
                }

                if close != open {
                    return Err(Syntax::error_with_note(
                        &format!(
                            "Mismatched brackets, `{}` is closed by `{}`",
                            open.open(),
                            close.close(),
                        ),
                        Note::new_with_hint("opened here", &self.span(1)),
                    )
                    .add_note(Note::new_with_hint(
                        "closed here",
                        &Span::new(&self.source, self.index + offset - 1, 1),
                    )));
                }

                let text = &self.source.contents[self.index + 1..self.index + offset - 1];
                let token = Token::new(TokenKind::Group(open), text, self.span(offset));
                return Ok((token, offset));
            }
        }

        Err(Syntax::error_with_note(
            &format!("Unclosed opening {}", open),
            Note::new_with_hint(
                &format!("expected a matching `{}` before the end", open.close()),
                &self.span(1),
            ),
        ))
    }

    /// Parses the next token.
    /// Expects all whitespace to be stripped.
    fn next_token(&mut self) -> Result<Token, Syntax> {
        let c = self
            .remaining()
            .chars()
            .next()
            .expect("lexer is not at the end of its region");

        let (token, len) = match c {
            // Iden
            c if c.is_ascii_alphabetic() || c == '_' => {
                let len = self.take_while(self.remaining(), |n| {
                    n.is_ascii_alphanumeric() || n == '_'
                });
                let text = &self.remaining()[..len];
                (Token::new(TokenKind::Iden, text, self.span(len)), len)
            },

            // Number literal, integer or float
            '0'..='9' => {
                let (kind, len) = self.number();
                let text = &self.remaining()[..len];
                (Token::new(kind, text, self.span(len)), len)
            },

            // Grouping
            c if Delim::opened_by(c).is_some() => {
                let delim = Delim::opened_by(c).expect("checked above");
                self.group(delim)?
            },

            // String and character literals keep their raw text
            q @ ('"' | '\'') => {
                let len = self.quoted(0, q)?;
                let text = &self.remaining()[1..len - 1];
                let kind = if q == '"' { TokenKind::Str } else { TokenKind::Char };
                (Token::new(kind, text, self.span(len)), len)
            },

            // Everything else stands on its own
            other => {
                let len = other.len_utf8();
                let text = &self.remaining()[..len];
                (Token::new(TokenKind::Punct, text, self.span(len)), len)
            },
        };

        self.index += len;
        Ok(token)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        Lexer::lex(Source::source(source))
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    /// Well-formed, whitespace-free expressions with nested parentheses.
    fn expression() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            "[a-z_][a-z0-9_]{0,4}",
            "[0-9]{1,5}",
            "[0-9]{1,3}\\.[0-9]{1,3}",
        ];
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (inner.clone(), "[-+*/<>]", inner.clone())
                    .prop_map(|(l, op, r)| format!("{}{}{}", l, op, r)),
                inner.clone().prop_map(|e| format!("({})", e)),
                (inner.clone(), inner).prop_map(|(a, b)| format!("f({},{})", a, b)),
            ]
        })
    }

    proptest! {
        #[test]
        fn doesnt_crash(s in "\\PC*") {
            let result = Lexer::lex(Source::source(&s));
            format!("{:?}", result);
        }

        #[test]
        fn spans_rebuild_expressions(s in expression()) {
            let tokens = Lexer::lex(Source::source(&s)).unwrap();
            let rebuilt = tokens
                .iter()
                .map(|t| t.span.contents())
                .collect::<String>();
            prop_assert_eq!(rebuilt, s);
        }

        #[test]
        fn integers(s in "[0-9]{1,9}") {
            let tokens = kinds(&s);
            prop_assert_eq!(tokens, vec![(TokenKind::Int, s)]);
        }
    }

    #[test]
    fn identifiers_and_punctuation() {
        assert_eq!(kinds("var x_1 = y;"), vec![
            (TokenKind::Iden, "var".to_string()),
            (TokenKind::Iden, "x_1".to_string()),
            (TokenKind::Punct, "=".to_string()),
            (TokenKind::Iden, "y".to_string()),
            (TokenKind::Punct, ";".to_string()),
        ]);
    }

    #[test]
    fn floats_promote_once() {
        assert_eq!(kinds("3.25"), vec![(TokenKind::Float, "3.25".to_string())]);
        assert_eq!(kinds("1.2.3"), vec![
            (TokenKind::Float, "1.2".to_string()),
            (TokenKind::Punct, ".".to_string()),
            (TokenKind::Int, "3".to_string()),
        ]);
    }

    #[test]
    fn groups_are_opaque() {
        let tokens = Lexer::lex(Source::source("f(a, (b)) { x; [y] }")).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::Group(Delim::Paren));
        assert_eq!(tokens[1].text, "a, (b)");
        assert_eq!(tokens[2].kind, TokenKind::Group(Delim::Curly));
        assert_eq!(tokens[2].text, " x; [y] ");
        assert_eq!(tokens[2].span.contents(), "{ x; [y] }");
    }

    #[test]
    fn depth_is_shared_between_kinds() {
        // the inner `(` is closed by `]`, which only the outermost pair cares about
        let tokens = Lexer::lex(Source::source("[(]]")).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Group(Delim::Square));
        assert_eq!(tokens[0].text, "(]");
    }

    #[test]
    fn regroup_interior() {
        let tokens = Lexer::lex(Source::source("x = (1 + (2))")).unwrap();
        let inner = Lexer::lex_span(&tokens[2].inner()).unwrap();
        assert_eq!(inner.len(), 3);
        assert_eq!(inner[2].kind, TokenKind::Group(Delim::Paren));
        assert_eq!(inner[2].span.offset(), 9);
    }

    #[test]
    fn quoted_literals_keep_raw_text() {
        assert_eq!(kinds(r#""a\"b" 'c' '\n'"#), vec![
            (TokenKind::Str, r#"a\"b"#.to_string()),
            (TokenKind::Char, "c".to_string()),
            (TokenKind::Char, r"\n".to_string()),
        ]);
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let tokens = kinds(r#"Print("(]")"#);
        assert_eq!(tokens[1], (TokenKind::Group(Delim::Paren), r#""(]""#.to_string()));
    }

    #[test]
    fn unclosed_group() {
        assert!(Lexer::lex(Source::source("int Main() { (1 + 2 }")).is_err());
        assert!(Lexer::lex(Source::source("(")).is_err());
    }

    #[test]
    fn mismatched_group() {
        let error = Lexer::lex(Source::source("(1 + 2}")).unwrap_err();
        assert_eq!(error.notes.len(), 2);
        assert!(error.reason.contains("Mismatched"));
    }

    #[test]
    fn unclosed_string() {
        assert!(Lexer::lex(Source::source("\"asdf\"\"qwerty")).is_err());
        assert!(Lexer::lex(Source::source("'\\'")).is_err());
    }

    #[test]
    fn new_empty() {
        assert!(Lexer::lex(Source::source("")).unwrap().is_empty());
        assert!(Lexer::lex(Source::source(" \n\t ")).unwrap().is_empty());
    }
}
