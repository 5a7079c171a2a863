use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{
    common::{
        source::Source,
        span::{Span, Spanned},
    },
    compiler::{
        lex::Lexer,
        syntax::{Note, Syntax},
    },
    construct::{
        function::{FunId, FunctionDef, Program, TypeDesc, Variable},
        instruction::Instruction,
        token::{Delim, Token, TokenKind},
    },
};

/// Instructions lowered from some piece of source,
/// each annotated with where it came from.
pub type Code = Vec<Spanned<Instruction>>;

/// Identifiers that start a statement form.
/// A tail expression may not start with one.
const STATEMENT_KEYWORDS: &[&str] = &[
    "var", "goto", "goto_if", "while", "if", "else", "break", "continue", "return",
];

/// Jump targets of the innermost `while`.
struct Loop {
    start: String,
    end: String,
}

/// Parse state for the body of one function.
struct Body {
    fun: FunId,
    loops: Vec<Loop>,
    labels: HashSet<String>,
    synthesized: usize,
}

impl Body {
    fn new(fun: FunId) -> Body {
        Body {
            fun,
            loops: vec![],
            labels: HashSet::new(),
            synthesized: 0,
        }
    }
}

/// Turns source text into a `Program`.
/// Top-level declarations are registered before any body is parsed,
/// so a block-argument call may name a function declared further down.
/// Anonymous functions are appended as their call sites are reached,
/// linked to the function whose body was being parsed at the time.
pub struct Parser {
    pub(super) functions: Vec<FunctionDef>,
    pub(super) signatures: HashMap<String, FunId>,
    bodies: Vec<Body>,
    pub(super) anonymous: usize,
}

impl Parser {
    pub fn parse(source: Rc<Source>) -> Result<Program, Syntax> {
        let tokens = Lexer::lex(source)?;

        let mut parser = Parser {
            functions: vec![],
            signatures: HashMap::new(),
            bodies: vec![],
            anonymous: 0,
        };

        for (id, body) in parser.declarations(&tokens)? {
            parser.function_body(id, &body)?;
        }

        Ok(Program {
            functions: parser.functions,
        })
    }

    /// Registers every `returnType name(params) { body }` declaration,
    /// returning the bodies still to be parsed.
    fn declarations(&mut self, tokens: &[Token]) -> Result<Vec<(FunId, Token)>, Syntax> {
        let mut bodies = vec![];
        let mut rest = tokens;

        while !rest.is_empty() {
            if rest.len() < 4 {
                return Err(Syntax::error_with_note(
                    "Expected a function declaration",
                    Note::new_with_hint(
                        "declarations look like `type name(params) { body }`",
                        &Token::spanning(rest).expect("rest is not empty"),
                    ),
                ));
            }

            let (declaration, tail) = rest.split_at(4);
            let (returns, name, params, body) = (
                &declaration[0],
                &declaration[1],
                &declaration[2],
                &declaration[3],
            );

            if returns.kind != TokenKind::Iden {
                return Err(Syntax::error(
                    &format!("Expected a return type, found {}", returns),
                    &returns.span,
                ));
            }
            if name.kind != TokenKind::Iden {
                return Err(Syntax::error(
                    &format!("Expected a function name, found {}", name),
                    &name.span,
                ));
            }
            if !params.is_group(Delim::Paren) {
                return Err(Syntax::error(
                    &format!("Expected a parenthesized parameter list, found {}", params),
                    &params.span,
                ));
            }
            if !body.is_group(Delim::Curly) {
                return Err(Syntax::error(
                    &format!("Expected a function body in curly brackets, found {}", body),
                    &body.span,
                ));
            }
            if self.signatures.contains_key(&name.text) {
                return Err(Syntax::error(
                    &format!("Function `{}` is declared more than once", name.text),
                    &name.span,
                ));
            }

            let params = self.parameters(params, false)?;
            let id = FunId(self.functions.len());
            self.functions
                .push(FunctionDef::new(&returns.text, &name.text, params));
            self.signatures.insert(name.text.clone(), id);
            bodies.push((id, body.clone()));

            rest = tail;
        }

        Ok(bodies)
    }

    /// Parses a parameter list: `type name`, `(sig) name`, or `type (sig) name`,
    /// separated by commas. Inside a delegate signature, names may be
    /// integer placeholders.
    fn parameters(&self, group: &Token, placeholders: bool) -> Result<Vec<Variable>, Syntax> {
        let tokens = Lexer::lex_span(&group.inner())?;
        let mut variables: Vec<Variable> = vec![];

        for param in split_commas(&tokens)? {
            let (ty, name) = match param {
                [ty, name] if ty.kind == TokenKind::Iden => {
                    (TypeDesc::Primitive(ty.text.clone()), name)
                },
                [sig, name] if sig.is_group(Delim::Paren) => {
                    (self.delegate("void", sig)?, name)
                },
                [returns, sig, name]
                    if returns.kind == TokenKind::Iden && sig.is_group(Delim::Paren) =>
                {
                    (self.delegate(&returns.text, sig)?, name)
                },
                _ => {
                    return Err(Syntax::error_with_note(
                        "Expected a parameter",
                        Note::new_with_hint(
                            "parameters look like `type name` or `(signature) name`",
                            &Token::spanning(param).expect("split_commas never yields empty runs"),
                        ),
                    ))
                },
            };

            let named = name.kind == TokenKind::Iden
                || (placeholders && name.kind == TokenKind::Int);
            if !named {
                return Err(Syntax::error(
                    &format!("Expected a parameter name, found {}", name),
                    &name.span,
                ));
            }
            if variables.iter().any(|v| v.name == name.text) {
                return Err(Syntax::error(
                    &format!("Parameter `{}` is declared more than once", name.text),
                    &name.span,
                ));
            }

            variables.push(Variable::new(ty, &name.text));
        }

        Ok(variables)
    }

    fn delegate(&self, returns: &str, sig: &Token) -> Result<TypeDesc, Syntax> {
        Ok(TypeDesc::Delegate {
            signature: sig.text.trim().to_string(),
            params: self.parameters(sig, true)?,
            returns: returns.to_string(),
        })
    }

    /// Parses the body of an already registered function.
    /// The last statement of the body, if unterminated,
    /// is the function's tail expression.
    pub(super) fn function_body(&mut self, id: FunId, body: &Token) -> Result<(), Syntax> {
        self.bodies.push(Body::new(id));
        let code = self.block(body, true);
        self.bodies.pop();

        self.functions[id.0].emit_all(code?);
        Ok(())
    }

    /// The function whose body is being parsed.
    pub(super) fn current(&self) -> FunId {
        self.body().fun
    }

    fn body(&self) -> &Body {
        self.bodies.last().expect("always parsing inside a function body")
    }

    fn body_mut(&mut self) -> &mut Body {
        self.bodies.last_mut().expect("always parsing inside a function body")
    }

    /// Makes a label name that source code can not spell.
    fn synthesize(&mut self, kind: &str) -> String {
        let body = self.body_mut();
        let label = format!("${}{}", kind, body.synthesized);
        body.synthesized += 1;
        label
    }

    /// Parses the statements inside a curly-bracket group.
    fn block(&mut self, group: &Token, tail: bool) -> Result<Code, Syntax> {
        let tokens = Lexer::lex_span(&group.inner())?;
        let statements = split_statements(&tokens);
        let tail_at = if tail { tail_position(&statements) } else { None };
        let mut code = vec![];

        let mut index = 0;
        while index < statements.len() {
            if statements[index].is_empty() {
                index += 1;
            } else if tail_at == Some(index) {
                code.append(&mut self.tail(statements[index])?);
                index += 1;
            } else {
                index += self.statement(&statements[index..], &mut code)?;
            }
        }

        Ok(code)
    }

    /// The value of an unterminated final statement is the function's result.
    fn tail(&mut self, tokens: &[Token]) -> Result<Code, Syntax> {
        if is_statement_form(tokens) {
            let span = Token::spanning(tokens).expect("tail is not empty");
            return Err(Syntax::error_with_note(
                "Expected `;` after this statement",
                Note::new_with_hint(
                    "only an expression may end a function body without a `;`",
                    &span,
                ),
            ));
        }

        self.expression(tokens, &tokens[0].span)
    }

    /// Parses the first statement of `statements`, appending its code.
    /// Returns how many statements were consumed;
    /// an `if` consumes the `else` following it.
    fn statement(&mut self, statements: &[&[Token]], code: &mut Code) -> Result<usize, Syntax> {
        let tokens = statements[0];
        let first = &tokens[0];
        let whole = Token::spanning(tokens).expect("statements are not empty");

        // name = expr
        if tokens.len() > 1 && first.kind == TokenKind::Iden && tokens[1].is_punct("=") {
            if tokens.len() < 3 {
                return Err(Syntax::error("Expected an expression after `=`", &tokens[1].span));
            }
            code.append(&mut self.expression(&tokens[2..], &tokens[1].span)?);
            code.push(Spanned::new(Instruction::SetLocal(first.text.clone()), first.span.clone()));
            return Ok(1);
        }

        // name:
        if tokens.last().map_or(false, |t| t.is_punct(":")) {
            return match tokens {
                [name, _] if name.kind == TokenKind::Iden => {
                    if !self.body_mut().labels.insert(name.text.clone()) {
                        return Err(Syntax::error(
                            &format!("Label `{}` is declared more than once", name.text),
                            &name.span,
                        ));
                    }
                    code.push(Spanned::new(Instruction::Label(name.text.clone()), name.span.clone()));
                    Ok(1)
                },
                _ => Err(Syntax::error("Expected a single label name before `:`", &whole)),
            };
        }

        if first.kind != TokenKind::Iden {
            return self.expression_statement(tokens, code);
        }

        match first.text.as_str() {
            "var" => match tokens {
                [_, name, eq, expr @ ..]
                    if name.kind == TokenKind::Iden && eq.is_punct("=") && !expr.is_empty() =>
                {
                    code.append(&mut self.expression(expr, &eq.span)?);
                    code.push(Spanned::new(
                        Instruction::DeclareLocal(name.text.clone()),
                        name.span.clone(),
                    ));
                    Ok(1)
                },
                _ => Err(Syntax::error("Expected `var name = expression`", &whole)),
            },

            "goto_if" => match tokens {
                [_, cond, label] if cond.is_group(Delim::Paren) && label.kind == TokenKind::Iden => {
                    code.append(&mut self.expression(&tokens[1..2], &cond.span)?);
                    code.push(Spanned::new(
                        Instruction::GotoIfTrue(label.text.clone()),
                        label.span.clone(),
                    ));
                    Ok(1)
                },
                _ => Err(Syntax::error("Expected `goto_if (condition) label`", &whole)),
            },

            "goto" => match tokens {
                [_, label] if label.kind == TokenKind::Iden => {
                    code.push(Spanned::new(Instruction::Goto(label.text.clone()), label.span.clone()));
                    Ok(1)
                },
                _ => Err(Syntax::error("Expected `goto label`", &whole)),
            },

            "while" => match tokens {
                [_, cond, body] if cond.is_group(Delim::Paren) && body.is_group(Delim::Curly) => {
                    self.while_loop(first, cond, body, code)?;
                    Ok(1)
                },
                _ => Err(Syntax::error("Expected `while (condition) { body }`", &whole)),
            },

            "if" => match tokens {
                [_, cond, body] if cond.is_group(Delim::Paren) && body.is_group(Delim::Curly) => {
                    self.if_else(first, cond, body, &statements[1..], code)
                },
                _ => Err(Syntax::error("Expected `if (condition) { body }`", &whole)),
            },

            "else" => Err(Syntax::error("Found `else` without a preceding `if`", &first.span)),

            "break" | "continue" => {
                if tokens.len() != 1 {
                    return Err(Syntax::error(&format!("Expected `;` after `{}`", first.text), &whole));
                }
                let target = match self.body().loops.last() {
                    Some(Loop { end, .. }) if first.text == "break" => end.clone(),
                    Some(Loop { start, .. }) => start.clone(),
                    None => {
                        return Err(Syntax::error(
                            &format!("`{}` outside of a `while` loop", first.text),
                            &first.span,
                        ))
                    },
                };
                code.push(Spanned::new(Instruction::Goto(target), first.span.clone()));
                Ok(1)
            },

            "return" => {
                if tokens.len() > 1 {
                    code.append(&mut self.expression(&tokens[1..], &first.span)?);
                }
                code.push(Spanned::new(Instruction::Return, first.span.clone()));
                Ok(1)
            },

            _ => self.expression_statement(tokens, code),
        }
    }

    /// An expression evaluated only for its effects.
    fn expression_statement(&mut self, tokens: &[Token], code: &mut Code) -> Result<usize, Syntax> {
        let whole = Token::spanning(tokens).expect("statements are not empty");
        code.append(&mut self.expression(tokens, &whole)?);
        code.push(Spanned::new(Instruction::Discard, whole));
        Ok(1)
    }

    fn while_loop(
        &mut self,
        keyword: &Token,
        cond: &Token,
        body: &Token,
        code: &mut Code,
    ) -> Result<(), Syntax> {
        let start = self.synthesize("while");
        let end = self.synthesize("end");
        let at = |i: Instruction| Spanned::new(i, keyword.span.clone());

        code.push(at(Instruction::Label(start.clone())));
        code.append(&mut self.expression(std::slice::from_ref(cond), &cond.span)?);
        code.push(at(Instruction::UnaryOp("!".to_string())));
        code.push(at(Instruction::GotoIfTrue(end.clone())));

        self.body_mut().loops.push(Loop {
            start: start.clone(),
            end: end.clone(),
        });
        let inner = self.block(body, false);
        self.body_mut().loops.pop();

        code.append(&mut inner?);
        code.push(at(Instruction::Goto(start)));
        code.push(at(Instruction::Label(end)));
        Ok(())
    }

    /// Lowers an `if`, and the `else` branch in `following` if there is one.
    /// Returns the number of statements consumed.
    fn if_else(
        &mut self,
        keyword: &Token,
        cond: &Token,
        body: &Token,
        following: &[&[Token]],
        code: &mut Code,
    ) -> Result<usize, Syntax> {
        let otherwise = self.synthesize("else");
        let at = |i: Instruction| Spanned::new(i, keyword.span.clone());

        code.append(&mut self.expression(std::slice::from_ref(cond), &cond.span)?);
        code.push(at(Instruction::UnaryOp("!".to_string())));
        code.push(at(Instruction::GotoIfTrue(otherwise.clone())));
        code.append(&mut self.block(body, false)?);

        let branch = match following.first() {
            Some(next) if next.first().map_or(false, |t| t.is_iden("else")) => *next,
            _ => {
                code.push(at(Instruction::Label(otherwise)));
                return Ok(1);
            },
        };

        let end = self.synthesize("endif");
        code.push(at(Instruction::Goto(end.clone())));
        code.push(at(Instruction::Label(otherwise)));

        let consumed = match &branch[1..] {
            [] => return Err(Syntax::error("Expected a block or `if` after `else`", &branch[0].span)),
            [block] if block.is_group(Delim::Curly) => {
                code.append(&mut self.block(block, false)?);
                1
            },
            // else if ..., or a single unbracketed statement
            rest => {
                let mut chain = vec![rest];
                chain.extend_from_slice(&following[1..]);
                self.statement(&chain, code)?
            },
        };

        code.push(at(Instruction::Label(end)));
        Ok(1 + consumed)
    }
}

/// Whether a statement starts with a keyword or is an assignment,
/// i.e. can never be an expression.
fn is_statement_form(tokens: &[Token]) -> bool {
    let keyword = tokens[0].kind == TokenKind::Iden
        && STATEMENT_KEYWORDS.contains(&tokens[0].text.as_str());
    let assignment = tokens.len() > 1
        && tokens[0].kind == TokenKind::Iden
        && tokens[1].is_punct("=");
    keyword || assignment
}

/// Which statement of a function body is its tail expression, if any.
/// Usually the unterminated remainder, but a body ending in a
/// block-argument call has an empty remainder right after the call's block;
/// that call is then the tail.
fn tail_position(statements: &[&[Token]]) -> Option<usize> {
    let last = statements.len() - 1;
    if !statements[last].is_empty() {
        return Some(last);
    }

    let call = last.checked_sub(1)?;
    let tokens = statements[call];
    let ends_in_block = tokens.last().map_or(false, |t| t.is_group(Delim::Curly));

    if ends_in_block && !is_statement_form(tokens) {
        Some(call)
    } else {
        None
    }
}

/// Splits tokens into statements.
/// `;` ends a statement and is dropped,
/// a curly-bracket group or a `:` ends a statement and is kept.
/// The last entry holds whatever followed the final terminator,
/// and may be empty.
pub(super) fn split_statements(tokens: &[Token]) -> Vec<&[Token]> {
    let mut statements = vec![];
    let mut start = 0;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_punct(";") {
            statements.push(&tokens[start..index]);
            start = index + 1;
        } else if token.is_group(Delim::Curly) || token.is_punct(":") {
            statements.push(&tokens[start..=index]);
            start = index + 1;
        }
    }

    statements.push(&tokens[start..]);
    statements
}

/// Splits tokens on commas.
/// No tokens means no items, but every item present must be non-empty.
pub(super) fn split_commas(tokens: &[Token]) -> Result<Vec<&[Token]>, Syntax> {
    if tokens.is_empty() {
        return Ok(vec![]);
    }

    let mut items = vec![];
    let mut start = 0;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_punct(",") {
            if start == index {
                return Err(Syntax::error("Expected an item before this `,`", &token.span));
            }
            items.push(&tokens[start..index]);
            start = index + 1;
        }
    }

    if start == tokens.len() {
        let comma = &tokens[tokens.len() - 1];
        return Err(Syntax::error("Expected an item after this `,`", &comma.span));
    }
    items.push(&tokens[start..]);

    Ok(items)
}

/// The span of a whole run of tokens, or of a fallback when there are none.
pub(super) fn span_or(tokens: &[Token], fallback: &Span) -> Span {
    Token::spanning(tokens).unwrap_or_else(|| fallback.clone())
}
