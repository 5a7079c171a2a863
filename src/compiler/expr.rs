use crate::{
    common::span::{Span, Spanned},
    compiler::{
        lex::Lexer,
        parse::{span_or, split_commas, Code, Parser},
        syntax::{Note, Syntax},
    },
    construct::{
        function::{FunId, FunctionDef, TypeDesc, Variable},
        instruction::Instruction,
        token::{Delim, Token, TokenKind},
    },
};

/// Binary operators from loosest to tightest binding.
/// Within a level, the rightmost operator is split on first,
/// which makes every level left-associative.
const PRECEDENCE: &[&[&str]] = &[&["<", ">"], &["+", "-"], &["*", "/"]];

impl Parser {
    /// Lowers a flat run of tokens to stack code.
    /// `at` is reported if there turn out to be no tokens at all.
    pub(super) fn expression(&mut self, tokens: &[Token], at: &Span) -> Result<Code, Syntax> {
        match tokens {
            [] => return Err(Syntax::error("Expected an expression", at)),
            [atom] => return self.atom(atom),
            [name, args] if name.kind == TokenKind::Iden && args.is_group(Delim::Paren) => {
                return self.call(name, args);
            },
            [name, args, block]
                if name.kind == TokenKind::Iden
                    && args.is_group(Delim::Paren)
                    && block.is_group(Delim::Curly) =>
            {
                return self.block_call(name, args, block);
            },
            _ => (),
        }

        for level in PRECEDENCE {
            let split = tokens.iter().rposition(|t| {
                t.kind == TokenKind::Punct && level.contains(&t.text.as_str())
            });

            if let Some(index) = split {
                let op = &tokens[index];
                let mut code = self.expression(&tokens[..index], &op.span)?;
                code.append(&mut self.expression(&tokens[index + 1..], &op.span)?);
                code.push(Spanned::new(Instruction::BinaryOp(op.text.clone()), op.span.clone()));
                return Ok(code);
            }
        }

        // a leading `!` binds tighter than any binary operator
        if tokens[0].is_punct("!") {
            let mut code = self.expression(&tokens[1..], &tokens[0].span)?;
            code.push(Spanned::new(Instruction::UnaryOp("!".to_string()), tokens[0].span.clone()));
            return Ok(code);
        }

        Err(Syntax::error_with_note(
            "Unexpected tokens in expression",
            Note::new_with_hint(
                "expected a literal, a name, a call, or an operator between operands",
                &span_or(tokens, at),
            ),
        ))
    }

    fn atom(&mut self, token: &Token) -> Result<Code, Syntax> {
        let instruction = match token.kind {
            TokenKind::Group(Delim::Paren) => {
                let tokens = Lexer::lex_span(&token.inner())?;
                return self.expression(&tokens, &token.span);
            },
            TokenKind::Int => Instruction::PushInt(token.text.parse::<i32>().map_err(|_| {
                Syntax::error(
                    &format!("Integer literal `{}` does not fit in 32 bits", token.text),
                    &token.span,
                )
            })?),
            TokenKind::Float => Instruction::PushFloat(token.text.parse::<f32>().map_err(|_| {
                Syntax::error(&format!("Invalid float literal `{}`", token.text), &token.span)
            })?),
            TokenKind::Str => Instruction::PushString(token.text.clone()),
            TokenKind::Char => match token.text.chars().next() {
                Some(c) => Instruction::PushChar(c),
                None => return Err(Syntax::error("Empty character literal", &token.span)),
            },
            TokenKind::Iden => Instruction::GetLocal(token.text.clone()),
            _ => {
                return Err(Syntax::error(
                    &format!("Unexpected {} in expression", token),
                    &token.span,
                ))
            },
        };

        Ok(vec![Spanned::new(instruction, token.span.clone())])
    }

    /// `name(a, b, ...)`: arguments in order, then the call.
    fn call(&mut self, name: &Token, args: &Token) -> Result<Code, Syntax> {
        let tokens = Lexer::lex_span(&args.inner())?;
        let args_list = split_commas(&tokens)?;
        let mut code = vec![];

        for arg in args_list.iter() {
            code.append(&mut self.expression(arg, &args.span)?);
        }

        code.push(Spanned::new(
            Instruction::Call(name.text.clone(), args_list.len()),
            Span::combine(&name.span, &args.span),
        ));
        Ok(code)
    }

    /// `name(args) { body }`: the body becomes an anonymous function,
    /// passed in the callee's single delegate parameter slot.
    /// Arguments named by placeholders in the delegate's signature
    /// become the anonymous function's parameter names;
    /// the rest fill the callee's other parameters in order.
    fn block_call(&mut self, name: &Token, args: &Token, block: &Token) -> Result<Code, Syntax> {
        let callee = *self.signatures.get(&name.text).ok_or_else(|| {
            Syntax::error(
                &format!("Can not pass a block to `{}`, which is not declared in this source", name.text),
                &name.span,
            )
        })?;
        let params = self.functions[callee.0].params.clone();

        let mut delegates = params.iter().enumerate().filter(|(_, p)| p.ty.is_delegate());
        let (slot, (signature, returns)) = match (delegates.next(), delegates.next()) {
            (Some((slot, Variable { ty: TypeDesc::Delegate { params, returns, .. }, .. })), None) => {
                (slot, (params.clone(), returns.clone()))
            },
            _ => {
                return Err(Syntax::error(
                    &format!("`{}` must take exactly one delegate parameter to be passed a block", name.text),
                    &name.span,
                ))
            },
        };

        let tokens = Lexer::lex_span(&args.inner())?;
        let arguments = split_commas(&tokens)?;

        // bind the anonymous function's parameter names
        let mut bound = vec![false; arguments.len()];
        let mut inner = vec![];
        for param in signature.iter() {
            let param_name = match param.name.parse::<usize>() {
                Err(_) => param.name.clone(),
                Ok(index) => {
                    let argument = arguments.get(index).ok_or_else(|| {
                        Syntax::error(
                            &format!(
                                "`{}` names its block's parameter after argument {}, but only {} were given",
                                name.text,
                                index,
                                arguments.len(),
                            ),
                            &args.span,
                        )
                    })?;
                    match argument {
                        [iden] if iden.kind == TokenKind::Iden => {
                            bound[index] = true;
                            iden.text.clone()
                        },
                        _ => {
                            return Err(Syntax::error(
                                "Expected a name for the block's parameter",
                                &span_or(argument, &args.span),
                            ))
                        },
                    }
                },
            };
            inner.push(Variable::new(param.ty.clone(), &param_name));
        }

        let ordinary = arguments
            .iter()
            .zip(bound.iter())
            .filter(|(_, bound)| !**bound)
            .map(|(argument, _)| *argument)
            .collect::<Vec<_>>();

        if ordinary.len() != params.len() - 1 {
            return Err(Syntax::error(
                &format!(
                    "`{}` takes {} argument(s) besides its block, but {} were given",
                    name.text,
                    params.len() - 1,
                    ordinary.len(),
                ),
                &args.span,
            ));
        }

        // the block's body is parsed in its own scope
        let parent = self.current();
        let anonymous = format!("{}${}", self.functions[parent.0].name, self.anonymous);
        self.anonymous += 1;
        let id = FunId(self.functions.len());
        self.functions
            .push(FunctionDef::nested(parent, &returns, &anonymous, inner));
        self.function_body(id, block)?;

        let mut code = vec![];
        let mut ordinary = ordinary.into_iter();
        for index in 0..params.len() {
            if index == slot {
                code.push(Spanned::new(Instruction::PushDelegate(anonymous.clone()), block.span.clone()));
            } else {
                let argument = ordinary.next().expect("argument count was checked");
                code.append(&mut self.expression(argument, &args.span)?);
            }
        }

        code.push(Spanned::new(
            Instruction::Call(name.text.clone(), params.len()),
            Span::combine(&name.span, &args.span),
        ));
        Ok(code)
    }
}
