use std::fmt;

use crate::common::span::Span;

/// The kinds of things that can go wrong while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// A name, label, or function could not be found.
    Resolution,
    /// A function was called with the wrong number of arguments.
    Arity,
    /// An operator symbol the VM does not know.
    Operator,
    /// An operator or jump was handed values it can not work with.
    Type,
    Arithmetic,
    /// Code tried to pop an empty operand stack.
    Stack,
    /// Writing program output failed.
    Io,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceKind::Resolution => "Resolution",
            TraceKind::Arity => "Arity",
            TraceKind::Operator => "Operator",
            TraceKind::Type => "Type",
            TraceKind::Arithmetic => "Arithmetic",
            TraceKind::Stack => "Stack",
            TraceKind::Io => "IO",
        };
        write!(f, "{}", name)
    }
}

/// Represents a runtime error, i.e. a traceback
#[derive(Debug, PartialEq, Eq)]
pub struct Trace {
    pub kind: TraceKind,
    pub message: String,
    /// Innermost first: the function that failed,
    /// then each caller as the error unwinds.
    context: Vec<(String, Option<Span>)>,
}

impl Trace {
    /// Creates a new traceback
    pub fn error(kind: TraceKind, message: &str) -> Trace {
        Trace {
            kind,
            message: message.to_string(),
            context: vec![],
        }
    }

    /// Used to add context (i.e. function calls) while unwinding the stack.
    /// Functions built by hand may have no source to point at.
    pub fn add_context(mut self, function: &str, span: Option<Span>) -> Trace {
        self.context.push((function.to_string(), span));
        self
    }

    /// Names of the functions the error passed through, innermost first.
    pub fn functions(&self) -> Vec<&str> {
        self.context.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback, most recent call last:")?;

        for (function, span) in self.context.iter().rev() {
            match span {
                Some(span) => fmt::Display::fmt(span, f)?,
                None => writeln!(f, "In `{}`", function)?,
            }
        }

        write!(f, "Runtime {} Error: {}", self.kind, self.message)
    }
}
