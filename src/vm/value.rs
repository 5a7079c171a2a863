use std::fmt::{self, Display, Formatter};

use crate::{
    construct::function::FunId,
    vm::trace::{Trace, TraceKind},
};

/// A value on the operand stack or bound to a name.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
    Char(char),
    Bool(bool),
    /// A handle to a registered function, i.e. a delegate.
    Function(FunId),
    /// What a declared local holds before it is first assigned.
    Null,
}

impl Value {
    /// The name of this value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Char(_) => "char",
            Value::Bool(_) => "bool",
            Value::Function(_) => "delegate",
            Value::Null => "null",
        }
    }
}

impl Display for Value {
    /// Delegates are printed by id here;
    /// the VM knows their names and prints those instead.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Char(c) => write!(f, "{}", c),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Function(id) => write!(f, "<function #{}>", id.0),
            Value::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, proptest_derive::Arbitrary)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
}

impl BinOp {
    pub fn try_new(symbol: &str) -> Option<BinOp> {
        let op = match symbol {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
        }
    }

    fn is_comparison(&self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Gt)
    }

    /// Applies the operator.
    /// Integer arithmetic wraps; a float operand promotes an integer one.
    /// Comparisons work between numbers, between chars, and between strings.
    pub fn apply(&self, left: Value, right: Value) -> Result<Value, Trace> {
        match (left, right) {
            (Value::Int(l), Value::Int(r)) => self.ints(l, r),
            (Value::Float(l), Value::Float(r)) => Ok(self.floats(l, r)),
            (Value::Int(l), Value::Float(r)) => Ok(self.floats(l as f32, r)),
            (Value::Float(l), Value::Int(r)) => Ok(self.floats(l, r as f32)),
            (Value::Char(l), Value::Char(r)) if self.is_comparison() => {
                Ok(Value::Bool(self.compare(l, r)))
            },
            (Value::Str(l), Value::Str(r)) if self.is_comparison() => {
                Ok(Value::Bool(self.compare(l, r)))
            },
            (l, r) => Err(Trace::error(
                TraceKind::Type,
                &format!(
                    "Can't apply `{}` to {} and {}",
                    self.symbol(),
                    l.type_name(),
                    r.type_name(),
                ),
            )),
        }
    }

    fn ints(&self, l: i32, r: i32) -> Result<Value, Trace> {
        let value = match self {
            BinOp::Add => Value::Int(l.wrapping_add(r)),
            BinOp::Sub => Value::Int(l.wrapping_sub(r)),
            BinOp::Mul => Value::Int(l.wrapping_mul(r)),
            BinOp::Div if r == 0 => {
                return Err(Trace::error(TraceKind::Arithmetic, "Division by zero"))
            },
            BinOp::Div => Value::Int(l.wrapping_div(r)),
            BinOp::Lt | BinOp::Gt => Value::Bool(self.compare(l, r)),
        };
        Ok(value)
    }

    fn floats(&self, l: f32, r: f32) -> Value {
        match self {
            BinOp::Add => Value::Float(l + r),
            BinOp::Sub => Value::Float(l - r),
            BinOp::Mul => Value::Float(l * r),
            BinOp::Div => Value::Float(l / r),
            BinOp::Lt | BinOp::Gt => Value::Bool(self.compare(l, r)),
        }
    }

    fn compare<T: PartialOrd>(&self, l: T, r: T) -> bool {
        match self {
            BinOp::Gt => l > r,
            _ => l < r,
        }
    }
}

/// Only logical negation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
}

impl UnOp {
    pub fn try_new(symbol: &str) -> Option<UnOp> {
        match symbol {
            "!" => Some(UnOp::Not),
            _ => None,
        }
    }

    pub fn apply(&self, operand: Value) -> Result<Value, Trace> {
        match operand {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(Trace::error(
                TraceKind::Type,
                &format!("Can't apply `!` to {}", other.type_name()),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn integer_ops_wrap(op: BinOp, l: i32, r: i32) {
            let result = op.apply(Value::Int(l), Value::Int(r));

            let expected = match op {
                BinOp::Add => Value::Int(l.wrapping_add(r)),
                BinOp::Sub => Value::Int(l.wrapping_sub(r)),
                BinOp::Mul => Value::Int(l.wrapping_mul(r)),
                BinOp::Div if r == 0 => {
                    prop_assert_eq!(result.unwrap_err().kind, TraceKind::Arithmetic);
                    return Ok(());
                },
                BinOp::Div => Value::Int(l.wrapping_div(r)),
                BinOp::Lt => Value::Bool(l < r),
                BinOp::Gt => Value::Bool(l > r),
            };
            prop_assert_eq!(result.unwrap(), expected);
        }

        #[test]
        fn symbols_round_trip(op: BinOp) {
            prop_assert_eq!(BinOp::try_new(op.symbol()), Some(op));
        }
    }

    #[test]
    fn promotion() {
        assert_eq!(
            BinOp::Add.apply(Value::Int(1), Value::Float(0.5)).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            BinOp::Lt.apply(Value::Float(2.5), Value::Int(3)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            BinOp::Gt.apply(Value::Char('b'), Value::Char('a')).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            BinOp::Lt
                .apply(Value::Str("abc".to_string()), Value::Str("abd".to_string()))
                .unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn type_errors() {
        let error = BinOp::Add
            .apply(Value::Str("a".to_string()), Value::Int(1))
            .unwrap_err();
        assert_eq!(error.kind, TraceKind::Type);
        assert_eq!(error.message, "Can't apply `+` to string and int");

        assert!(BinOp::Add.apply(Value::Char('a'), Value::Char('b')).is_err());
        assert!(BinOp::Lt.apply(Value::Bool(true), Value::Bool(false)).is_err());
        assert!(UnOp::Not.apply(Value::Int(0)).is_err());
    }

    #[test]
    fn unknown_symbols() {
        assert_eq!(BinOp::try_new("%"), None);
        assert_eq!(UnOp::try_new("-"), None);
        assert_eq!(UnOp::Not.apply(Value::Bool(false)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn printing() {
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
