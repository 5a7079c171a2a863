use std::fmt::{self, Display, Formatter};

use crate::{
    common::span::{Span, Spanned},
    construct::instruction::Instruction,
};

/// Index of a function in a `Program` or in a VM's registry.
/// The lexical parent relation is stored as one of these,
/// never as a second owning edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunId(pub usize);

/// Declared type of a parameter.
/// Types are advisory: nothing checks them at run time,
/// a delegate type only tells a block-argument call site
/// which argument to synthesize a function for.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    Primitive(String),
    Delegate {
        /// The raw parameter list between the parentheses.
        signature: String,
        params: Vec<Variable>,
        returns: String,
    },
}

impl TypeDesc {
    pub fn is_delegate(&self) -> bool {
        matches!(self, TypeDesc::Delegate { .. })
    }
}

impl Display for TypeDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Primitive(name) => write!(f, "{}", name),
            TypeDesc::Delegate { signature, returns, .. } => {
                write!(f, "{} ({})", returns, signature)
            },
        }
    }
}

/// A parameter or local declaration site.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub ty: TypeDesc,
    pub name: String,
}

impl Variable {
    pub fn new(ty: TypeDesc, name: &str) -> Variable {
        Variable {
            ty,
            name: name.to_string(),
        }
    }

    pub fn primitive(ty: &str, name: &str) -> Variable {
        Variable::new(TypeDesc::Primitive(ty.to_string()), name)
    }
}

/// A function as produced by the parser:
/// a signature, an optional lexical parent and flat bytecode.
/// Anonymous functions synthesized for block arguments
/// point at the function whose body contained them.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub parent: Option<FunId>,
    pub return_type: String,
    pub name: String,
    pub params: Vec<Variable>,
    pub code: Vec<Instruction>,
    /// Where each instruction came from, if it came from source at all.
    pub spans: Vec<Option<Span>>,
}

impl FunctionDef {
    /// Creates a new top-level function with no bytecode.
    pub fn new(return_type: &str, name: &str, params: Vec<Variable>) -> FunctionDef {
        FunctionDef {
            parent: None,
            return_type: return_type.to_string(),
            name: name.to_string(),
            params,
            code: vec![],
            spans: vec![],
        }
    }

    /// Creates a function lexically enclosed by `parent`.
    pub fn nested(
        parent: FunId,
        return_type: &str,
        name: &str,
        params: Vec<Variable>,
    ) -> FunctionDef {
        FunctionDef {
            parent: Some(parent),
            ..FunctionDef::new(return_type, name, params)
        }
    }

    /// Appends an instruction that has no source location.
    pub fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
        self.spans.push(None);
    }

    pub fn emit_spanned(&mut self, instruction: Spanned<Instruction>) {
        self.code.push(instruction.item);
        self.spans.push(Some(instruction.span));
    }

    pub fn emit_all(&mut self, instructions: Vec<Spanned<Instruction>>) {
        for instruction in instructions {
            self.emit_spanned(instruction);
        }
    }

    pub fn span(&self, index: usize) -> Option<&Span> {
        self.spans.get(index).and_then(Option::as_ref)
    }
}

impl Display for FunctionDef {
    /// Dumps the signature and bytecode for inspection.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "{} {}({}):", self.return_type, self.name, params)?;

        for (index, instruction) in self.code.iter().enumerate() {
            writeln!(f, "{:>4}  {}", index, instruction)?;
        }
        Ok(())
    }
}

/// Every function a single parse produced, top-level functions first.
/// Parents always precede the functions they enclose.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn id(&self, name: &str) -> Option<FunId> {
        self.functions.iter().position(|f| f.name == name).map(FunId)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for function in self.functions.iter() {
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}
