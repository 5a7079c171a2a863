use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use crate::{
    common::span::Span,
    construct::{
        function::{FunId, FunctionDef, Variable},
        instruction::Instruction,
    },
    vm::trace::{Trace, TraceKind},
};

/// A function ready to run:
/// labels are resolved to instruction indices,
/// and the locals it declares are known ahead of time,
/// so a frame can bind all of them when the function is entered.
#[derive(Debug)]
pub struct Function {
    pub id: FunId,
    pub parent: Option<FunId>,
    pub name: String,
    pub return_type: String,
    pub params: Vec<Variable>,
    pub code: Vec<Instruction>,
    spans: Vec<Option<Span>>,
    labels: HashMap<String, usize>,
    /// Declared locals, in order of first declaration.
    /// Parameters are not repeated here.
    pub locals: Vec<String>,
}

impl Function {
    /// Prepares a parsed function to be registered under `id`.
    pub fn compile(id: FunId, def: FunctionDef) -> Result<Function, Trace> {
        let FunctionDef {
            parent,
            return_type,
            name,
            params,
            code,
            mut spans,
        } = def;
        spans.resize(code.len(), None);

        let fail = |message: String, index: usize| {
            Trace::error(TraceKind::Resolution, &message).add_context(&name, spans[index].clone())
        };

        let mut labels = HashMap::new();
        let mut locals: Vec<String> = vec![];

        for (index, instruction) in code.iter().enumerate() {
            match instruction {
                Instruction::Label(label) => {
                    if labels.insert(label.clone(), index).is_some() {
                        return Err(fail(
                            format!("Label `{}` is defined more than once in `{}`", label, name),
                            index,
                        ));
                    }
                },
                Instruction::DeclareLocal(local) => {
                    let is_param = params.iter().any(|p| &p.name == local);
                    if !is_param && !locals.contains(local) {
                        locals.push(local.clone());
                    }
                },
                _ => (),
            }
        }

        // every jump has somewhere to go
        for (index, instruction) in code.iter().enumerate() {
            if let Instruction::Goto(label) | Instruction::GotoIfTrue(label) = instruction {
                if !labels.contains_key(label) {
                    return Err(fail(
                        format!("Label `{}` is not defined in `{}`", label, name),
                        index,
                    ));
                }
            }
        }

        // declared names are bound on entry, so declaring is just assigning
        let code = code
            .into_iter()
            .map(|instruction| match instruction {
                Instruction::DeclareLocal(local) => Instruction::SetLocal(local),
                other => other,
            })
            .collect();

        Ok(Function {
            id,
            parent,
            name,
            return_type,
            params,
            code,
            spans,
            labels,
            locals,
        })
    }

    pub fn returns_value(&self) -> bool {
        self.return_type != "void"
    }

    /// The index of the instruction a label marks.
    pub fn label(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn span(&self, index: usize) -> Option<Span> {
        self.spans.get(index).cloned().flatten()
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} {}({})", self.return_type, self.name, params)?;
        if let Some(parent) = self.parent {
            write!(f, " in #{}", parent.0)?;
        }
        writeln!(f, ":")?;

        if !self.locals.is_empty() {
            writeln!(f, "      locals: {}", self.locals.join(", "))?;
        }
        for (index, instruction) in self.code.iter().enumerate() {
            writeln!(f, "{:>4}  {}", index, instruction)?;
        }
        Ok(())
    }
}
