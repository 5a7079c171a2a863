use std::fmt::{Display, Formatter, Result};

/// A single step of a function's flat bytecode.
/// Order is significant: an instruction list is the program.
/// Names, labels and operator symbols stay textual,
/// they are resolved when the VM compiles or executes the function.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushInt(i32),
    PushFloat(f32),
    PushString(String),
    PushChar(char),
    /// Pushes a handle to the named function.
    PushDelegate(String),
    /// Push the value of a local, resolved lexically.
    GetLocal(String),
    /// Pop a value into an existing local, resolved lexically.
    SetLocal(String),
    /// Pop a value into a local declared by this function.
    /// Rewritten into `SetLocal` when the VM compiles the function.
    DeclareLocal(String),
    BinaryOp(String),
    UnaryOp(String),
    /// Call a function (or a local holding a delegate) by name,
    /// consuming the given number of arguments from the stack.
    Call(String, usize),
    Label(String),
    Goto(String),
    /// Pops a boolean, jumps if it is `true`.
    GotoIfTrue(String),
    /// Ends the activation, yielding the top of the stack if there is one.
    Return,
    /// Drops the value an expression statement left behind, if any.
    Discard,
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::PushInt(_) => "PushInt",
            Instruction::PushFloat(_) => "PushFloat",
            Instruction::PushString(_) => "PushString",
            Instruction::PushChar(_) => "PushChar",
            Instruction::PushDelegate(_) => "PushDelegate",
            Instruction::GetLocal(_) => "GetLocal",
            Instruction::SetLocal(_) => "SetLocal",
            Instruction::DeclareLocal(_) => "DeclareLocal",
            Instruction::BinaryOp(_) => "BinaryOp",
            Instruction::UnaryOp(_) => "UnaryOp",
            Instruction::Call(_, _) => "Call",
            Instruction::Label(_) => "Label",
            Instruction::Goto(_) => "Goto",
            Instruction::GotoIfTrue(_) => "GotoIfTrue",
            Instruction::Return => "Return",
            Instruction::Discard => "Discard",
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let name = self.name();
        match self {
            Instruction::PushInt(n) => write!(f, "{:<12} {}", name, n),
            Instruction::PushFloat(n) => write!(f, "{:<12} {:?}", name, n),
            Instruction::PushString(s) => write!(f, "{:<12} \"{}\"", name, s),
            Instruction::PushChar(c) => write!(f, "{:<12} '{}'", name, c),
            Instruction::Call(callee, argc) => {
                write!(f, "{:<12} {} ({} args)", name, callee, argc)
            },
            Instruction::PushDelegate(s)
            | Instruction::GetLocal(s)
            | Instruction::SetLocal(s)
            | Instruction::DeclareLocal(s)
            | Instruction::BinaryOp(s)
            | Instruction::UnaryOp(s)
            | Instruction::Label(s)
            | Instruction::Goto(s)
            | Instruction::GotoIfTrue(s) => write!(f, "{:<12} {}", name, s),
            Instruction::Return | Instruction::Discard => write!(f, "{}", name),
        }
    }
}
