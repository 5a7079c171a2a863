use std::{
    collections::{HashMap, HashSet},
    io::{self, Write},
    rc::Rc,
};

use crate::{
    construct::{
        function::{FunId, FunctionDef, Program},
        instruction::Instruction,
    },
    vm::{
        function::Function,
        trace::{Trace, TraceKind},
        value::{BinOp, UnOp, Value},
    },
};

/// The locals of one invocation of a function.
type Frame = HashMap<String, Value>;

/// What to do after executing an instruction.
enum Flow {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

/// A `VM` holds a registry of functions and runs them on request.
/// Each VM's state is self-contained,
/// So more than one can be spawned if needed.
///
/// Every function has its own stack of frames, one per active invocation.
/// A name not bound in the running function's frame is looked up
/// in the topmost frame of its lexical parent, then that function's parent,
/// and so on. This is how a block sees the locals of the function it
/// was written in while that function is still running.
pub struct VM {
    functions: Vec<Rc<Function>>,
    names: HashMap<String, FunId>,
    frames: Vec<Vec<Frame>>,
    out: Box<dyn Write>,
}

impl VM {
    /// Initialize a new VM that prints to standard output.
    pub fn init() -> VM {
        VM::with_output(io::stdout())
    }

    /// Initialize a new VM that prints somewhere else.
    pub fn with_output(out: impl Write + 'static) -> VM {
        VM {
            functions: vec![],
            names: HashMap::new(),
            frames: vec![],
            out: Box::new(out),
        }
    }

    /// Registers a single function.
    /// Its parent, if any, must already be registered.
    pub fn add(&mut self, def: FunctionDef) -> Result<FunId, Trace> {
        if self.names.contains_key(&def.name) {
            return Err(Trace::error(
                TraceKind::Resolution,
                &format!("A function named `{}` is already registered", def.name),
            ));
        }
        if let Some(parent) = def.parent {
            if parent.0 >= self.functions.len() {
                return Err(Trace::error(
                    TraceKind::Resolution,
                    &format!("The parent of `{}` is not registered", def.name),
                ));
            }
        }

        let id = FunId(self.functions.len());
        let function = Function::compile(id, def)?;
        self.names.insert(function.name.clone(), id);
        self.functions.push(Rc::new(function));
        self.frames.push(vec![]);
        Ok(id)
    }

    /// Registers every function of a program.
    /// Nothing is registered unless all of them can be.
    pub fn load(&mut self, program: Program) -> Result<Vec<FunId>, Trace> {
        let base = self.functions.len();
        let mut seen = HashSet::new();
        let mut compiled = vec![];

        for (index, mut def) in program.functions.into_iter().enumerate() {
            if self.names.contains_key(&def.name) || !seen.insert(def.name.clone()) {
                return Err(Trace::error(
                    TraceKind::Resolution,
                    &format!("A function named `{}` is already registered", def.name),
                ));
            }

            // parents are indices into the program, shift them into the registry
            def.parent = match def.parent {
                Some(FunId(parent)) if parent < index => Some(FunId(base + parent)),
                Some(_) => {
                    return Err(Trace::error(
                        TraceKind::Resolution,
                        &format!("`{}` is loaded before its parent", def.name),
                    ))
                },
                None => None,
            };

            compiled.push(Function::compile(FunId(base + index), def)?);
        }

        let mut ids = vec![];
        for function in compiled {
            ids.push(function.id);
            self.names.insert(function.name.clone(), function.id);
            self.functions.push(Rc::new(function));
            self.frames.push(vec![]);
        }
        Ok(ids)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.names.get(name).and_then(|id| self.function_by_id(*id))
    }

    pub fn function_by_id(&self, id: FunId) -> Option<&Function> {
        self.functions.get(id.0).map(Rc::as_ref)
    }

    /// Looks up a function by name and runs it with the given arguments.
    /// Returns what the function returned, if anything.
    pub fn invoke(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, Trace> {
        let id = *self.names.get(name).ok_or_else(|| {
            Trace::error(
                TraceKind::Resolution,
                &format!("No function named `{}` is registered", name),
            )
        })?;
        self.call(id, args)
    }

    /// Runs a function in a fresh frame.
    /// The frame is gone afterwards, whether or not the call succeeded.
    fn call(&mut self, id: FunId, args: Vec<Value>) -> Result<Option<Value>, Trace> {
        let function = Rc::clone(&self.functions[id.0]);

        if args.len() != function.params.len() {
            return Err(Trace::error(
                TraceKind::Arity,
                &format!(
                    "`{}` takes {} argument(s), but {} were given",
                    function.name,
                    function.params.len(),
                    args.len(),
                ),
            ));
        }

        let mut frame = Frame::new();
        for local in function.locals.iter() {
            frame.insert(local.clone(), Value::Null);
        }
        for (param, arg) in function.params.iter().zip(args.into_iter()) {
            frame.insert(param.name.clone(), arg);
        }

        self.frames[id.0].push(frame);
        let result = self.run(&function);
        self.frames[id.0].pop();
        result
    }

    /// The core interpreter loop for a single invocation.
    fn run(&mut self, function: &Function) -> Result<Option<Value>, Trace> {
        let mut stack = vec![];
        let mut ip = 0;

        while ip < function.code.len() {
            let flow = self
                .step(function, &function.code[ip], &mut stack)
                .map_err(|trace| trace.add_context(&function.name, function.span(ip)))?;

            match flow {
                Flow::Next => ip += 1,
                Flow::Jump(target) => ip = target,
                Flow::Return(value) => return self.result(function, value),
            }
        }

        // fell off the end
        let value = if function.returns_value() { stack.pop() } else { None };
        self.result(function, value)
    }

    fn result(&self, function: &Function, value: Option<Value>) -> Result<Option<Value>, Trace> {
        match value {
            None if function.returns_value() => Err(Trace::error(
                TraceKind::Stack,
                &format!("`{}` returns {}, but finished without a value", function.name, function.return_type),
            )
            .add_context(&function.name, None)),
            value => Ok(value),
        }
    }

    fn pop(stack: &mut Vec<Value>) -> Result<Value, Trace> {
        stack
            .pop()
            .ok_or_else(|| Trace::error(TraceKind::Stack, "Expected a value, but the stack is empty"))
    }

    /// Executes a single instruction.
    fn step(
        &mut self,
        function: &Function,
        instruction: &Instruction,
        stack: &mut Vec<Value>,
    ) -> Result<Flow, Trace> {
        match instruction {
            Instruction::PushInt(i) => stack.push(Value::Int(*i)),
            Instruction::PushFloat(n) => stack.push(Value::Float(*n)),
            Instruction::PushString(s) => stack.push(Value::Str(s.clone())),
            Instruction::PushChar(c) => stack.push(Value::Char(*c)),
            Instruction::PushDelegate(name) => {
                let id = self.names.get(name).ok_or_else(|| {
                    Trace::error(
                        TraceKind::Resolution,
                        &format!("No function named `{}` is registered", name),
                    )
                })?;
                stack.push(Value::Function(*id));
            },

            Instruction::GetLocal(name) => match self.lookup(function, name)? {
                Some(value) => stack.push(value),
                None => {
                    return Err(Trace::error(
                        TraceKind::Resolution,
                        &format!("`{}` is not defined", name),
                    ))
                },
            },
            Instruction::SetLocal(name) => {
                let value = VM::pop(stack)?;
                self.assign(function, name, value)?;
            },
            Instruction::DeclareLocal(name) => {
                let value = VM::pop(stack)?;
                self.frame(function)?.insert(name.clone(), value);
            },

            Instruction::BinaryOp(symbol) => {
                let op = BinOp::try_new(symbol).ok_or_else(|| {
                    Trace::error(
                        TraceKind::Operator,
                        &format!("Unknown binary operator `{}`", symbol),
                    )
                })?;
                let right = VM::pop(stack)?;
                let left = VM::pop(stack)?;
                stack.push(op.apply(left, right)?);
            },
            Instruction::UnaryOp(symbol) => {
                let op = UnOp::try_new(symbol).ok_or_else(|| {
                    Trace::error(
                        TraceKind::Operator,
                        &format!("Unknown unary operator `{}`", symbol),
                    )
                })?;
                let operand = VM::pop(stack)?;
                stack.push(op.apply(operand)?);
            },

            Instruction::Call(name, argc) => {
                if stack.len() < *argc {
                    return Err(Trace::error(
                        TraceKind::Stack,
                        &format!("`{}` needs {} argument(s) from the stack", name, argc),
                    ));
                }
                let args = stack.split_off(stack.len() - argc);
                if let Some(value) = self.call_named(function, name, args)? {
                    stack.push(value);
                }
            },

            Instruction::Label(_) => (),
            Instruction::Goto(label) => return Ok(Flow::Jump(VM::target(function, label)?)),
            Instruction::GotoIfTrue(label) => match VM::pop(stack)? {
                Value::Bool(true) => return Ok(Flow::Jump(VM::target(function, label)?)),
                Value::Bool(false) => (),
                other => {
                    return Err(Trace::error(
                        TraceKind::Type,
                        &format!("Expected a bool to branch on, found {}", other.type_name()),
                    ))
                },
            },

            Instruction::Return => return Ok(Flow::Return(stack.pop())),
            Instruction::Discard => {
                stack.pop();
            },
        }

        Ok(Flow::Next)
    }

    fn target(function: &Function, label: &str) -> Result<usize, Trace> {
        function.label(label).ok_or_else(|| {
            Trace::error(
                TraceKind::Resolution,
                &format!("Label `{}` is not defined in `{}`", label, function.name),
            )
        })
    }

    /// Calls the `Print` intrinsic, a delegate held by a visible local,
    /// or a registered function, in that order of preference.
    /// A void function's result never reaches the caller's stack.
    fn call_named(
        &mut self,
        function: &Function,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Trace> {
        if name == "Print" {
            self.print(args)?;
            return Ok(None);
        }

        let callee = match self.lookup_callee(function, name) {
            Some(Value::Function(id)) => id,
            Some(other) => {
                return Err(Trace::error(
                    TraceKind::Type,
                    &format!("`{}` holds a {}, not a delegate", name, other.type_name()),
                ))
            },
            None => *self.names.get(name).ok_or_else(|| {
                Trace::error(
                    TraceKind::Resolution,
                    &format!("No function or delegate named `{}`", name),
                )
            })?,
        };

        let value = self.call(callee, args)?;
        Ok(value.filter(|_| self.functions[callee.0].returns_value()))
    }

    fn print(&mut self, args: Vec<Value>) -> Result<(), Trace> {
        let value = match <[Value; 1]>::try_from(args) {
            Ok([value]) => value,
            Err(args) => {
                return Err(Trace::error(
                    TraceKind::Arity,
                    &format!("`Print` takes 1 argument, but {} were given", args.len()),
                ))
            },
        };

        let text = self.show(&value);
        writeln!(self.out, "{}", text)
            .and_then(|_| self.out.flush())
            .map_err(|e| Trace::error(TraceKind::Io, &format!("Could not print: {}", e)))
    }

    /// Renders a value the way `Print` does.
    pub fn show(&self, value: &Value) -> String {
        match value {
            Value::Function(id) => format!("<function {}>", self.functions[id.0].name),
            other => other.to_string(),
        }
    }

    /// The frame of the running invocation of `function`.
    fn frame(&mut self, function: &Function) -> Result<&mut Frame, Trace> {
        self.frames[function.id.0].last_mut().ok_or_else(|| VM::inactive(function))
    }

    fn inactive(function: &Function) -> Trace {
        Trace::error(
            TraceKind::Resolution,
            &format!("`{}` has no active invocation", function.name),
        )
    }

    /// Finds the function whose topmost frame binds `name`,
    /// starting at `function` and walking out through its parents.
    fn resolve(&self, function: &Function, name: &str) -> Result<Option<FunId>, Trace> {
        let mut current = Some(function.id);

        while let Some(id) = current {
            let scope = &self.functions[id.0];
            let frame = self.frames[id.0].last().ok_or_else(|| VM::inactive(scope))?;
            if frame.contains_key(name) {
                return Ok(Some(id));
            }
            current = scope.parent;
        }

        Ok(None)
    }

    /// Like `lookup`, but an enclosing function with no running invocation
    /// ends the search instead of failing it,
    /// since the name may still be a registered function.
    fn lookup_callee(&self, function: &Function, name: &str) -> Option<Value> {
        let mut current = Some(function.id);

        while let Some(id) = current {
            let frame = self.frames[id.0].last()?;
            if let Some(value) = frame.get(name) {
                return Some(value.clone());
            }
            current = self.functions[id.0].parent;
        }

        None
    }

    fn lookup(&self, function: &Function, name: &str) -> Result<Option<Value>, Trace> {
        Ok(self
            .resolve(function, name)?
            .and_then(|id| self.frames[id.0].last())
            .and_then(|frame| frame.get(name))
            .cloned())
    }

    fn assign(&mut self, function: &Function, name: &str, value: Value) -> Result<(), Trace> {
        let id = self.resolve(function, name)?.ok_or_else(|| {
            Trace::error(
                TraceKind::Resolution,
                &format!("`{}` is assigned before it is declared", name),
            )
        })?;

        if let Some(frame) = self.frames[id.0].last_mut() {
            frame.insert(name.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        common::source::Source,
        compiler::parse,
        construct::function::Variable,
    };

    /// Collects everything a VM prints.
    #[derive(Clone, Default)]
    struct Output(Rc<RefCell<Vec<u8>>>);

    impl Write for Output {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Output {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn vm(source: &str) -> (VM, Output) {
        let program = match parse(Source::source(source)) {
            Ok(program) => program,
            Err(e) => panic!("{}", e),
        };
        let output = Output::default();
        let mut vm = VM::with_output(output.clone());
        vm.load(program).unwrap();
        (vm, output)
    }

    fn run(source: &str) -> (Result<Option<Value>, Trace>, String) {
        let (mut vm, output) = vm(source);
        let result = vm.invoke("Main", vec![]);
        (result, output.text())
    }

    fn value(source: &str) -> Value {
        match run(source).0 {
            Ok(Some(value)) => value,
            Ok(None) => panic!("no value returned"),
            Err(trace) => panic!("{}", trace),
        }
    }

    #[test]
    fn precedence() {
        assert_eq!(value("int Main(){ 1 + 2 * 3 }"), Value::Int(7));
        assert_eq!(value("int Main(){ 1 - 2 - 3 }"), Value::Int(-4));
        assert_eq!(value("bool Main(){ 1+2<3*4 }"), Value::Bool(true));
        assert_eq!(value("int Main(){ 2 * (22 + 5) - 6 }"), Value::Int(48));
    }

    #[test]
    fn prints() {
        let (result, output) = run(
            "void Show((int 0) f){ Print(f); }
             void Main(){ Print(1); Print(2.5); Print(\"hi\"); Print('c'); Print(1 < 2); Show(n){ }; }",
        );
        assert_eq!(result, Ok(None));
        assert_eq!(output, "1\n2.5\nhi\nc\ntrue\n<function Main$0>\n");
    }

    #[test]
    fn loops_and_branches() {
        let (result, output) = run(
            "void Main(){
                var i = 0;
                while (i < 10) {
                    if (i > 3) { break; }
                    Print(i);
                    i = i + 1;
                }
                if (i > 100) { Print(0); } else if (i > 3) { Print(\"big\"); } else { Print(0); }
            }",
        );
        assert_eq!(result, Ok(None));
        assert_eq!(output, "0\n1\n2\n3\nbig\n");
    }

    #[test]
    fn labels_and_gotos() {
        let source = "int Main(){
            var n = 0;
            top:
            n = n + 1;
            goto_if (n < 5) top;
            n
        }";
        assert_eq!(value(source), Value::Int(5));
    }

    #[test]
    fn recursion() {
        let source = "int Fact(int n){ if (n < 2) { return 1; } n * Fact(n - 1) }
                      int Main(){ Fact(10) }";
        assert_eq!(value(source), Value::Int(3628800));
    }

    #[test]
    fn blocks_see_enclosing_locals() {
        let source = "void Times(int n, (int 0) body){ var i = 0; while (i < n) { body(i); i = i + 1; } }
                      int Main(){ var sum = 0; Times(k, 4){ sum = sum + k; } sum }";
        assert_eq!(value(source), Value::Int(6));
    }

    #[test]
    fn block_returns_value() {
        let source = "int Apply(int x, int (int 0) f){ f(x) }
                      int Main(){ var r = Apply(v, 20){ v + 1 }; r * 2 }";
        assert_eq!(value(source), Value::Int(42));
    }

    #[test]
    fn return_from_void_reaches_host() {
        let (result, _) = run("void Main(){ return 11; }");
        assert_eq!(result, Ok(Some(Value::Int(11))));
    }

    #[test]
    fn void_results_are_dropped() {
        let source = "void Quiet(){ return 3; } int Main(){ Quiet(); 4 }";
        assert_eq!(value(source), Value::Int(4));
    }

    #[test]
    fn delegates_are_values() {
        let source = "int Pass(int (int 0) g){ g(21) }
                      int Use(int (int 0) f){ Pass(f) }
                      int Main(){ var r = Use(x){ x * 2 }; r }";
        let (mut vm, _) = vm(source);
        assert_eq!(vm.invoke("Main", vec![]), Ok(Some(Value::Int(42))));
    }

    #[test]
    fn repeated_invocation() {
        let (mut vm, output) = vm("int Main(){ var x = 1; Print(x); x = x + 1; x }");
        for _ in 0..3 {
            assert_eq!(vm.invoke("Main", vec![]), Ok(Some(Value::Int(2))));
        }
        assert_eq!(output.text(), "1\n1\n1\n");
    }

    #[test]
    fn escaped_block_has_no_scope() {
        let source = "void Keep((int 0) f){ Print(f); }
                      void Main(){ var y = 1; Keep(n){ Print(y); }; }";
        let (mut vm, _) = vm(source);
        vm.invoke("Main", vec![]).unwrap();

        // Main is no longer running, so its block can't see `y`
        let error = vm.invoke("Main$0", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(error.kind, TraceKind::Resolution);
    }

    #[test]
    fn escaped_block_calls_functions() {
        let source = "int Id(int (int 0) f){ f }
                      int Double(int x){ x * 2 }
                      int Make(){ return Id(n){ Double(n) }; }
                      int Main(){ var g = Make(); g(21) }";
        assert_eq!(value(source), Value::Int(42));

        // names bound only in the returned function's scope are still gone
        let source = "int Id(int (int 0) f){ f }
                      int Make(){ var k = 1; return Id(n){ n + k }; }
                      int Main(){ var g = Make(); g(21) }";
        assert_eq!(run(source).0.unwrap_err().kind, TraceKind::Resolution);
    }

    #[test]
    fn host_arguments() {
        let (mut vm, _) = vm("int Add(int a, int b){ a + b }");
        assert_eq!(vm.invoke("Add", vec![Value::Int(2), Value::Int(3)]), Ok(Some(Value::Int(5))));

        let error = vm.invoke("Add", vec![Value::Int(2)]).unwrap_err();
        assert_eq!(error.kind, TraceKind::Arity);
        let missing = vm.invoke("Sub", vec![]).unwrap_err();
        assert_eq!(missing.kind, TraceKind::Resolution);
    }

    #[test]
    fn runtime_errors() {
        let kind = |source: &str| run(source).0.unwrap_err().kind;
        assert_eq!(kind("int Main(){ 1 / 0 }"), TraceKind::Arithmetic);
        assert_eq!(kind("int Main(){ 1 + \"a\" }"), TraceKind::Type);
        assert_eq!(kind("int Main(){ y }"), TraceKind::Resolution);
        assert_eq!(kind("void Main(){ y = 1; }"), TraceKind::Resolution);
        assert_eq!(kind("void Main(){ Nope(); }"), TraceKind::Resolution);
        assert_eq!(kind("void Main(){ Print(1, 2); }"), TraceKind::Arity);
        assert_eq!(kind("void Main(){ if (1) { } }"), TraceKind::Type);
        assert_eq!(kind("void Main(){ var f = 1; f(); }"), TraceKind::Type);
        assert_eq!(kind("int Main(){ var x = 1; }"), TraceKind::Stack);
    }

    #[test]
    fn traceback_names_callers() {
        let (result, _) = run("int Half(int x){ x / 0 } int Main(){ Half(4) }");
        let trace = result.unwrap_err();
        assert_eq!(trace.functions(), vec!["Half", "Main"]);
    }

    #[test]
    fn unknown_operator() {
        let mut vm = VM::with_output(Output::default());
        let mut def = FunctionDef::new("int", "Mod", vec![]);
        def.emit(Instruction::PushInt(7));
        def.emit(Instruction::PushInt(2));
        def.emit(Instruction::BinaryOp("%".to_string()));
        vm.add(def).unwrap();

        let error = vm.invoke("Mod", vec![]).unwrap_err();
        assert_eq!(error.kind, TraceKind::Operator);
    }

    #[test]
    fn registration() {
        let mut vm = VM::with_output(Output::default());
        let main = vm.add(FunctionDef::new("void", "Main", vec![])).unwrap();
        assert!(vm.add(FunctionDef::new("void", "Main", vec![])).is_err());
        assert!(vm
            .add(FunctionDef::nested(FunId(9), "void", "Lost", vec![]))
            .is_err());

        let inner = vm
            .add(FunctionDef::nested(main, "void", "Inner", vec![Variable::primitive("int", "x")]))
            .unwrap();
        assert_eq!(vm.function("Inner").unwrap().parent, Some(main));
        assert_eq!(inner, FunId(1));
    }

    #[test]
    fn loading_is_all_or_nothing() {
        let (mut vm, _) = vm("int Main(){ 1 }");
        let clash = parse(Source::source("int Other(){ 2 } int Main(){ 3 }")).unwrap();
        assert!(vm.load(clash).is_err());
        assert!(vm.function("Other").is_none());
        assert_eq!(vm.invoke("Main", vec![]), Ok(Some(Value::Int(1))));
    }
}
