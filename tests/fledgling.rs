//! Snippet tests for the ji pipeline as a whole.

use std::{cell::RefCell, fs, io, io::Write, path::PathBuf, rc::Rc};

use ji::{
    common::source::Source,
    compiler::{lex, parse},
    vm::vm::VM,
};

/// Represents specific success/failure modes of a snippet test.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Syntax,
    Trace,
}

impl Outcome {
    pub fn parse(outcome: &str) -> Outcome {
        match outcome {
            "success" => Outcome::Success,
            "syntax" => Outcome::Syntax,
            "trace" => Outcome::Trace,
            invalid => {
                println!("invalid: '{}'", invalid);
                panic!("invalid outcome in strat heading");
            },
        }
    }
}

/// Represents what part of the pipeline a snippet tests.
#[derive(Debug)]
pub enum Action {
    Lex,
    Parse,
    Run,
}

impl Action {
    pub fn parse(action: &str) -> Action {
        match action {
            "lex" => Action::Lex,
            "parse" => Action::Parse,
            "run" => Action::Run,
            invalid => {
                println!("invalid: '{}'", invalid);
                panic!("invalid action in strat heading");
            },
        }
    }
}

/// Represents a test strategy for executing a snippet,
/// Found at the top of each file.
#[derive(Debug)]
pub struct TestStrat {
    /// How to run the test.
    action: Action,
    /// The expected outcome.
    outcome: Outcome,
    /// What `Main` should return, as printed; `none` for nothing.
    /// Should only be used with Action::Run
    expect: Option<String>,
    /// Lines `Print` should produce, if checked at all.
    output: Option<Vec<String>>,
}

impl TestStrat {
    /// Uses a heading to construct a test strat
    pub fn heading(heading: Vec<(String, String)>) -> TestStrat {
        let mut outcome = None;
        let mut action = None;
        let mut expect = None;
        let mut output: Option<Vec<String>> = None;

        for (strat, result) in heading.into_iter() {
            match strat.as_str() {
                "outcome" => outcome = Some(Outcome::parse(&result)),
                "action" => action = Some(Action::parse(&result)),
                "expect" => expect = Some(result),
                // one line of output per entry
                "output" => output.get_or_insert_with(Vec::new).push(result),
                invalid => {
                    println!("invalid: '{}'", invalid);
                    panic!("invalid strat in strat heading");
                },
            }
        }

        TestStrat {
            outcome: outcome.expect("no outcome provided"),
            action: action.expect("no action provided"),
            expect,
            output,
        }
    }

    /// Parses the Test Strat from a given snippet,
    /// returning it with the snippet's code.
    /// Heading lines are blanked out so line numbers in errors stay put.
    pub fn snippet(source: &Rc<Source>) -> (TestStrat, Rc<Source>) {
        let mut heading = vec![];
        let mut body = vec![];
        let mut in_heading = true;

        for line in source.contents.lines() {
            if in_heading && line.starts_with('#') {
                let spliced = line[1..].trim().splitn(2, ':').collect::<Vec<&str>>();
                if spliced.len() <= 1 {
                    panic!("Missing colon in test strat heading")
                }

                let strat = spliced[0].trim().to_string();
                let single = strat != "output";
                if single && heading.iter().any(|(s, _)| s == &strat) {
                    panic!("Key present twice in test strat heading");
                }
                heading.push((strat, spliced[1].trim().to_string()));
                body.push("");
            } else {
                in_heading = false;
                body.push(line);
            }
        }

        let code = Source::new(&body.join("\n"), &source.path);
        (TestStrat::heading(heading), code)
    }
}

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

fn test_snippet(source: Rc<Source>, strat: TestStrat) {
    let actual_outcome: Outcome = match strat.action {
        Action::Lex => match lex(source) {
            Ok(_) => Outcome::Success,
            Err(_) => Outcome::Syntax,
        },

        Action::Parse => match parse(source) {
            Ok(_) => Outcome::Success,
            Err(_) => Outcome::Syntax,
        },

        Action::Run => match parse(source) {
            Ok(program) => {
                let output = Output::default();
                let mut vm = VM::with_output(output.clone());
                let result = vm.load(program).and_then(|_| vm.invoke("Main", vec![]));

                match result {
                    Ok(value) => {
                        if let Some(expected) = &strat.expect {
                            let actual = match &value {
                                Some(value) => vm.show(value),
                                None => "none".to_string(),
                            };
                            if expected != &actual {
                                println!("Returned: {}", actual);
                                println!("Expected: {}", expected);
                                panic!("Returned value does not match")
                            }
                        }
                        if let Some(lines) = &strat.output {
                            let printed = String::from_utf8(output.0.borrow().clone())
                                .expect("printed output is utf-8");
                            let printed = printed.lines().collect::<Vec<_>>();
                            if &printed != lines {
                                println!("Printed: {:?}", printed);
                                println!("Expected: {:?}", lines);
                                panic!("Printed output does not match")
                            }
                        }
                        Outcome::Success
                    },
                    Err(trace) => {
                        println!("{}", trace);
                        Outcome::Trace
                    },
                }
            },
            Err(e) => {
                println!("{}", e);
                Outcome::Syntax
            },
        },
    };

    if actual_outcome != strat.outcome {
        println!("expected outcome {:?}", strat.outcome);
        println!("actual outcome {:?}", actual_outcome);
        panic!("test failed, outcomes are not the same");
    }
}

#[test]
fn test_snippets() {
    let paths = fs::read_dir("./tests/snippets")
        .expect("You must be in the base ji directory, snippets in ./tests/snippets");

    let mut to_run: Vec<PathBuf> = vec![];
    for path in paths {
        to_run.push(path.expect("Could not read path").path())
    }
    to_run.sort();

    let mut counter = 0;
    println!("\nRunning {} snippet test(s)...", to_run.len());

    while let Some(path) = to_run.pop() {
        println!("test {}: {}...", counter, path.display());

        let source = Source::path(&path).expect("Could not get snippet source");
        let (test_strat, code) = TestStrat::snippet(&source);

        test_snippet(code, test_strat);
        counter += 1;
    }

    println!("All tests passed!\n");
}
