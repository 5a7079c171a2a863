use ji::{compile, Source, VM};

use crate::{cli::Ji, status::Status};

pub fn run(args: Ji) -> Result<(), String> {
    let source = Source::path(&args.path)
        .map_err(|e| format!("Could not read '{}': {}", args.path.display(), e))?;

    let program = compile(source).map_err(|e| e.to_string())?;

    let mut vm = VM::init();
    let ids = vm.load(program).map_err(|e| e.to_string())?;
    Status::info().log(&format!("Loaded {} function(s)", ids.len()));

    if args.dump {
        for id in ids {
            if let Some(function) = vm.function_by_id(id) {
                print!("{}", function);
            }
        }
    }

    if vm.function(&args.entry).is_none() {
        return Err(format!("No entry function named `{}`", args.entry));
    }

    let result = vm.invoke(&args.entry, vec![]).map_err(|e| e.to_string())?;
    Status::success().log(&format!("`{}` returned", args.entry));

    // the result goes to stdout after anything the script printed
    if let Some(value) = result {
        println!("{}", vm.show(&value));
    }

    Ok(())
}
