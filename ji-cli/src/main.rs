use std::process;

use structopt::StructOpt;

// argument parser and configuation
pub mod cli;
pub mod status;

// command implementations
pub mod run;

use crate::{cli::Ji, status::Status};

fn main() {
    let args = Ji::from_args();

    if let Err(r) = run::run(args) {
        Status::fatal().log(&r);
        process::exit(1);
    }
}
