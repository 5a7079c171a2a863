use std::path::PathBuf;

use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "Ji", bin_name = "ji", about)]
pub struct Ji {
    /// The script to run
    #[structopt(parse(from_os_str))]
    pub path: PathBuf,

    /// The function to invoke, with no arguments
    #[structopt(short, long, default_value = "Main")]
    pub entry: String,

    /// Print the bytecode of every function before running
    #[structopt(short, long)]
    pub dump: bool,
}
