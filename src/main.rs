use agri_pipeline::cli::{self, Args};
use clap::Parser;
use std::process;

// Must stay synchronous: collaborators call `block_on` on their own runtimes.
fn main() {
    let args = Args::parse();

    if let Err(error) = cli::run(args) {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}
