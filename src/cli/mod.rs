mod root;
pub use root::{parse, Command, GlobalOptions, GridumpCommand, Outcome};

mod check;
mod compare;
mod print;
mod recover;
