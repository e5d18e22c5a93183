//! Command-line driver standing in for the console's screens.

mod args;
mod commands;

pub use args::{AdminsCommand, Cli, Command, DocumentsCommand, LoginArgs, PatientsCommand, StatusArg};
pub use commands::run;
