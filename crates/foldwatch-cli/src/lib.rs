mod args;
mod commands;
mod context;
mod handlers;

pub use args::{BenchCommand, Cli, ClientCommand, Commands, HistoryCommand, ViewArg};
pub use commands::run;
