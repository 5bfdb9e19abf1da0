use anyhow::Result;
use foldwatch_runtime::resolve_data_path;

use crate::args::{BenchCommand, Cli, ClientCommand, Commands, HistoryCommand};
use crate::handlers;

pub fn run(cli: Cli) -> Result<()> {
    let data_dir = resolve_data_path(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Client { command } => match command {
            ClientCommand::Add {
                name,
                log_root,
                clock_offset_minutes,
                ignore_utc_offset,
            } => handlers::client::add(
                &data_dir,
                name,
                log_root,
                clock_offset_minutes,
                ignore_utc_offset,
            ),
            ClientCommand::List => handlers::client::list(&data_dir),
            ClientCommand::Remove { name } => handlers::client::remove(&data_dir, &name),
        },

        Commands::Sweep { workers } => handlers::sweep::handle(&data_dir, workers),

        Commands::History { command } => match command {
            HistoryCommand::List {
                query,
                view,
                page,
                page_size,
                project,
                client,
            } => handlers::history::list(
                &data_dir,
                query,
                view.into(),
                page,
                page_size,
                project,
                client,
            ),
            HistoryCommand::Delete { id } => handlers::history::delete(&data_dir, id),
        },

        Commands::Bench { command } => match command {
            BenchCommand::List => handlers::bench::list(&data_dir),
        },
    }
}
