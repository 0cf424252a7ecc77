//! kubestage CLI entrypoint (spec §6). Parses the verb-noun grammar,
//! builds the logger explicitly here (spec §9 "Global state"), and maps
//! whatever comes back onto the exit-code table.

mod cli;
mod commands;
mod error;
mod logging;
mod output;
mod secretfile;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Command, Noun};
use error::AppError;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();
    match dispatch(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(&err.to_string());
            err.exit_code()
        }
    }
}

async fn dispatch(command: Command) -> Result<(), AppError> {
    match command {
        Command::Create(args) | Command::Update(args) => match args.noun {
            Noun::Workflow(w) => commands::create_or_update_workflow(w).await,
            Noun::Cw(c) => commands::create_or_update_cw(c).await,
            Noun::Secret(s) => commands::create_or_update_secret(s).await,
            Noun::Workflows(_) | Noun::Secrets(_) => {
                Err(AppError::Usage("create/update applies to a single workflow, cw, or secret".to_string()))
            }
        },
        Command::Delete(args) => match args.noun {
            Noun::Workflow(w) => commands::delete_workflow(w).await,
            Noun::Cw(c) => commands::delete_cw(c).await,
            Noun::Secret(s) => commands::delete_secret(s).await,
            Noun::Workflows(_) | Noun::Secrets(_) => {
                Err(AppError::Usage("delete applies to a single workflow, cw, or secret".to_string()))
            }
        },
        Command::Get(args) => match args.noun {
            Noun::Workflow(w) => commands::get_workflow(w).await,
            Noun::Cw(c) => commands::get_cw(c).await,
            Noun::Secret(s) => commands::get_secret(s).await,
            Noun::Workflows(l) => commands::get_workflows(l).await,
            Noun::Secrets(l) => commands::get_secrets(l).await,
        },
    }
}
