//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`] or [`health`].

pub mod health;
pub mod run;

use crate::cli::{Cli, Commands};
use crate::error::CollectorError;

pub async fn dispatch(cli: Cli) -> Result<(), CollectorError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  devlogs-collector v{version} \u{2014} HTTP front door for structured application logs\n\n  \
         No command provided. To get started:\n\n    \
         devlogs-collector run --opensearch-host localhost     Ingest into a local OpenSearch\n    \
         devlogs-collector run --forward-url http://hub:8080   Proxy to another collector\n    \
         devlogs-collector health                              Check a running instance\n    \
         devlogs-collector --help                              See all commands and options\n"
    );
}
