//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`].

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::GrayrouteError;

pub async fn dispatch(cli: Cli) -> Result<(), GrayrouteError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
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
        "\n  grayroute v{version}: canary-aware HTTP gateway\n\n  \
         No command provided. To get started:\n\n    \
         grayroute validate grayroute.yaml   Check a config file\n    \
         grayroute run                       Start (auto-detects ./grayroute.yaml)\n    \
         grayroute run -c sidecar.yaml       Start with a specific config file\n    \
         grayroute --help                    See all commands and options\n"
    );
}
