//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::MeshError;

pub async fn dispatch(cli: Cli) -> Result<(), MeshError> {
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
        "\n  relaymesh v{version}: dynamically configured load-balancing proxy\n\n  \
         No command provided. To get started:\n\n    \
         relaymesh run                     Start the proxy (auto-detects ./relaymesh.yaml)\n    \
         relaymesh run -c routes.yaml      Start with a specific route file\n    \
         relaymesh validate routes.yaml    Check a route file\n    \
         relaymesh --help                  See all commands and options\n"
    );
}
