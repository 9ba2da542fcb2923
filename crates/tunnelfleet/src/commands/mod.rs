//! Command handlers, one module per subcommand.

pub mod catalog;
pub mod generate;
pub mod sync;
pub mod validate;

use clap::CommandFactory;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    /// Finished, but a best-effort step was skipped or failed.
    Degraded,
}

impl Outcome {
    pub fn from_warnings<T>(warnings: &[T]) -> Self {
        if warnings.is_empty() {
            Self::Clean
        } else {
            Self::Degraded
        }
    }
}

/// Route a parsed command to its handler.
pub fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<Outcome, CliError> {
    match cmd {
        Command::Generate(args) => generate::handle(&args, global),
        Command::SyncCatalog(args) => sync::handle(&args, global),
        Command::Catalog => catalog::handle(global),
        Command::Validate => validate::handle(global),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "tunnelfleet", &mut std::io::stdout());
            Ok(Outcome::Clean)
        }
    }
}
