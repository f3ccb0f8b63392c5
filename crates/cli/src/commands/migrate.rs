use decalops_core::config::LoadOptions;

use crate::commands::{execute, CommandOutput, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    execute("migrate", options, "operator", |_context| async {
        Ok(CommandOutput::message("applied pending migrations"))
    })
}
