use std::process::ExitCode;

fn main() -> ExitCode {
    decalops_cli::run()
}
