use std::process::ExitCode;

fn main() -> ExitCode {
    swaig_cli::run()
}
