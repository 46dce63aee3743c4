use std::process::ExitCode;

fn main() -> ExitCode {
    dealwise_cli::run()
}
