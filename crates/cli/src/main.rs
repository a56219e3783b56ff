use std::process::ExitCode;

fn main() -> ExitCode {
    drivethru_cli::run()
}
