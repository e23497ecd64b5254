use std::process::ExitCode;

fn main() -> ExitCode {
    studio_pos_cli::run()
}
