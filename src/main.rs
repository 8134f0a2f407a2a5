use std::process::ExitCode;

fn main() -> ExitCode {
    match epiabm::runner::run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("epiabm: {error}");
            ExitCode::FAILURE
        }
    }
}
