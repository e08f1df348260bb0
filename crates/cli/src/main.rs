use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing .env file is normal; real environment variables still apply.
    dotenv::dotenv().ok();
    tidy_cli::run()
}
