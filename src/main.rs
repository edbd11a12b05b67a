use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match staff_access::run_server().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("staff-access failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
