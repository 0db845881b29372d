use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    agentcc::run().await
}
