use clap::Parser;
use dotenv::dotenv;
use jobmarket_agent::cli::Args;
use jobmarket_agent::error::AgentError;

#[tokio::main]
async fn main() -> Result<(), AgentError> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    jobmarket_agent::run(args).await
}
