use anyhow::Result;
use laptime_tracker::{config::Config, fetch::Fetcher, logging, process};
use std::process::ExitCode;
use tracing::{error, info};

/// Fetch and parse the timing page once, print the snapshot as JSON.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::init("info");

    let config = Config::load()?;
    let fetcher = Fetcher::new(&config)?;
    info!(url = %fetcher.url(), "scraping once");

    match process::scrape(&fetcher).await {
        process::PollOutcome::Data(snap) => {
            println!("{}", serde_json::to_string_pretty(&snap)?);
            Ok(ExitCode::SUCCESS)
        }
        process::PollOutcome::FetchFailed(e) => {
            error!(error = %e, "fetch failed");
            Ok(ExitCode::FAILURE)
        }
        process::PollOutcome::ParseFailed(e) => {
            error!(error = %e, "parse failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
