// src/main.rs
use std::env;
use std::process::ExitCode;

use poll_store::{db, Config, PgPollStore, PollStore, StoreResult};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let command = env::args().nth(1).unwrap_or_else(|| "migrate".to_string());
    match run(&command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{command} failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: &str) -> StoreResult<()> {
    let config = Config::from_env()?;
    let pool = db::create_pool(&config).await?;

    match command {
        "migrate" => {
            db::migrate(&pool).await?;
            let listing = PgPollStore::new(pool).list_polls(config.first_page()).await?;
            tracing::info!(
                polls = listing.polls.total,
                voted = listing.voted_questions.len(),
                "schema up to date"
            );
        }
        "rollback" => db::rollback(&pool).await?,
        other => {
            return Err(poll_store::StoreError::Config(format!(
                "unknown command {other:?}, expected `migrate` or `rollback`"
            )))
        }
    }
    Ok(())
}
