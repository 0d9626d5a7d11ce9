use std::{path::PathBuf, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use ureq::{Agent, AgentBuilder};

use crate::config::{BarkConfig, Config};

mod bark;
mod config;
mod crypto;
mod runner;
mod summary;
mod wps;

/// Signs every configured account into the WPS check-in campaign, draws the
/// daily lottery and pushes a summary to Bark.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Account file, JSON or TOML.
    #[clap(short, long, default_value = "config/token.json")]
    config: PathBuf,
    /// Print the summary instead of pushing it.
    #[clap(long)]
    no_push: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    if config.accounts.is_empty() {
        return Ok(());
    }

    let agent = agent();
    let report = runner::run(
        &config.accounts,
        |account| wps::Client::new(agent.clone(), &account.cookies, account.user_agent.as_deref()),
        thread::sleep,
    );
    summary::log_summary(&report);

    let body = summary::notification(&report);
    if cli.no_push {
        println!("{}\n\n{body}", summary::TITLE);
        return Ok(());
    }
    match BarkConfig::from_env() {
        Some(bark) => match bark::send(&agent, &bark, summary::TITLE, &body) {
            Ok(()) => log::info!("Notification sent"),
            Err(e) => log::warn!("Failed to send notification: {e:#}"),
        },
        None => log::warn!("BARK_PUSH is not set, skipping notification"),
    }

    Ok(())
}

fn agent() -> Agent {
    AgentBuilder::new().timeout(Duration::from_secs(30)).build()
}
