use std::{ops::RangeInclusive, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Local};
use rand::Rng;

use crate::{
    config::Account,
    wps::{cookie_uid, is_token_expired, LotteryComponent, Prize, SignIn, UserInfo},
};

/// Seconds between two accounts, keeps the vendor's abuse detection quiet.
pub const ACCOUNT_DELAY: RangeInclusive<f64> = 5.0..=10.0;
/// Seconds before each lottery draw.
pub const DRAW_DELAY: RangeInclusive<f64> = 1.0..=3.0;

pub trait Campaign {
    fn sign_in(&self, user_id: u64) -> Result<SignIn>;
    fn user_info(&self) -> Result<UserInfo>;
    fn lottery(&self, component: &LotteryComponent) -> Result<Prize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Signed,
    AlreadySigned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draw {
    Won(Prize),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AccountResult {
    pub account_name: String,
    pub status: Status,
    pub message: String,
    pub rewards: Vec<String>,
    pub available_draws: u32,
    pub draws: Vec<Draw>,
    /// User info read after drawing.
    pub balance: Option<UserInfo>,
}

impl AccountResult {
    fn new(account_name: &str) -> Self {
        Self {
            account_name: account_name.to_owned(),
            status: Status::Failed,
            message: String::new(),
            rewards: Vec::new(),
            available_draws: 0,
            draws: Vec::new(),
            balance: None,
        }
    }

    fn failed(mut self, message: String) -> Self {
        log::error!("{}: {message}", self.account_name);
        self.status = Status::Failed;
        self.message = message;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status != Status::Failed
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub results: Vec<AccountResult>,
    /// Names of accounts that were never attempted.
    pub skipped: Vec<String>,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
}

pub fn random_delay(rng: &mut impl Rng, range: RangeInclusive<f64>) -> Duration {
    Duration::from_secs_f64(rng.gen_range(range))
}

/// Processes every account in order. `connect` builds the client for one
/// account and `pause` performs the pacing sleeps.
pub fn run<C, F, P>(accounts: &[Account], mut connect: F, mut pause: P) -> Report
where
    C: Campaign,
    F: FnMut(&Account) -> C,
    P: FnMut(Duration),
{
    let started = Local::now();
    let mut rng = rand::thread_rng();
    let mut results = Vec::new();
    let mut skipped = Vec::new();

    for account in accounts {
        let name = &account.account_name;
        let Some(user_id) = account.user_id() else {
            log::warn!("{name}: no user_id configured, skipping");
            if let Some(uid) = cookie_uid(&account.cookies) {
                log::warn!("{name}: the cookies carry uid={uid}, set it as user_id");
            }
            skipped.push(name.clone());
            continue;
        };

        if !results.is_empty() {
            let delay = random_delay(&mut rng, ACCOUNT_DELAY);
            log::info!("Waiting {:.1}s before the next account", delay.as_secs_f64());
            pause(delay);
        }

        log::info!("Processing {name}");
        let result = if account.cookies.trim().is_empty() {
            AccountResult::new(name).failed("no cookies configured".to_owned())
        } else {
            process(account, user_id, &connect(account), &mut pause, &mut rng)
        };
        results.push(result);
    }

    Report {
        results,
        skipped,
        started,
        finished: Local::now(),
    }
}

fn process<C: Campaign>(
    account: &Account,
    user_id: u64,
    client: &C,
    pause: &mut impl FnMut(Duration),
    rng: &mut impl Rng,
) -> AccountResult {
    let name = &account.account_name;
    let mut result = AccountResult::new(name);

    match client.sign_in(user_id) {
        Ok(SignIn::Signed { rewards }) => {
            log::info!("{name}: signed in");
            for reward in &rewards {
                log::info!("{name}: reward {reward}");
            }
            result.status = Status::Signed;
            result.message = "signed in".to_owned();
            result.rewards = rewards;
        }
        Ok(SignIn::AlreadySigned) => {
            log::info!("{name}: already signed in today");
            result.status = Status::AlreadySigned;
            result.message = "already signed in today".to_owned();
        }
        Err(e) if is_token_expired(&e) => return result.failed(e.to_string()),
        Err(e) => return result.failed(format!("sign-in failed: {e:#}")),
    }

    let session = match client.user_info() {
        Ok(info) => {
            log::info!(
                "{name}: {} draw(s) available, {} points ({} expiring)",
                info.lottery_times,
                info.points,
                info.advent_points
            );
            info.lottery.map(|component| (info.lottery_times, component))
        }
        Err(e) => {
            log::warn!("{name}: failed to read user info: {e:#}");
            None
        }
    };

    match session {
        Some((available, component)) if available > 0 => {
            result.available_draws = available;
            let count = available.min(account.lottery_limit());
            log::info!(
                "{name}: drawing {count} of {available} (limit {})",
                account.lottery_limit()
            );
            for i in 1..=count {
                let delay = random_delay(rng, DRAW_DELAY);
                log::info!("Waiting {:.1}s before draw {i}/{count}", delay.as_secs_f64());
                pause(delay);

                match client.lottery(&component) {
                    Ok(prize) => {
                        log::info!(
                            "{name}: draw {i} won {} (type {:?}, order {:?}, id {})",
                            prize.name,
                            prize.reward_type,
                            prize.order_id,
                            prize.reward_id
                        );
                        result.draws.push(Draw::Won(prize));
                    }
                    Err(e) => {
                        let expired = is_token_expired(&e);
                        log::error!("{name}: draw {i} failed: {e:#}");
                        result.draws.push(Draw::Failed(e.to_string()));
                        if expired {
                            break;
                        }
                    }
                }
            }
        }
        _ => log::info!("{name}: no draws available"),
    }

    match client.user_info() {
        Ok(info) => result.balance = Some(info),
        Err(e) => log::warn!("{name}: failed to read final user info: {e:#}"),
    }

    result
}
