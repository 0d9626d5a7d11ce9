use std::collections::BTreeMap;

use crate::runner::{AccountResult, Draw, Report};

pub const TITLE: &str = "WPS check-in and lottery";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub draws: usize,
    /// Draws that paid out a named prize.
    pub prizes_won: usize,
    /// Won prizes by name.
    pub prizes: BTreeMap<String, usize>,
}

impl Summary {
    pub fn new(report: &Report) -> Self {
        let mut summary = Self {
            total: report.results.len(),
            skipped: report.skipped.len(),
            ..Default::default()
        };
        for result in &report.results {
            if result.succeeded() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.draws += result.draws.len();
            for draw in &result.draws {
                if let Draw::Won(prize) = draw {
                    if prize.is_prize() {
                        summary.prizes_won += 1;
                        *summary.prizes.entry(prize.name.clone()).or_default() += 1;
                    }
                }
            }
        }
        summary
    }
}

fn mark(result: &AccountResult) -> &'static str {
    if result.succeeded() {
        "✅"
    } else {
        "❌"
    }
}

pub fn log_summary(report: &Report) {
    let summary = Summary::new(report);
    log::info!(
        "{} account(s): {} succeeded, {} failed, {} skipped",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    if summary.draws > 0 {
        log::info!("{} draw(s), {} won", summary.draws, summary.prizes_won);
    }
    for (prize, count) in &summary.prizes {
        log::info!("  {prize}: {count}");
    }
    for result in &report.results {
        log::info!("  {} {}: {}", mark(result), result.account_name, result.message);
    }
}

/// The push notification body for a finished run.
pub fn notification(report: &Report) -> String {
    let summary = Summary::new(report);
    let mut lines = vec![
        format!("Accounts: {}", summary.total),
        format!("Succeeded: {}", summary.succeeded),
        format!("Failed: {}", summary.failed),
    ];
    if !report.skipped.is_empty() {
        lines.push(format!("Skipped (no user_id): {}", report.skipped.join(", ")));
    }
    lines.push(format!(
        "Run: {} to {}",
        report.started.format(TIME_FORMAT),
        report.finished.format(TIME_FORMAT)
    ));

    for result in &report.results {
        lines.push(String::new());
        lines.push(format!(
            "{} {}: {}",
            mark(result),
            result.account_name,
            result.message
        ));
        if !result.rewards.is_empty() {
            lines.push(format!("    Rewards: {}", result.rewards.join(", ")));
        }
        if !result.draws.is_empty() {
            lines.push(format!("    Draws ({} available):", result.available_draws));
            for (i, draw) in result.draws.iter().enumerate() {
                let outcome = match draw {
                    Draw::Won(prize) => &prize.name,
                    Draw::Failed(message) => message,
                };
                lines.push(format!("       #{}: {outcome}", i + 1));
            }
        }
        if result.succeeded() {
            match &result.balance {
                Some(info) => lines.push(format!(
                    "    Balance: {} draw(s) left | {} points | {} expiring",
                    info.lottery_times, info.points, info.advent_points
                )),
                None => lines.push("    Balance unavailable".to_owned()),
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::{
        runner::Status,
        wps::{Prize, UserInfo},
    };

    fn prize(name: &str) -> Draw {
        Draw::Won(Prize {
            name: name.to_owned(),
            reward_type: String::new(),
            order_id: String::new(),
            reward_id: 0,
        })
    }

    fn result(name: &str, status: Status, draws: Vec<Draw>) -> AccountResult {
        AccountResult {
            account_name: name.to_owned(),
            status,
            message: match status {
                Status::Signed => "signed in",
                Status::AlreadySigned => "already signed in today",
                Status::Failed => "sign-in failed: risk control",
            }
            .to_owned(),
            rewards: Vec::new(),
            available_draws: draws.len() as u32,
            draws,
            balance: None,
        }
    }

    fn report(results: Vec<AccountResult>, skipped: &[&str]) -> Report {
        let at = Local.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        Report {
            results,
            skipped: skipped.iter().map(|x| x.to_string()).collect(),
            started: at,
            finished: at + chrono::Duration::seconds(42),
        }
    }

    #[test]
    fn counts_add_up() {
        let report = report(
            vec![
                result("a", Status::Signed, vec![prize("vip"), prize("vip")]),
                result(
                    "b",
                    Status::AlreadySigned,
                    vec![prize("unknown"), prize("未中奖"), Draw::Failed("x".into())],
                ),
                result("c", Status::Failed, vec![]),
            ],
            &["d"],
        );
        let summary = Summary::new(&report);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded + summary.failed, summary.total);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.draws, 5);
        assert_eq!(summary.prizes_won, 2);
        assert_eq!(summary.prizes, BTreeMap::from([("vip".to_owned(), 2)]));
    }

    #[test]
    fn empty_report() {
        assert_eq!(Summary::new(&report(vec![], &[])), Summary::default());
    }

    #[test]
    fn notification_body() {
        let mut signed = result(
            "main",
            Status::Signed,
            vec![prize("3 day membership"), Draw::Failed("no chances left (error code 4003)".into())],
        );
        signed.rewards = vec!["10 points".to_owned()];
        signed.balance = Some(UserInfo {
            lottery_times: 1,
            points: 120,
            advent_points: 15,
            lottery: None,
        });
        let already = result("alt", Status::AlreadySigned, vec![]);
        let failed = result("old", Status::Failed, vec![]);

        let body = notification(&report(vec![signed, already, failed], &["ghost"]));
        let expected = "\
Accounts: 3
Succeeded: 2
Failed: 1
Skipped (no user_id): ghost
Run: 2026-10-19 08:00:00 to 2026-10-19 08:00:42

✅ main: signed in
    Rewards: 10 points
    Draws (2 available):
       #1: 3 day membership
       #2: no chances left (error code 4003)
    Balance: 1 draw(s) left | 120 points | 15 expiring

✅ alt: already signed in today
    Balance unavailable

❌ old: sign-in failed: risk control";
        assert_eq!(body, expected);
    }
}
