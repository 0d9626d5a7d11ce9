use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use ureq::Agent;

use crate::config::BarkConfig;

#[derive(Debug, Serialize)]
struct Push<'a> {
    title: &'a str,
    body: &'a str,
    sound: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<&'a str>,
}

impl<'a> Push<'a> {
    fn new(config: &'a BarkConfig, title: &'a str, body: &'a str) -> Self {
        Self {
            title,
            body,
            sound: &config.sound,
            group: config.group.as_deref(),
            level: config.level.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    code: i64,
    #[serde(default)]
    message: String,
}

impl Reply {
    fn check(self) -> Result<()> {
        if self.code != 200 {
            bail!("bark rejected the push: {} ({})", self.message, self.code);
        }
        Ok(())
    }
}

pub fn send(agent: &Agent, config: &BarkConfig, title: &str, body: &str) -> Result<()> {
    let reply: Reply = match agent
        .post(&config.url())
        .send_json(Push::new(config, title, body))
    {
        Ok(x) => x.into_json()?,
        Err(ureq::Error::Status(status, _)) => bail!("bark returned HTTP {status}"),
        Err(e) => bail!(e),
    };
    reply.check()
}
