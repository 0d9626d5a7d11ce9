use std::{env, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const DEFAULT_LOTTERY_LIMIT: u32 = 2;

// placeholder values in one account must not reject the whole file, so the
// loosely typed fields are read leniently and validated per account
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    #[serde(default = "unnamed", deserialize_with = "name")]
    pub account_name: String,
    #[serde(default, deserialize_with = "user_id")]
    pub user_id: Option<u64>,
    #[serde(default, deserialize_with = "text")]
    pub cookies: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub user_agent: Option<String>,
    pub max_lottery_limit: Option<u32>,
}

fn unnamed() -> String {
    "unnamed account".to_owned()
}

fn name<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(non_empty(d)?.unwrap_or_else(unnamed))
}

fn text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn non_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.filter(|x| !x.trim().is_empty()))
}

// numbers and numeric strings are ids, anything else counts as missing
fn user_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(x) => x.as_u64(),
        Value::String(x) => x.trim().parse().ok(),
        _ => None,
    })
}

impl Account {
    /// The configured user id, treating `0` the same as a missing one.
    pub fn user_id(&self) -> Option<u64> {
        self.user_id.filter(|&id| id != 0)
    }

    pub fn lottery_limit(&self) -> u32 {
        self.max_lottery_limit.unwrap_or(DEFAULT_LOTTERY_LIMIT)
    }
}

// accounts live either at the top level or under "wps" in the shared
// multi-script config file
#[derive(Deserialize)]
struct RawConfig {
    accounts: Option<Vec<Account>>,
    wps: Option<Section>,
}

#[derive(Deserialize)]
struct Section {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Debug)]
pub struct Config {
    pub accounts: Vec<Account>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = if path.extension().is_some_and(|x| x == "toml") {
            Self::from_toml(&text)
        } else {
            Self::from_json(&text)
        }
        .with_context(|| format!("failed to parse config {}", path.display()))?;

        if config.accounts.is_empty() {
            log::warn!("No accounts found in {}", path.display());
        } else {
            log::info!("Loaded {} account(s)", config.accounts.len());
        }
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str::<RawConfig>(text)?.into())
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str::<RawConfig>(text)?.into())
    }
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let accounts = match (raw.accounts, raw.wps) {
            (Some(x), _) => x,
            (None, Some(section)) => section.accounts,
            (None, None) => Vec::new(),
        };
        Self { accounts }
    }
}

pub const DEFAULT_BARK_SERVER: &str = "https://api.day.app";
pub const DEFAULT_BARK_SOUND: &str = "birdsong";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarkConfig {
    /// Either a device key or a full push URL.
    pub push: String,
    pub sound: String,
    pub group: Option<String>,
    pub level: Option<String>,
}

impl BarkConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).map(|x| x.trim().to_owned()).filter(|x| !x.is_empty());
        Some(Self {
            push: get("BARK_PUSH")?,
            sound: get("BARK_SOUND").unwrap_or_else(|| DEFAULT_BARK_SOUND.to_owned()),
            group: get("BARK_GROUP"),
            level: get("BARK_LEVEL"),
        })
    }

    pub fn url(&self) -> String {
        if self.push.starts_with("http://") || self.push.starts_with("https://") {
            self.push.trim_end_matches('/').to_owned()
        } else {
            format!("{DEFAULT_BARK_SERVER}/{}", self.push)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn flat_accounts_with_defaults() {
        let config = Config::from_json(
            r#"{"accounts": [
                {"account_name": "main", "user_id": 123456, "cookies": "wps_sid=abc; uid=123456"},
                {"account_name": "alt", "user_id": 42, "cookies": "x=y", "user_agent": "ua", "max_lottery_limit": 5}
            ]}"#,
        )
        .unwrap();

        assert_eq!(config.accounts.len(), 2);
        let main = &config.accounts[0];
        assert_eq!(main.user_id(), Some(123456));
        assert_eq!(main.user_agent, None);
        assert_eq!(main.lottery_limit(), DEFAULT_LOTTERY_LIMIT);
        let alt = &config.accounts[1];
        assert_eq!(alt.user_agent.as_deref(), Some("ua"));
        assert_eq!(alt.lottery_limit(), 5);
    }

    #[test]
    fn nested_under_wps() {
        let config = Config::from_json(
            r#"{"sf": {"accounts": []}, "wps": {"accounts": [{"cookies": "a=b"}]}}"#,
        )
        .unwrap();

        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].account_name, "unnamed account");
        assert_eq!(config.accounts[0].user_id(), None);
    }

    #[test]
    fn zero_user_id_counts_as_missing() {
        let config = Config::from_json(r#"{"accounts": [{"user_id": 0, "cookies": "a=b"}]}"#).unwrap();
        assert_eq!(config.accounts[0].user_id(), None);
    }

    #[test]
    fn toml_accounts() {
        let config = Config::from_toml(
            r#"
            [[accounts]]
            account_name = "main"
            user_id = 7
            cookies = "wps_sid=abc"
            max_lottery_limit = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.accounts[0].user_id(), Some(7));
        assert_eq!(config.accounts[0].lottery_limit(), 1);
    }

    #[test]
    fn placeholder_values_only_affect_their_account() {
        let config = Config::from_json(
            r#"{"wps":{"accounts":[
                {"account_name":"todo","user_id":"","cookies":""},
                {"account_name":null,"user_id":null,"cookies":null,"user_agent":""},
                {"account_name":"odd","user_id":"fill me in","cookies":"a=b"},
                {"account_name":"quoted","user_id":" 77 ","cookies":"a=b"},
                {"account_name":"main","user_id":1,"cookies":"a=b"}
            ]}}"#,
        )
        .unwrap();

        let accounts = &config.accounts;
        assert_eq!(accounts.len(), 5);
        assert_eq!(accounts[0].user_id(), None);
        assert_eq!(accounts[0].cookies, "");
        assert_eq!(accounts[1].account_name, "unnamed account");
        assert_eq!(accounts[1].user_id(), None);
        assert_eq!(accounts[1].cookies, "");
        assert_eq!(accounts[1].user_agent, None);
        assert_eq!(accounts[2].user_id(), None);
        assert_eq!(accounts[3].user_id(), Some(77));
        assert_eq!(accounts[4].user_id(), Some(1));
        assert_eq!(accounts[4].cookies, "a=b");
    }

    #[test]
    fn negative_or_fractional_user_id_is_missing() {
        let config = Config::from_json(
            r#"{"accounts":[{"user_id":-5,"cookies":"a=b"},{"user_id":1.5,"cookies":"a=b"}]}"#,
        )
        .unwrap();
        assert_eq!(config.accounts[0].user_id(), None);
        assert_eq!(config.accounts[1].user_id(), None);
    }

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = env::temp_dir().join(format!("wps-checkin-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_picks_format_by_extension() {
        let json = temp_file(
            "accounts.json",
            r#"{"wps":{"accounts":[{"account_name":"main","user_id":1,"cookies":"a=b"}]}}"#,
        );
        let toml = temp_file(
            "accounts.toml",
            "[wps]\n[[wps.accounts]]\naccount_name = \"alt\"\nuser_id = 2\ncookies = \"c=d\"\n",
        );

        let from_json = Config::load(&json).unwrap();
        let from_toml = Config::load(&toml).unwrap();
        fs::remove_file(&json).unwrap();
        fs::remove_file(&toml).unwrap();

        assert_eq!(from_json.accounts[0].account_name, "main");
        assert_eq!(from_json.accounts[0].user_id(), Some(1));
        assert_eq!(from_toml.accounts[0].account_name, "alt");
        assert_eq!(from_toml.accounts[0].user_id(), Some(2));
        assert_eq!(from_toml.accounts[0].cookies, "c=d");
    }

    #[test]
    fn load_errors_name_the_file() {
        let missing = env::temp_dir().join("wps-checkin-does-not-exist.json");
        let err = Config::load(&missing).unwrap_err();
        assert!(err.to_string().starts_with("failed to read config"), "{err}");

        // TOML content behind a .json name goes to the JSON parser
        let wrong = temp_file("mislabelled.json", "[[accounts]]\nuser_id = 1\n");
        let err = Config::load(&wrong).unwrap_err();
        fs::remove_file(&wrong).unwrap();
        assert!(err.to_string().starts_with("failed to parse config"), "{err}");
    }

    #[test]
    fn missing_accounts_is_empty() {
        assert!(Config::from_json("{}").unwrap().accounts.is_empty());
        assert!(Config::from_json("not json").is_err());
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn bark_requires_push() {
        assert_eq!(BarkConfig::from_lookup(lookup(&[("BARK_SOUND", "bell")])), None);
        assert_eq!(BarkConfig::from_lookup(lookup(&[("BARK_PUSH", "  ")])), None);
    }

    #[test]
    fn bark_defaults_and_overrides() {
        let bark = BarkConfig::from_lookup(lookup(&[("BARK_PUSH", "devicekey")])).unwrap();
        assert_eq!(bark.sound, DEFAULT_BARK_SOUND);
        assert_eq!(bark.group, None);
        assert_eq!(bark.url(), "https://api.day.app/devicekey");

        let bark = BarkConfig::from_lookup(lookup(&[
            ("BARK_PUSH", "https://bark.example.com/key/"),
            ("BARK_SOUND", "bell"),
            ("BARK_GROUP", "wps"),
            ("BARK_LEVEL", "timeSensitive"),
        ]))
        .unwrap();
        assert_eq!(bark.url(), "https://bark.example.com/key");
        assert_eq!(bark.sound, "bell");
        assert_eq!(bark.group.as_deref(), Some("wps"));
        assert_eq!(bark.level.as_deref(), Some("timeSensitive"));
    }
}
