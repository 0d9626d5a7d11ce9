use std::fmt;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use ureq::{Agent, Request};

use crate::{crypto::CryptoData, runner::Campaign};

const ENCRYPT_KEY_URL: &str = "https://personal-bus.wps.cn/sign_in/v1/encrypt/key";
const SIGN_IN_URL: &str = "https://personal-bus.wps.cn/sign_in/v1/sign_in";
const PAGE_INFO_URL: &str = "https://personal-act.wps.cn/activity-rubik/activity/page_info";
const COMPONENT_ACTION_URL: &str =
    "https://personal-act.wps.cn/activity-rubik/activity/component_action";

const ACTIVITY_NUMBER: &str = "HD2025031821201822";
const PAGE_NUMBER: &str = "YM2025031821202008";
const MK_KEY: &str = "4b9dgIxiksbUzBO6pGTyaZgGnAyBJlWN4oi";
const POSITION: &str = "pc_grzx_sign";
const PAY_ORIGIN: &str = "pc_ucs_rwzx_sign";
const LOTTERY_SESSION: u32 = 2;

const LOTTERY_COMPONENT: i64 = 45;
const POINTS_COMPONENT: i64 = 36;

const NOT_LOGGED_IN_CODE: i64 = 2000000;

const UNKNOWN_PRIZE: &str = "unknown";
// the vendor's reward name for a losing draw
const NO_PRIZE: &str = "未中奖";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

// what the campaign page itself sends; ureq negotiates gzip on its own
const BASE_HEADERS: &[(&str, &str)] = &[
    ("Accept", "application/json, text/plain, */*"),
    ("Content-Type", "application/json"),
    ("pragma", "no-cache"),
    ("cache-control", "no-cache"),
    ("sec-ch-ua-platform", "\"macOS\""),
    (
        "sec-ch-ua",
        "\"Chromium\";v=\"142\", \"Brave\";v=\"142\", \"Not_A Brand\";v=\"99\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-gpc", "1"),
    ("accept-language", "zh-CN,zh;q=0.9"),
    ("origin", "https://personal-act.wps.cn"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-dest", "empty"),
    ("priority", "u=1, i"),
];

/// The session cookie is no longer accepted.
#[derive(Debug)]
pub struct TokenExpired;

impl fmt::Display for TokenExpired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token expired, log in again and refresh the cookies")
    }
}

impl std::error::Error for TokenExpired {}

pub fn is_token_expired(err: &anyhow::Error) -> bool {
    err.is::<TokenExpired>()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignIn {
    Signed { rewards: Vec<String> },
    AlreadySigned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotteryComponent {
    pub number: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub lottery_times: u32,
    pub points: i64,
    pub advent_points: i64,
    /// Present when a lottery session is in progress.
    pub lottery: Option<LotteryComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prize {
    pub name: String,
    pub reward_type: String,
    pub order_id: String,
    pub reward_id: i64,
}

impl Prize {
    /// Whether the draw actually paid out something nameable.
    pub fn is_prize(&self) -> bool {
        self.name != UNKNOWN_PRIZE && self.name != NO_PRIZE
    }
}

/// The `{result, data, msg, code, ext_msg}` wrapper around every response.
#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<String>,
    data: Option<Value>,
    msg: Option<String>,
    code: Option<Value>,
    ext_msg: Option<String>,
}

impl Envelope {
    fn is_ok(&self) -> bool {
        self.result.as_deref() == Some("ok")
    }

    fn token_expired(&self) -> bool {
        self.code.as_ref().and_then(Value::as_i64) == Some(NOT_LOGGED_IN_CODE)
            && self.ext_msg.as_deref() == Some("userNotLogin")
    }

    fn into_data(self) -> Result<Value> {
        if self.is_ok() {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        if self.token_expired() {
            return Err(TokenExpired.into());
        }
        bail!(self.msg.unwrap_or_else(|| "unknown error".to_owned()))
    }
}

fn sign_in_result(envelope: Envelope) -> Result<SignIn> {
    if !envelope.is_ok() && !envelope.token_expired() && envelope.msg.as_deref() == Some("has sign") {
        return Ok(SignIn::AlreadySigned);
    }

    #[derive(Default, Deserialize)]
    struct Data {
        #[serde(default)]
        rewards: Vec<Reward>,
    }

    #[derive(Deserialize)]
    struct Reward {
        reward_name: Option<String>,
    }

    let data: Data = serde_json::from_value(envelope.into_data()?).unwrap_or_default();
    let rewards = data
        .rewards
        .into_iter()
        .filter_map(|x| x.reward_name)
        .filter(|x| !x.is_empty())
        .collect();
    Ok(SignIn::Signed { rewards })
}

fn user_info_result(envelope: Envelope) -> Result<UserInfo> {
    let data = envelope.into_data()?;
    let components = data.as_array().context("page info has no component list")?;

    #[derive(Deserialize)]
    struct Lottery {
        #[serde(default)]
        lottery_list: Vec<Session>,
    }

    #[derive(Deserialize)]
    struct Session {
        session_status: Option<String>,
        #[serde(default)]
        times: u32,
    }

    #[derive(Deserialize)]
    struct TaskCenter {
        #[serde(default)]
        integral: i64,
        #[serde(default)]
        advent_integral: i64,
    }

    let mut info = UserInfo::default();
    for component in components {
        let id = || LotteryComponent {
            number: text(&component["number"]),
            node_id: text(&component["component_node_id"]),
        };
        match component["type"].as_i64() {
            Some(LOTTERY_COMPONENT) if component.get("lottery_v2").is_some() => {
                let lottery: Lottery = serde_json::from_value(component["lottery_v2"].clone())?;
                if let Some(session) = lottery
                    .lottery_list
                    .iter()
                    .find(|x| x.session_status.as_deref() == Some("IN_PROGRESS"))
                {
                    info.lottery_times = session.times;
                    info.lottery = Some(id());
                }
            }
            Some(POINTS_COMPONENT) if component.get("task_center_user_info").is_some() => {
                let task: TaskCenter =
                    serde_json::from_value(component["task_center_user_info"].clone())?;
                info.points = task.integral;
                info.advent_points = task.advent_integral;
            }
            _ => {}
        }
    }
    Ok(info)
}

fn lottery_result(envelope: Envelope) -> Result<Prize> {
    let data = envelope.into_data()?;
    let draw = &data["lottery_v2"];
    if draw["success"].as_bool() != Some(true) {
        let message = match draw["send_msg"].as_str() {
            Some(x) if !x.is_empty() => x,
            _ => "draw failed",
        };
        bail!("{message} (error code {})", draw["error_code"].as_i64().unwrap_or(0));
    }
    Ok(Prize {
        name: match text(&draw["reward_name"]) {
            x if x.is_empty() => UNKNOWN_PRIZE.to_owned(),
            x => x,
        },
        reward_type: text(&draw["reward_type"]),
        order_id: text(&draw["order_id"]),
        reward_id: draw["reward_id"].as_i64().unwrap_or(0),
    })
}

// the vendor is loose about string vs number fields
fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(x) => x.clone(),
        x => x.to_string(),
    }
}

/// Keeps only well formed `name=value` pairs of a pasted cookie header.
pub fn normalize_cookies(raw: &str) -> String {
    raw.split(';')
        .map(str::trim)
        .filter(|x| x.contains('=') && !x.starts_with('='))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The numeric `uid` cookie, if the session carries one.
pub fn cookie_uid(cookies: &str) -> Option<u64> {
    cookies
        .split(';')
        .filter_map(|x| x.trim().split_once('='))
        .find(|(name, _)| *name == "uid")
        .and_then(|(_, value)| value.parse().ok())
}

fn activity_referer() -> String {
    format!(
        "https://personal-act.wps.cn/rubik2/portal/{ACTIVITY_NUMBER}/{PAGE_NUMBER}?cs_from=&mk_key={MK_KEY}&position={POSITION}"
    )
}

pub struct Client {
    agent: Agent,
    cookies: String,
    user_agent: String,
}

impl Client {
    pub fn new(agent: Agent, cookies: &str, user_agent: Option<&str>) -> Self {
        Self {
            agent,
            cookies: normalize_cookies(cookies),
            user_agent: user_agent.unwrap_or(DEFAULT_USER_AGENT).to_owned(),
        }
    }

    fn request(&self, method: &str, url: &str, same_origin: bool) -> Request {
        let mut request = self
            .agent
            .request(method, url)
            .set("User-Agent", &self.user_agent)
            .set("Cookie", &self.cookies);
        for (name, value) in BASE_HEADERS {
            request = request.set(name, value);
        }
        if same_origin {
            request
                .set("sec-fetch-site", "same-origin")
                .set("referer", &activity_referer())
        } else {
            request
                .set("sec-fetch-site", "same-site")
                .set("referer", "https://personal-act.wps.cn/")
        }
    }

    fn call(&self, request: Request, body: Option<Value>) -> Result<Envelope> {
        log::debug!("{} {}", request.method(), request.url());
        let response = match body {
            Some(body) => {
                log::debug!("request body: {body}");
                request.send_json(body)
            }
            None => request.call(),
        };
        let response = match response {
            Ok(x) => x,
            Err(ureq::Error::Status(status, _)) => bail!("HTTP {status}"),
            Err(e) => bail!(e),
        };
        let text = response.into_string()?;
        log::debug!("response: {text}");
        serde_json::from_str(&text).context("response is not a JSON envelope")
    }

    /// The base64 encoded PEM public key used to wrap the login token.
    pub fn encrypt_key(&self) -> Result<String> {
        let data = self
            .call(self.request("GET", ENCRYPT_KEY_URL, false), None)?
            .into_data()?;
        match data {
            Value::String(x) if !x.is_empty() => Ok(x),
            _ => bail!("key endpoint returned no key"),
        }
    }
}

impl Campaign for Client {
    fn sign_in(&self, user_id: u64) -> Result<SignIn> {
        let key = self.encrypt_key().context("failed to fetch encryption key")?;
        let crypto = CryptoData::new(&key, user_id)?;

        let request = self
            .request("POST", SIGN_IN_URL, false)
            .set("token", &crypto.token);
        let body = json!({
            "encrypt": true,
            "extra": crypto.extra,
            "pay_origin": PAY_ORIGIN,
        });
        sign_in_result(self.call(request, Some(body))?)
    }

    fn user_info(&self) -> Result<UserInfo> {
        let request = self
            .request("GET", PAGE_INFO_URL, true)
            .query("activity_number", ACTIVITY_NUMBER)
            .query("page_number", PAGE_NUMBER);
        user_info_result(self.call(request, None)?)
    }

    fn lottery(&self, component: &LotteryComponent) -> Result<Prize> {
        let body = json!({
            "component_uniq_number": {
                "activity_number": ACTIVITY_NUMBER,
                "page_number": PAGE_NUMBER,
                "component_number": component.number,
                "component_node_id": component.node_id,
                "filter_params": {
                    "cs_from": "",
                    "mk_key": MK_KEY,
                    "position": POSITION,
                },
            },
            "component_type": LOTTERY_COMPONENT,
            "component_action": "lottery_v2.exec",
            "lottery_v2": { "session_id": LOTTERY_SESSION },
        });
        let request = self.request("POST", COMPONENT_ACTION_URL, true);
        lottery_result(self.call(request, Some(body))?)
    }
}
