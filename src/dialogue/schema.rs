//! 槽位定义：预约需要的字段、收集顺序与各字段的规范化规则
//!
//! 规范化函数都是纯函数：同一段话反复处理得到同一个值；无法识别时返回 None，调用方保持槽位不变。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 预约字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    FirstName,
    LastName,
    Email,
    Phone,
    PreviousClient,
    ReferralSource,
    CallReason,
}

impl SlotName {
    /// 派发预约的必要且充分条件：这四项都非空
    pub const REQUIRED: [SlotName; 4] = [
        SlotName::FirstName,
        SlotName::LastName,
        SlotName::Email,
        SlotName::Phone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::FirstName => "first_name",
            SlotName::LastName => "last_name",
            SlotName::Email => "email",
            SlotName::Phone => "phone",
            SlotName::PreviousClient => "previous_client",
            SlotName::ReferralSource => "referral_source",
            SlotName::CallReason => "call_reason",
        }
    }

    /// 给生成服务看的字段描述
    pub fn describe(&self) -> &'static str {
        match self {
            SlotName::FirstName => "the caller's first name",
            SlotName::LastName => "the caller's last name",
            SlotName::Email => "the caller's email address, spelled slowly letter by letter",
            SlotName::Phone => "the caller's phone number, digit by digit",
            SlotName::PreviousClient => "whether the caller has been a client of the firm before",
            SlotName::ReferralSource => "how the caller heard about the firm",
            SlotName::CallReason => "the reason for the call",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 收集步骤（严格有序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CollectFirstName,
    CollectLastName,
    CollectEmail,
    CollectPhone,
    CollectPreviousClient,
    CollectReferral,
    CollectCallReason,
    Confirmation,
    Closing,
}

impl Step {
    pub const ORDER: [Step; 9] = [
        Step::CollectFirstName,
        Step::CollectLastName,
        Step::CollectEmail,
        Step::CollectPhone,
        Step::CollectPreviousClient,
        Step::CollectReferral,
        Step::CollectCallReason,
        Step::Confirmation,
        Step::Closing,
    ];

    /// 该步骤负责填写的槽位；确认与结束步骤没有槽位
    pub fn slot(&self) -> Option<SlotName> {
        match self {
            Step::CollectFirstName => Some(SlotName::FirstName),
            Step::CollectLastName => Some(SlotName::LastName),
            Step::CollectEmail => Some(SlotName::Email),
            Step::CollectPhone => Some(SlotName::Phone),
            Step::CollectPreviousClient => Some(SlotName::PreviousClient),
            Step::CollectReferral => Some(SlotName::ReferralSource),
            Step::CollectCallReason => Some(SlotName::CallReason),
            Step::Confirmation | Step::Closing => None,
        }
    }

    pub fn next(&self) -> Option<Step> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::CollectFirstName => "collect_first_name",
            Step::CollectLastName => "collect_last_name",
            Step::CollectEmail => "collect_email",
            Step::CollectPhone => "collect_phone",
            Step::CollectPreviousClient => "collect_previous_client",
            Step::CollectReferral => "collect_referral",
            Step::CollectCallReason => "collect_call_reason",
            Step::Confirmation => "confirmation",
            Step::Closing => "closing",
        }
    }

    /// 生成服务失败前的兜底问法，也作为给生成服务的建议措辞
    pub fn scripted_prompt(&self) -> &'static str {
        match self {
            Step::CollectFirstName => "Could I have your first name, please?",
            Step::CollectLastName => "Thank you. And your last name?",
            Step::CollectEmail => {
                "What's the best email address to reach you? Please spell it out slowly."
            }
            Step::CollectPhone => "And what's the best phone number to reach you?",
            Step::CollectPreviousClient => "Have you been a client with us before?",
            Step::CollectReferral => "How did you hear about us?",
            Step::CollectCallReason => "And what's the reason for your call today?",
            Step::Confirmation => "Did I get all of that right?",
            Step::Closing => "Thank you for calling.",
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Step::CollectFirstName
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 槽位值表：未设置即不存在；不会被写成空串
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    values: BTreeMap<SlotName, String>,
}

impl Slots {
    pub fn get(&self, name: SlotName) -> Option<&str> {
        self.values.get(&name).map(String::as_str)
    }

    pub fn is_set(&self, name: SlotName) -> bool {
        self.values.contains_key(&name)
    }

    /// 写入槽位（后写覆盖）；空值被忽略。返回值是否发生了变化
    pub fn set(&mut self, name: SlotName, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.trim().is_empty() {
            return false;
        }
        match self.values.get(&name) {
            Some(existing) if *existing == value => false,
            _ => {
                self.values.insert(name, value);
                true
            }
        }
    }

    pub fn required_complete(&self) -> bool {
        SlotName::REQUIRED.iter().all(|s| self.is_set(*s))
    }

    pub fn missing_required(&self) -> Vec<SlotName> {
        SlotName::REQUIRED
            .iter()
            .copied()
            .filter(|s| !self.is_set(*s))
            .collect()
    }

    pub fn filled(&self) -> impl Iterator<Item = (SlotName, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

const PREVIOUS_CLIENT_YES: [&str; 3] = ["yes", "yeah", "returning"];
const PREVIOUS_CLIENT_NO: [&str; 3] = ["no", "nope", "new"];

const CONFIRM_YES: [&str; 12] = [
    "yes", "yeah", "yep", "yup", "correct", "right", "sure", "perfect", "exactly", "ok",
    "okay", "great",
];
const CONFIRM_NO: [&str; 7] = ["no", "nope", "wrong", "incorrect", "not", "isn't", "doesn't"];

const NAME_LEAD_INS: [&str; 16] = [
    "my first name is",
    "my last name is",
    "my surname is",
    "my name is",
    "first name is",
    "last name is",
    "the name is",
    "name is",
    "this is",
    "it's",
    "it is",
    "i'm",
    "i am",
    "call me",
    "sure",
    "yes",
];

const EMAIL_LEAD_INS: [&str; 9] = [
    "my email address is",
    "my email is",
    "email address is",
    "email is",
    "it's",
    "it is",
    "sure",
    "yes",
    "yeah",
];

const PHONE_LEAD_INS: [&str; 6] = [
    "my phone number is",
    "my number is",
    "phone number is",
    "number is",
    "it's",
    "it is",
];

const MIN_PHONE_DIGITS: usize = 7;

/// 小写单词切分（保留撇号，如 i've）
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// 是否是 / 否判定：两类词都出现或都不出现时视为含糊
fn classify_tokens(text: &str, yes: &[&str], no: &[&str]) -> Option<bool> {
    let tokens = words(text);
    let has_yes = tokens.iter().any(|t| yes.contains(&t.as_str()));
    let has_no = tokens.iter().any(|t| no.contains(&t.as_str()));
    match (has_yes, has_no) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// 去掉句首的引导语与标点（"Sure, it's John." -> "John."）
fn strip_lead_ins<'a>(text: &'a str, lead_ins: &[&str]) -> &'a str {
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.');
        let matched = lead_ins.iter().find(|phrase| {
            let Some(head) = rest.get(..phrase.len()) else {
                return false;
            };
            if !head.eq_ignore_ascii_case(phrase) {
                return false;
            }
            rest[phrase.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric())
        });
        match matched {
            Some(phrase) => rest = &rest[phrase.len()..],
            None => return rest,
        }
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 姓名：去引导语、去首尾空白与标点、每个词首字母大写
pub fn normalize_name(raw: &str) -> Option<String> {
    let stripped = strip_lead_ins(raw, &NAME_LEAD_INS);
    let cleaned: Vec<String> = stripped
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-')))
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();
    let name = cleaned.join(" ");
    if name.chars().any(|c| c.is_alphabetic()) {
        Some(name)
    } else {
        None
    }
}

/// 邮箱：口语 at / dot / underscore / dash 转符号，去掉所有空白，转小写，需形如 a@b.c
pub fn normalize_email(raw: &str) -> Option<String> {
    let stripped = strip_lead_ins(raw, &EMAIL_LEAD_INS);
    let joined: String = stripped
        .split_whitespace()
        .map(|token| match token.to_lowercase().as_str() {
            "at" => "@".to_string(),
            "dot" | "period" => ".".to_string(),
            "underscore" => "_".to_string(),
            "dash" | "hyphen" => "-".to_string(),
            other => other.to_string(),
        })
        .collect();
    let email = joined
        .trim_end_matches(|c: char| c == '.' || c == ',' || c == '?' || c == '!')
        .to_lowercase();

    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if valid {
        Some(email)
    } else {
        None
    }
}

fn spoken_digit(token: &str) -> Option<char> {
    match token {
        "zero" => Some('0'),
        "one" => Some('1'),
        "two" => Some('2'),
        "three" => Some('3'),
        "four" => Some('4'),
        "five" => Some('5'),
        "six" => Some('6'),
        "seven" => Some('7'),
        "eight" => Some('8'),
        "nine" => Some('9'),
        _ => None,
    }
}

fn is_digit_token(token: &str) -> bool {
    token == "oh" || spoken_digit(token).is_some() || token.chars().any(|c| c.is_ascii_digit())
}

/// 电话：口语数字转阿拉伯数字，去掉所有非数字字符，至少 7 位
///
/// "oh" 只有夹在两个数字之间时才算 0（"five oh one"），句首的语气词 "Oh," 不计入。
pub fn normalize_phone(raw: &str) -> Option<String> {
    let stripped = strip_lead_ins(raw, &PHONE_LEAD_INS);
    let tokens: Vec<String> = stripped
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut digits = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if token == "oh" {
            let between = i > 0
                && is_digit_token(&tokens[i - 1])
                && tokens.get(i + 1).is_some_and(|next| is_digit_token(next));
            if between {
                digits.push('0');
            }
            continue;
        }
        match spoken_digit(token) {
            Some(d) => digits.push(d),
            None => digits.extend(token.chars().filter(|c| c.is_ascii_digit())),
        }
    }
    if digits.len() >= MIN_PHONE_DIGITS {
        Some(digits)
    } else {
        None
    }
}

/// 是否老客户："Yes" / "No"，含糊返回 None
pub fn classify_previous_client(raw: &str) -> Option<&'static str> {
    classify_tokens(raw, &PREVIOUS_CLIENT_YES, &PREVIOUS_CLIENT_NO)
        .map(|yes| if yes { "Yes" } else { "No" })
}

/// 确认环节的肯定 / 否定；出现否定词即视为否定（"that's not right"）
pub fn classify_confirmation(raw: &str) -> Option<bool> {
    let tokens = words(raw);
    if tokens.iter().any(|t| CONFIRM_NO.contains(&t.as_str())) {
        Some(false)
    } else if tokens.iter().any(|t| CONFIRM_YES.contains(&t.as_str())) {
        Some(true)
    } else {
        None
    }
}

/// 转介绍来源、来电原因：原样保留（去首尾空白）
pub fn normalize_free_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 按槽位分发到对应的规范化规则
pub fn normalize(slot: SlotName, raw: &str) -> Option<String> {
    match slot {
        SlotName::FirstName | SlotName::LastName => normalize_name(raw),
        SlotName::Email => normalize_email(raw),
        SlotName::Phone => normalize_phone(raw),
        SlotName::PreviousClient => classify_previous_client(raw).map(String::from),
        SlotName::ReferralSource | SlotName::CallReason => normalize_free_text(raw),
    }
}
