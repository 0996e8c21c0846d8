//! 来电意图识别
//!
//! 明确的说法走快速规则匹配（不调用 LLM）；其余由生成服务在结构化回复里的 `intent` 字段给出。
//! 只对来电者的话做匹配，从不嗅探前台自己生成的文本。

use serde::{Deserialize, Serialize};

/// 来电意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerIntent {
    ReturningClient,
    AppointmentRequest,
    PersonalTax,
    BusinessTax,
    SpecificPersonRequest,
    Other,
    /// 来电者想结束通话
    EndCall,
}

impl CallerIntent {
    /// 除 Other / EndCall 外都进入预约流程
    pub fn is_booking_track(&self) -> bool {
        !matches!(self, CallerIntent::Other | CallerIntent::EndCall)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallerIntent::ReturningClient => "returning_client",
            CallerIntent::AppointmentRequest => "appointment_request",
            CallerIntent::PersonalTax => "personal_tax",
            CallerIntent::BusinessTax => "business_tax",
            CallerIntent::SpecificPersonRequest => "specific_person_request",
            CallerIntent::Other => "other",
            CallerIntent::EndCall => "end_call",
        }
    }

    /// 解析生成服务给出的标签，未知标签返回 None
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        Some(match normalized.as_str() {
            "returning_client" => CallerIntent::ReturningClient,
            "appointment_request" | "appointment" | "booking" => CallerIntent::AppointmentRequest,
            "personal_tax" => CallerIntent::PersonalTax,
            "business_tax" => CallerIntent::BusinessTax,
            "specific_person_request" => CallerIntent::SpecificPersonRequest,
            "other" => CallerIntent::Other,
            "end_call" | "ending" | "end" => CallerIntent::EndCall,
            _ => return None,
        })
    }
}

const END_CALL_PHRASES: [&str; 6] = [
    "goodbye",
    "bye",
    "hang up",
    "that's all",
    "that is all",
    "nothing else",
];

const APPOINTMENT_PHRASES: [&str; 6] = [
    "appointment",
    "book",
    "schedule",
    "consultation",
    "meeting",
    "set up a time",
];

const RETURNING_PHRASES: [&str; 4] = [
    "existing client",
    "returning client",
    "already a client",
    "called before",
];

const BUSINESS_TAX_PHRASES: [&str; 6] = [
    "business tax",
    "business taxes",
    "corporate",
    "payroll",
    "llc",
    "my company",
];

const PERSONAL_TAX_PHRASES: [&str; 6] = [
    "personal tax",
    "tax return",
    "taxes",
    "refund",
    "irs",
    "file my",
];

const SPECIFIC_PERSON_PHRASES: [&str; 4] = ["speak to", "speak with", "talk to", "talk with"];

/// 规整为 " word word " 形式，方便按整词匹配短语
fn padded_words(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_any(padded: &str, phrases: &[&str]) -> bool {
    phrases
        .iter()
        .any(|p| padded.contains(&format!(" {} ", p)))
}

/// 快速规则匹配；匹配不到返回 None，交给生成服务判定
pub fn fast_match(transcript: &str) -> Option<CallerIntent> {
    let padded = padded_words(transcript);
    if padded.trim().is_empty() {
        return None;
    }

    if contains_any(&padded, &END_CALL_PHRASES) {
        return Some(CallerIntent::EndCall);
    }
    if contains_any(&padded, &APPOINTMENT_PHRASES) {
        return Some(CallerIntent::AppointmentRequest);
    }
    if contains_any(&padded, &RETURNING_PHRASES) {
        return Some(CallerIntent::ReturningClient);
    }
    if contains_any(&padded, &BUSINESS_TAX_PHRASES) {
        return Some(CallerIntent::BusinessTax);
    }
    if contains_any(&padded, &PERSONAL_TAX_PHRASES) {
        return Some(CallerIntent::PersonalTax);
    }
    if contains_any(&padded, &SPECIFIC_PERSON_PHRASES) {
        return Some(CallerIntent::SpecificPersonRequest);
    }
    None
}

/// 生成服务的回复：要求输出 {"intent": "...", "text": "..."}，不是 JSON 时整段当作话术
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: String,
    pub intent: Option<CallerIntent>,
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    intent: Option<String>,
}

impl GeneratedReply {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                if let Ok(reply) = serde_json::from_str::<RawReply>(&trimmed[start..=end]) {
                    return Self {
                        text: reply.text.trim().to_string(),
                        intent: reply.intent.as_deref().and_then(CallerIntent::from_label),
                    };
                }
            }
        }

        Self {
            text: trimmed.to_string(),
            intent: None,
        }
    }
}
