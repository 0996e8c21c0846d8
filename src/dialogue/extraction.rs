//! 槽位抽取引擎
//!
//! 主信号是 pending_step（上一句在问什么），对来电者原话做确定性抽取；
//! 兜底只有少量显式句式（"my email is ..."）和上一句前台话术里的提问线索，
//! 兜底结果永远不覆盖同一轮按步骤抽到的值。识别不了就保持槽位不变。

use regex::Regex;

use crate::core::CallState;
use crate::dialogue::schema::{self, SlotName, Step};

/// 本轮抽取结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// 本轮被写入（或更正）的槽位
    pub updated: Vec<SlotName>,
    /// 按 pending_step 抽到了值
    pub step_matched: bool,
    /// 确认环节：来电者否定了读回的信息
    pub negative_reply: bool,
    /// 确认环节：来电者明确肯定
    pub affirmative_reply: bool,
}

impl Extraction {
    pub fn updated(&self, slot: SlotName) -> bool {
        self.updated.contains(&slot)
    }
}

/// 片段末尾可丢弃的连接词（"John and my | last name is Smith"）
const TRAILING_CONNECTORS: [&str; 6] = ["and", "my", "the", "also", "plus", "then"];

fn trim_connectors(text: &str) -> &str {
    let is_sep = |c: char| c.is_whitespace() || c == ',' || c == ';';
    let mut rest = text.trim_matches(is_sep);
    loop {
        let (head, last) = match rest.rsplit_once(char::is_whitespace) {
            Some((head, last)) => (head, last),
            None => ("", rest),
        };
        if !TRAILING_CONNECTORS.iter().any(|w| last.eq_ignore_ascii_case(w)) {
            return rest;
        }
        rest = head.trim_end_matches(is_sep);
    }
}

/// 一句话里由显式句式引出的片段，值已按槽位规范化
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    slot: SlotName,
    /// 句式在原话中的起始位置
    start: usize,
    value: String,
}

/// 更正句式：只认这几种明确说法
struct FallbackMatcher {
    first_name: Regex,
    last_name: Regex,
    email: Regex,
    phone: Regex,
}

impl FallbackMatcher {
    fn new() -> Self {
        Self {
            first_name: Regex::new(r"(?i)\bfirst name is\b").expect("valid regex"),
            last_name: Regex::new(r"(?i)\b(?:last name|surname) is\b").expect("valid regex"),
            email: Regex::new(r"(?i)\bemail(?: address)? is\b").expect("valid regex"),
            phone: Regex::new(r"(?i)\b(?:phone number|phone|number) is\b")
                .expect("valid regex"),
        }
    }

    /// 按句式切分：每个片段的值到下一个句式开始为止
    fn segments(&self, transcript: &str) -> Vec<Segment> {
        let patterns = [
            (SlotName::FirstName, &self.first_name),
            (SlotName::LastName, &self.last_name),
            (SlotName::Email, &self.email),
            (SlotName::Phone, &self.phone),
        ];
        let mut found: Vec<(SlotName, usize, usize)> = patterns
            .iter()
            .filter_map(|(slot, re)| re.find(transcript).map(|m| (*slot, m.start(), m.end())))
            .collect();
        found.sort_by_key(|(_, start, _)| *start);

        found
            .iter()
            .enumerate()
            .filter_map(|(i, &(slot, start, end))| {
                let stop = found
                    .get(i + 1)
                    .map_or(transcript.len(), |&(_, next, _)| next.max(end));
                let raw = trim_connectors(&transcript[end..stop]);
                schema::normalize(slot, raw).map(|value| Segment { slot, start, value })
            })
            .collect()
    }
}

/// 按步骤抽取的输入：该槽位自己的显式片段优先，否则取第一个其他片段之前的部分
fn step_value(slot: SlotName, transcript: &str, segments: &[Segment]) -> Option<String> {
    if let Some(own) = segments.iter().find(|s| s.slot == slot) {
        return Some(own.value.clone());
    }
    let cut = segments.first().map_or(transcript.len(), |s| s.start);
    let head = trim_connectors(&transcript[..cut]);
    if head.is_empty() {
        return None;
    }
    schema::normalize(slot, head)
}

pub struct ExtractionEngine {
    fallback: FallbackMatcher,
}

impl ExtractionEngine {
    pub fn new() -> Self {
        Self {
            fallback: FallbackMatcher::new(),
        }
    }

    /// 用来电者本轮的话更新槽位。需在记录本轮来电者话语之前调用（要读上一句前台话术）
    pub fn extract(&self, state: &mut CallState, transcript: &str) -> Extraction {
        let mut out = Extraction::default();
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return out;
        }

        let prior = state
            .history
            .last_assistant()
            .map(str::to_lowercase)
            .unwrap_or_default();

        let segments = self.fallback.segments(transcript);
        let confirming = state.booking_track && state.pending_step == Step::Confirmation;

        // 1. 按步骤抽取
        if state.booking_track {
            let step = state.pending_step;
            match step.slot() {
                Some(SlotName::ReferralSource) if state.flags.referral_skipped => {}
                Some(slot) => {
                    if let Some(value) = step_value(slot, transcript, &segments) {
                        if state.slots.set(slot, value) {
                            out.updated.push(slot);
                        }
                        out.step_matched = true;
                    }
                }
                None if step == Step::Confirmation => {
                    let verdict = schema::classify_confirmation(transcript);
                    out.negative_reply = verdict == Some(false);
                    out.affirmative_reply = verdict == Some(true);
                }
                None => {}
            }
        }

        // 2. 是否老客户：槽位为空时每轮都扫；确认环节的 yes / no 是对读回的答复，不算
        let previous_client_open = !state.slots.is_set(SlotName::PreviousClient);
        if previous_client_open && !confirming && !out.updated(SlotName::PreviousClient) {
            if let Some(answer) = schema::classify_previous_client(transcript) {
                if state.slots.set(SlotName::PreviousClient, answer) {
                    out.updated.push(SlotName::PreviousClient);
                }
            }
        }
        if state.slots.get(SlotName::PreviousClient) == Some("Yes") && !state.flags.referral_skipped
        {
            state.skip_referral();
        }

        // 3. 更正句式（不覆盖本轮按步骤抽到的槽位）
        for Segment { slot, value, .. } in segments {
            if out.updated(slot) || (out.step_matched && state.pending_step.slot() == Some(slot)) {
                continue;
            }
            if state.slots.set(slot, value) {
                tracing::debug!(call_id = %state.call_id, slot = %slot, "Slot corrected");
                out.updated.push(slot);
            }
        }

        // 4. 上一句前台话术的提问线索，只填空槽位
        if !out.step_matched {
            if !state.flags.referral_skipped
                && prior.contains("how did you hear")
                && !state.slots.is_set(SlotName::ReferralSource)
            {
                if let Some(value) = schema::normalize_free_text(transcript) {
                    state.slots.set(SlotName::ReferralSource, value);
                    out.updated.push(SlotName::ReferralSource);
                }
            } else if (prior.contains("reason") || prior.contains("help you with"))
                && !state.slots.is_set(SlotName::CallReason)
            {
                if let Some(value) = schema::normalize_free_text(transcript) {
                    state.slots.set(SlotName::CallReason, value);
                    out.updated.push(SlotName::CallReason);
                }
            }
        }

        if !out.updated.is_empty() {
            tracing::debug!(
                call_id = %state.call_id,
                step = %state.pending_step,
                updated = ?out.updated,
                "Slots extracted"
            );
        }
        out
    }
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    fn on_step(step: Step) -> CallState {
        let mut state = CallState::new("CA-test");
        state.booking_track = true;
        state.pending_step = step;
        state.history.push(Message::assistant(step.scripted_prompt()));
        state
    }

    #[test]
    fn test_first_name_from_step() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectFirstName);
        let out = engine.extract(&mut state, "My name is John");
        assert_eq!(state.slots.get(SlotName::FirstName), Some("John"));
        assert!(out.step_matched);
    }

    #[test]
    fn test_email_spelled_out() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectEmail);
        engine.extract(&mut state, "J O H N at example dot com");
        assert_eq!(state.slots.get(SlotName::Email), Some("john@example.com"));
    }

    #[test]
    fn test_ambiguous_answer_leaves_slot_untouched() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectPhone);
        state.slots.set(SlotName::Phone, "5551234567");
        let out = engine.extract(&mut state, "hmm, let me check");
        assert_eq!(state.slots.get(SlotName::Phone), Some("5551234567"));
        assert!(!out.step_matched);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectLastName);
        engine.extract(&mut state, "Smith");
        let before = state.slots.clone();
        let out = engine.extract(&mut state, "Smith");
        assert_eq!(state.slots, before);
        assert!(out.updated.is_empty());
    }

    #[test]
    fn test_previous_client_yes_skips_referral_at_any_step() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectEmail);
        engine.extract(&mut state, "yes I've called before");
        assert_eq!(state.slots.get(SlotName::PreviousClient), Some("Yes"));
        assert!(state.flags.referral_skipped);
        assert!(state.slots.get(SlotName::ReferralSource).is_none());
    }

    #[test]
    fn test_previous_client_not_flipped_once_known() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::Confirmation);
        state.slots.set(SlotName::PreviousClient, "Yes");
        state.skip_referral();
        let out = engine.extract(&mut state, "no, the email is wrong");
        assert_eq!(state.slots.get(SlotName::PreviousClient), Some("Yes"));
        assert!(out.negative_reply);
    }

    #[test]
    fn test_referral_skipped_is_never_filled() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectReferral);
        state.skip_referral();
        engine.extract(&mut state, "A friend told me");
        assert!(state.slots.get(SlotName::ReferralSource).is_none());
    }

    #[test]
    fn test_correction_during_confirmation() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::Confirmation);
        state.slots.set(SlotName::Email, "jon@example.com");
        let out = engine.extract(&mut state, "No, my email is john at example dot com");
        assert_eq!(state.slots.get(SlotName::Email), Some("john@example.com"));
        assert!(out.updated(SlotName::Email));
        assert!(out.negative_reply);
    }

    #[test]
    fn test_fallback_never_overrides_step_match() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectFirstName);
        let out = engine.extract(&mut state, "first name is Anna");
        assert_eq!(state.slots.get(SlotName::FirstName), Some("Anna"));
        assert_eq!(out.updated, vec![SlotName::FirstName]);
    }

    #[test]
    fn test_yes_at_confirmation_is_not_previous_client() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::Confirmation);
        state.flags.previous_client_asked = true;
        state.slots.set(SlotName::ReferralSource, "Google");
        let out = engine.extract(&mut state, "Yes, that's correct");
        assert!(out.affirmative_reply);
        assert!(out.updated.is_empty());
        assert!(state.slots.get(SlotName::PreviousClient).is_none());
        assert!(!state.flags.referral_skipped);
        assert_eq!(state.slots.get(SlotName::ReferralSource), Some("Google"));
    }

    #[test]
    fn test_two_names_in_one_answer() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectFirstName);
        let out = engine.extract(&mut state, "My first name is John and my last name is Smith");
        assert_eq!(state.slots.get(SlotName::FirstName), Some("John"));
        assert_eq!(state.slots.get(SlotName::LastName), Some("Smith"));
        assert!(out.updated(SlotName::LastName));
    }

    #[test]
    fn test_step_answer_stops_before_next_phrase() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectLastName);
        engine.extract(&mut state, "Smith, and my email is john at example dot com");
        assert_eq!(state.slots.get(SlotName::LastName), Some("Smith"));
        assert_eq!(state.slots.get(SlotName::Email), Some("john@example.com"));
    }

    #[test]
    fn test_unparseable_phrase_does_not_cut_free_text() {
        let engine = ExtractionEngine::new();
        let mut state = on_step(Step::CollectCallReason);
        engine.extract(&mut state, "my old number is wrong on your file");
        assert_eq!(
            state.slots.get(SlotName::CallReason),
            Some("my old number is wrong on your file")
        );
        assert!(state.slots.get(SlotName::Phone).is_none());
    }

    #[test]
    fn test_call_reason_from_prior_question() {
        let engine = ExtractionEngine::new();
        let mut state = CallState::new("CA-test");
        state
            .history
            .push(Message::assistant("Sure. What can I help you with?"));
        engine.extract(&mut state, "  I need to amend last year's return ");
        assert_eq!(
            state.slots.get(SlotName::CallReason),
            Some("I need to amend last year's return")
        );
    }
}
