//! 对话策略：决定本轮说什么
//!
//! 优先级：首轮开场白 → 来电者要挂断 → 预约流程中问下一个未满足的步骤 → 其余交给生成服务自由回答。
//! 措辞由生成服务负责，问哪一步由这里决定；结束与否由 `DialogueIntent::Ending` 显式表达，
//! 终止标记 "Goodbye" 只出现在结束语里且恰好一次。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::core::{CallError, CallState};
use crate::dialogue::extraction::Extraction;
use crate::dialogue::intent::{self, CallerIntent, GeneratedReply};
use crate::dialogue::schema::{self, SlotName, Step};
use crate::llm::{LlmClient, SUGGESTED_WORDING_PREFIX};
use crate::memory::Message;

/// 终止标记：电话平台侧据此挂断
pub const TERMINATION_MARKER: &str = "Goodbye";

const REPROMPT_PREFIX: &str = "Sorry, I didn't catch that.";

/// 本轮话语的意图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueIntent {
    Greeting,
    /// 预约流程之外的回答
    Answer,
    /// 询问某个收集步骤
    Ask(Step),
    /// 读回信息请来电者确认
    Confirm,
    /// 沉默后重复上一句
    Reprompt,
    /// 结束语，说完即挂断
    Ending,
}

/// 策略输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub intent: DialogueIntent,
}

impl Utterance {
    /// 非结束话语：去掉误带的终止标记
    fn spoken(text: impl AsRef<str>, intent: DialogueIntent) -> Self {
        Self {
            text: strip_marker(text.as_ref()),
            intent,
        }
    }

    /// 结束语：终止标记恰好一次
    fn ending(text: impl AsRef<str>) -> Self {
        Self {
            text: with_single_marker(text.as_ref()),
            intent: DialogueIntent::Ending,
        }
    }

    /// 生成失败时的固定致歉语
    pub fn apology() -> Self {
        Self::ending("I'm sorry, I'm having trouble on my end right now. Please call us back a little later.")
    }

    /// 容量已满时拒接新来电
    pub fn busy() -> Self {
        Self::ending("I'm sorry, all of our lines are busy right now. Please call back in a few minutes.")
    }

    pub fn ends_call(&self) -> bool {
        self.intent == DialogueIntent::Ending
    }
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*\bgood-?bye\b[.!,]?").expect("valid regex"))
}

/// 终止标记出现次数（不区分大小写）
pub fn marker_count(text: &str) -> usize {
    marker_regex().find_iter(text).count()
}

fn strip_marker(text: &str) -> String {
    let stripped = marker_regex().replace_all(text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn with_single_marker(text: &str) -> String {
    let body = strip_marker(text);
    if body.is_empty() {
        format!("{}.", TERMINATION_MARKER)
    } else {
        format!("{} {}.", body, TERMINATION_MARKER)
    }
}

/// 超长截断：尽量停在句末，否则停在词边界
fn cap_length(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    if let Some(pos) = cut.rfind(['.', '?', '!']) {
        if pos >= cut.len() / 2 {
            return cut[..=pos].to_string();
        }
    }
    match cut.rfind(char::is_whitespace) {
        Some(pos) => cut[..pos].trim_end_matches([',', ';']).to_string(),
        None => cut,
    }
}

/// 读电话号码时逐位读
fn spaced_digits(digits: &str) -> String {
    digits
        .chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 策略参数（来自配置）
#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub firm_name: String,
    pub generation_timeout: Duration,
    pub max_reply_chars: usize,
    pub max_context_turns: usize,
    /// 连续沉默超过该次数后结束通话
    pub max_silent_reprompts: u32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            firm_name: "Ahad and Co CPA Firm".to_string(),
            generation_timeout: Duration::from_millis(2500),
            max_reply_chars: 320,
            max_context_turns: 12,
            max_silent_reprompts: 2,
        }
    }
}

/// 本轮交给生成服务的指令
struct TurnDirective {
    instruction: String,
    suggested: String,
}

pub struct DialoguePolicy {
    llm: Arc<dyn LlmClient>,
    settings: PolicySettings,
}

impl DialoguePolicy {
    pub fn new(llm: Arc<dyn LlmClient>, settings: PolicySettings) -> Self {
        Self { llm, settings }
    }

    pub fn greeting(&self) -> String {
        format!(
            "Thanks for calling {}. How can I help you today?",
            self.settings.firm_name
        )
    }

    /// 决定本轮话语。抽取须已在本轮来电者话语上完成，来电者话语已记入历史
    pub async fn respond(
        &self,
        state: &mut CallState,
        transcript: &str,
        extraction: &Extraction,
    ) -> Result<Utterance, CallError> {
        if state.is_first_turn() {
            return Ok(Utterance::spoken(self.greeting(), DialogueIntent::Greeting));
        }

        let transcript = transcript.trim();
        if transcript.is_empty() {
            if state.silent_reprompts >= self.settings.max_silent_reprompts {
                info!(call_id = %state.call_id, "Caller stayed silent, ending call");
                return Ok(self.closing(state));
            }
            state.silent_reprompts += 1;
            return Ok(self.reprompt(state));
        }
        state.silent_reprompts = 0;

        let fast = intent::fast_match(transcript);
        if fast == Some(CallerIntent::EndCall) {
            debug!(call_id = %state.call_id, "Caller asked to end the call");
            return Ok(self.closing(state));
        }

        if !state.booking_track {
            let accepted_offer = state.flags.consultation_offered
                && schema::classify_confirmation(transcript) == Some(true);
            if accepted_offer || fast.is_some_and(|i| i.is_booking_track()) {
                self.enter_booking_track(state, fast);
            }
        }

        Self::advance(state, extraction);
        if state.booking_track && state.pending_step == Step::Closing {
            return Ok(self.closing(state));
        }

        let directive = self.directive(state, extraction);
        let reply = self.generate(state, &directive).await?;

        // 未声明意图的回复里出现终止标记，也按结束处理
        let undeclared_goodbye = reply.intent.is_none() && marker_count(&reply.text) > 0;
        if reply.intent == Some(CallerIntent::EndCall) || undeclared_goodbye {
            return Ok(self.closing(state));
        }
        if !state.booking_track {
            if let Some(declared) = reply.intent.filter(|i| i.is_booking_track()) {
                self.enter_booking_track(state, Some(declared));
            }
        }

        let text = self.shape(&reply.text, &directive.suggested);
        if state.booking_track {
            let step = state.pending_step;
            Self::mark_asked(state, step);
            let intent = if step == Step::Confirmation {
                DialogueIntent::Confirm
            } else {
                DialogueIntent::Ask(step)
            };
            Ok(Utterance::spoken(text, intent))
        } else {
            state.flags.consultation_offered = true;
            state.last_asked = None;
            Ok(Utterance::spoken(text, DialogueIntent::Answer))
        }
    }

    fn enter_booking_track(&self, state: &mut CallState, intent: Option<CallerIntent>) {
        state.booking_track = true;
        Self::advance_unchecked(state);
        info!(
            call_id = %state.call_id,
            intent = intent.map(|i| i.as_str()).unwrap_or("accepted_offer"),
            step = %state.pending_step,
            "Caller placed on booking track"
        );
    }

    /// 推进 pending_step 到下一个未满足的步骤
    ///
    /// 必填步骤与来电原因在槽位写入后满足；老客户 / 转介绍问过一次即满足；
    /// 确认步骤需要来电者在读回之后明确肯定且本轮没有更正。
    pub fn advance(state: &mut CallState, extraction: &Extraction) {
        if !state.booking_track {
            return;
        }
        if state.pending_step == Step::Confirmation
            && state.last_asked == Some(Step::Confirmation)
            && extraction.affirmative_reply
            && extraction.updated.is_empty()
        {
            state.flags.confirmed = true;
        }
        Self::advance_unchecked(state);
    }

    fn advance_unchecked(state: &mut CallState) {
        loop {
            let step = state.pending_step;
            if !Self::is_satisfied(state, step) {
                break;
            }
            match step.next() {
                Some(next) => state.pending_step = next,
                None => break,
            }
        }
    }

    fn is_satisfied(state: &CallState, step: Step) -> bool {
        let slots = &state.slots;
        let flags = &state.flags;
        match step {
            Step::CollectPreviousClient => {
                slots.is_set(SlotName::PreviousClient) || flags.previous_client_asked
            }
            Step::CollectReferral => {
                flags.referral_skipped
                    || slots.is_set(SlotName::ReferralSource)
                    || flags.referral_asked
            }
            Step::Confirmation => flags.confirmed,
            Step::Closing => false,
            other => other.slot().is_some_and(|s| slots.is_set(s)),
        }
    }

    fn mark_asked(state: &mut CallState, step: Step) {
        match step {
            Step::CollectPreviousClient => state.flags.previous_client_asked = true,
            Step::CollectReferral => state.flags.referral_asked = true,
            _ => {}
        }
        state.last_asked = Some(step);
    }

    fn reprompt(&self, state: &CallState) -> Utterance {
        let greeting = self.greeting();
        let last = state.history.last_assistant().unwrap_or(greeting.as_str());
        let last = last.trim_start_matches(REPROMPT_PREFIX).trim();
        Utterance::spoken(
            format!("{} {}", REPROMPT_PREFIX, last),
            DialogueIntent::Reprompt,
        )
    }

    /// 结束语。必填信息齐全时（本轮或更早已派发预约）告知后续安排
    fn closing(&self, state: &mut CallState) -> Utterance {
        state.pending_step = Step::Closing;
        state.last_asked = Some(Step::Closing);
        let firm = &self.settings.firm_name;
        let booked = state.flags.booking_dispatched || state.slots.required_complete();
        let first = state.slots.get(SlotName::FirstName);
        let text = match (booked, first) {
            (true, Some(first)) => format!(
                "Thank you, {}. Your free 15-minute consultation is booked, and our team will email you to confirm the time. Thanks for calling {}.",
                first, firm
            ),
            _ => format!("Thanks for calling {}. Have a great day.", firm),
        };
        Utterance::ending(text)
    }

    fn directive(&self, state: &CallState, extraction: &Extraction) -> TurnDirective {
        if !state.booking_track {
            let mut preview = state.clone();
            preview.booking_track = true;
            Self::advance_unchecked(&mut preview);
            let ask = preview
                .pending_step
                .slot()
                .map(|s| s.describe())
                .unwrap_or("the caller's first name");
            return TurnDirective {
                instruction: format!(
                    "Classify the caller's last message. If they want an appointment, need personal or business tax help, are a returning client, or ask for a specific person, \
                     briefly offer a free 15-minute consultation and ask for {}. Otherwise answer briefly and offer the free 15-minute consultation.",
                    ask
                ),
                suggested: "We offer a free 15-minute consultation with one of our CPAs. Would you like to book one?"
                    .to_string(),
            };
        }

        let step = state.pending_step;
        if step == Step::Confirmation {
            if extraction.negative_reply && extraction.updated.is_empty() {
                return TurnDirective {
                    instruction: "The caller said some detail is wrong. Apologize and ask which detail needs fixing.".to_string(),
                    suggested: "I'm sorry about that. Which detail should I fix? For example, you can say, my last name is, followed by the correct spelling."
                        .to_string(),
                };
            }
            let readback = self.readback(state);
            return TurnDirective {
                instruction: format!(
                    "Read the caller's details back exactly as given and ask if they are correct: {}",
                    readback
                ),
                suggested: format!("Just to confirm, I have {}. Is that correct?", readback),
            };
        }

        let describe = step.slot().map(|s| s.describe()).unwrap_or("nothing");
        let retry = state.last_asked == Some(step);
        let first_question = state.last_asked.is_none() && step == Step::CollectFirstName;
        let mut instruction = format!("Ask only for {}. One short question.", describe);
        let mut suggested = step.scripted_prompt().to_string();
        if retry {
            instruction.push_str(" The caller's last answer did not give it; ask again politely.");
            suggested = format!("Sorry, I didn't quite get that. {}", suggested);
        } else if first_question {
            instruction.insert_str(0, "Briefly mention the free 15-minute consultation. ");
            suggested = format!(
                "I'd be happy to set up a free 15-minute consultation for you. {}",
                suggested
            );
        }
        TurnDirective {
            instruction,
            suggested,
        }
    }

    fn readback(&self, state: &CallState) -> String {
        let get = |slot| state.slots.get(slot).unwrap_or("not given");
        format!(
            "{} {}, email {}, phone {}",
            get(SlotName::FirstName),
            get(SlotName::LastName),
            get(SlotName::Email),
            state
                .slots
                .get(SlotName::Phone)
                .map(spaced_digits)
                .unwrap_or_else(|| "not given".to_string()),
        )
    }

    fn system_prompt(&self, state: &CallState) -> String {
        let collected: Vec<&str> = state.slots.filled().map(|(k, _)| k.as_str()).collect();
        let do_not_ask = if collected.is_empty() {
            "none".to_string()
        } else {
            collected.join(", ")
        };
        format!(
            "You are a friendly receptionist answering the phone for {firm}, a CPA firm. \
             For tax questions (personal, business, general information) offer a free 15-minute consultation. \
             Speak in one or two short sentences and ask exactly one question at a time, following the turn instruction. \
             Never say goodbye; the system ends the call. \
             Already collected, do not ask again: {do_not_ask}.\n\
             Respond ONLY with JSON: {{\"intent\": one of [returning_client, appointment_request, personal_tax, business_tax, specific_person_request, other, end_call], \"text\": \"what to say\"}}",
            firm = self.settings.firm_name,
            do_not_ask = do_not_ask,
        )
    }

    async fn generate(
        &self,
        state: &CallState,
        directive: &TurnDirective,
    ) -> Result<GeneratedReply, CallError> {
        let mut messages = vec![Message::system(self.system_prompt(state))];
        messages.extend(
            state
                .history
                .recent(self.settings.max_context_turns)
                .iter()
                .cloned(),
        );
        let snapshot = serde_json::to_string(&state.snapshot()).unwrap_or_default();
        messages.push(Message::system(format!("Call state: {}", snapshot)));
        messages.push(Message::system(format!(
            "{}\n{} {}",
            directive.instruction, SUGGESTED_WORDING_PREFIX, directive.suggested
        )));

        let timeout = self.settings.generation_timeout;
        match tokio::time::timeout(timeout, self.llm.complete(&messages)).await {
            Ok(Ok(raw)) => Ok(GeneratedReply::parse(&raw)),
            Ok(Err(e)) => {
                warn!(call_id = %state.call_id, error = %e, "Generation failed");
                Err(CallError::GenerationFailure(e))
            }
            Err(_) => {
                warn!(call_id = %state.call_id, timeout_ms = timeout.as_millis() as u64, "Generation timed out");
                Err(CallError::GenerationTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// 去标记、压空白、限长；生成为空时用建议措辞
    fn shape(&self, generated: &str, suggested: &str) -> String {
        let text = strip_marker(generated);
        let text = if text.is_empty() {
            suggested.to_string()
        } else {
            text
        };
        cap_length(&text, self.settings.max_reply_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn policy_with(llm: MockLlmClient) -> DialoguePolicy {
        DialoguePolicy::new(Arc::new(llm), PolicySettings::default())
    }

    fn mid_call() -> CallState {
        let mut state = CallState::new("CA-policy");
        state.turn_index = 1;
        state
    }

    #[tokio::test]
    async fn test_first_turn_is_greeting_without_llm() {
        let llm = Arc::new(MockLlmClient::new());
        let policy = DialoguePolicy::new(llm.clone(), PolicySettings::default());
        let mut state = CallState::new("CA1");
        let out = policy
            .respond(&mut state, "", &Extraction::default())
            .await
            .unwrap();
        assert_eq!(out.intent, DialogueIntent::Greeting);
        assert_eq!(
            out.text,
            "Thanks for calling Ahad and Co CPA Firm. How can I help you today?"
        );
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_appointment_request_asks_first_name() {
        let policy = policy_with(MockLlmClient::new());
        let mut state = mid_call();
        let out = policy
            .respond(&mut state, "I'd like to book an appointment", &Extraction::default())
            .await
            .unwrap();
        assert!(state.booking_track);
        assert_eq!(out.intent, DialogueIntent::Ask(Step::CollectFirstName));
        assert!(out.text.contains("first name"));
        assert_eq!(state.last_asked, Some(Step::CollectFirstName));
    }

    #[tokio::test]
    async fn test_declared_intent_starts_booking_track() {
        let policy = policy_with(MockLlmClient::with_replies([
            r#"{"intent": "personal_tax", "text": "We can help. May I have your first name?"}"#,
        ]));
        let mut state = mid_call();
        let out = policy
            .respond(&mut state, "I got a letter from the government", &Extraction::default())
            .await
            .unwrap();
        assert!(state.booking_track);
        assert_eq!(out.intent, DialogueIntent::Ask(Step::CollectFirstName));
    }

    #[tokio::test]
    async fn test_other_intent_offers_consultation() {
        let policy = policy_with(MockLlmClient::new());
        let mut state = mid_call();
        let out = policy
            .respond(&mut state, "What are your office hours?", &Extraction::default())
            .await
            .unwrap();
        assert_eq!(out.intent, DialogueIntent::Answer);
        assert!(!state.booking_track);
        assert!(state.flags.consultation_offered);

        let out = policy
            .respond(&mut state, "Yes please", &Extraction::default())
            .await
            .unwrap();
        assert!(state.booking_track);
        assert_eq!(out.intent, DialogueIntent::Ask(Step::CollectFirstName));
    }

    #[tokio::test]
    async fn test_skips_satisfied_and_ask_once_steps() {
        let policy = policy_with(MockLlmClient::new());
        let mut state = mid_call();
        state.booking_track = true;
        for (slot, value) in [
            (SlotName::FirstName, "John"),
            (SlotName::LastName, "Smith"),
            (SlotName::Email, "john@example.com"),
            (SlotName::Phone, "5551234567"),
        ] {
            state.slots.set(slot, value);
        }
        state.pending_step = Step::CollectPreviousClient;
        state.flags.previous_client_asked = true;
        state.last_asked = Some(Step::CollectPreviousClient);

        let out = policy
            .respond(&mut state, "hmm", &Extraction::default())
            .await
            .unwrap();
        assert_eq!(out.intent, DialogueIntent::Ask(Step::CollectReferral));
        assert!(state.flags.referral_asked);
    }

    #[tokio::test]
    async fn test_referral_skipped_for_returning_client() {
        let mut state = mid_call();
        state.booking_track = true;
        state.pending_step = Step::CollectPreviousClient;
        state.slots.set(SlotName::PreviousClient, "Yes");
        state.skip_referral();
        DialoguePolicy::advance(&mut state, &Extraction::default());
        assert_eq!(state.pending_step, Step::CollectCallReason);
    }

    #[tokio::test]
    async fn test_confirmation_then_closing_has_single_marker() {
        let policy = policy_with(MockLlmClient::new());
        let mut state = mid_call();
        state.booking_track = true;
        for (slot, value) in [
            (SlotName::FirstName, "John"),
            (SlotName::LastName, "Smith"),
            (SlotName::Email, "john@example.com"),
            (SlotName::Phone, "5551234567"),
            (SlotName::CallReason, "Tax return"),
        ] {
            state.slots.set(slot, value);
        }
        state.flags.previous_client_asked = true;
        state.flags.referral_asked = true;
        DialoguePolicy::advance(&mut state, &Extraction::default());
        assert_eq!(state.pending_step, Step::Confirmation);

        let out = policy
            .respond(&mut state, "sure", &Extraction::default())
            .await
            .unwrap();
        assert_eq!(out.intent, DialogueIntent::Confirm);
        assert!(out.text.contains("john@example.com"));
        assert!(out.text.contains("5 5 5"));

        let yes = Extraction {
            affirmative_reply: true,
            ..Default::default()
        };
        let out = policy.respond(&mut state, "yes", &yes).await.unwrap();
        assert!(out.ends_call());
        assert_eq!(marker_count(&out.text), 1);
        assert!(out.text.contains("Thank you, John"));
    }

    #[tokio::test]
    async fn test_negative_confirmation_asks_what_to_fix() {
        let policy = policy_with(MockLlmClient::new());
        let mut state = mid_call();
        state.booking_track = true;
        state.pending_step = Step::Confirmation;
        state.last_asked = Some(Step::Confirmation);
        let no = Extraction {
            negative_reply: true,
            ..Default::default()
        };
        let out = policy.respond(&mut state, "no", &no).await.unwrap();
        assert_eq!(out.intent, DialogueIntent::Confirm);
        assert!(out.text.contains("Which detail"));
        assert!(!state.flags.confirmed);
    }

    #[tokio::test]
    async fn test_end_call_before_booking() {
        let llm = Arc::new(MockLlmClient::new());
        let policy = DialoguePolicy::new(llm.clone(), PolicySettings::default());
        let mut state = mid_call();
        let out = policy
            .respond(&mut state, "No thanks, bye", &Extraction::default())
            .await
            .unwrap();
        assert!(out.ends_call());
        assert_eq!(marker_count(&out.text), 1);
        assert!(out.text.contains("Have a great day"));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_generated_goodbye_is_stripped() {
        let policy = policy_with(MockLlmClient::with_replies([
            r#"{"intent": "other", "text": "We open at nine. Goodbye!"}"#,
        ]));
        let mut state = mid_call();
        let out = policy
            .respond(&mut state, "When do you open?", &Extraction::default())
            .await
            .unwrap();
        assert!(!out.ends_call());
        assert_eq!(marker_count(&out.text), 0);
        assert_eq!(out.text, "We open at nine.");
    }

    #[tokio::test]
    async fn test_undeclared_goodbye_ends_call() {
        let policy = policy_with(MockLlmClient::with_replies(["Alright then. Goodbye!"]));
        let mut state = mid_call();
        let out = policy
            .respond(&mut state, "I think I'm all set", &Extraction::default())
            .await
            .unwrap();
        assert!(out.ends_call());
        assert_eq!(marker_count(&out.text), 1);
    }

    #[tokio::test]
    async fn test_silence_reprompts_last_question() {
        let llm = Arc::new(MockLlmClient::new());
        let policy = DialoguePolicy::new(llm.clone(), PolicySettings::default());
        let mut state = mid_call();
        state.record_assistant("Could I have your first name, please?");
        let out = policy
            .respond(&mut state, "  ", &Extraction::default())
            .await
            .unwrap();
        assert_eq!(out.intent, DialogueIntent::Reprompt);
        assert_eq!(
            out.text,
            "Sorry, I didn't catch that. Could I have your first name, please?"
        );
        state.record_assistant(&out.text);
        let again = policy
            .respond(&mut state, "", &Extraction::default())
            .await
            .unwrap();
        assert_eq!(again.text, out.text);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_silence_ends_call() {
        let policy = policy_with(MockLlmClient::new());
        let mut state = mid_call();
        state.record_assistant("Could I have your first name, please?");
        let silent = Extraction::default();

        for _ in 0..2 {
            let out = policy.respond(&mut state, "", &silent).await.unwrap();
            assert_eq!(out.intent, DialogueIntent::Reprompt);
        }
        let out = policy.respond(&mut state, "", &silent).await.unwrap();
        assert!(out.ends_call());
        assert_eq!(marker_count(&out.text), 1);
        assert!(out.text.contains("Have a great day"));
    }

    #[tokio::test]
    async fn test_speech_resets_silence_count() {
        let policy = policy_with(MockLlmClient::new());
        let mut state = mid_call();
        state.record_assistant("Could I have your first name, please?");
        let silent = Extraction::default();

        policy.respond(&mut state, "", &silent).await.unwrap();
        policy.respond(&mut state, "", &silent).await.unwrap();
        policy.respond(&mut state, "What are your hours?", &silent).await.unwrap();
        assert_eq!(state.silent_reprompts, 0);

        let out = policy.respond(&mut state, "", &silent).await.unwrap();
        assert_eq!(out.intent, DialogueIntent::Reprompt);
    }

    #[test]
    fn test_cap_length_prefers_sentence_end() {
        let text = "First sentence here. Second sentence that runs on and on.";
        assert_eq!(cap_length(text, 30), "First sentence here.");
        assert_eq!(cap_length("short", 30), "short");
    }

    #[test]
    fn test_single_marker() {
        assert_eq!(with_single_marker("Thanks. Goodbye. goodbye!"), "Thanks. Goodbye.");
        assert_eq!(marker_count("Good-bye and goodbye"), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_is_error() {
        struct Broken;
        #[async_trait::async_trait]
        impl LlmClient for Broken {
            async fn complete(&self, _: &[Message]) -> Result<String, String> {
                Err("upstream 500".to_string())
            }
        }
        let policy = DialoguePolicy::new(Arc::new(Broken), PolicySettings::default());
        let mut state = mid_call();
        let err = policy
            .respond(&mut state, "What are your hours?", &Extraction::default())
            .await
            .unwrap_err();
        assert_eq!(err, CallError::GenerationFailure("upstream 500".to_string()));
    }
}
