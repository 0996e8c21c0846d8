//! 通话状态：每个 call_id 一份，只在通话期间存在于内存
//!
//! CallState 由 TurnOrchestrator 在持有该通话锁期间修改；CallSnapshot 是给生成服务看的只读投影。

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::dialogue::schema::{SlotName, Slots, Step};
use crate::memory::{CallTranscript, Message};

/// 生命周期标志。booking_dispatched 与 ended 只会从 false 变为 true 一次
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallFlags {
    pub previous_client_asked: bool,
    pub referral_asked: bool,
    pub referral_skipped: bool,
    /// 还没进入预约流程时，已经主动提过免费咨询
    pub consultation_offered: bool,
    pub confirmed: bool,
    pub booking_dispatched: bool,
    pub ended: bool,
}

/// 单通电话的可变记录
#[derive(Debug, Clone)]
pub struct CallState {
    pub call_id: String,
    /// 来电号码（由电话平台提供），电话槽位为空时作为预约事件的兜底
    pub caller_address: Option<String>,
    /// 已完成的轮数
    pub turn_index: u64,
    pub slots: Slots,
    pub flags: CallFlags,
    pub history: CallTranscript,
    /// 当前正在收集的步骤
    pub pending_step: Step,
    /// 来电者已进入预约流程（此后每轮都问下一个未满足的步骤）
    pub booking_track: bool,
    /// 上一句话实际在问的步骤
    pub last_asked: Option<Step>,
    /// 连续沉默（没听到任何话）的轮数
    pub silent_reprompts: u32,
    pub last_active: Instant,
}

impl CallState {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            caller_address: None,
            turn_index: 0,
            slots: Slots::default(),
            flags: CallFlags::default(),
            history: CallTranscript::new(),
            pending_step: Step::default(),
            booking_track: false,
            last_asked: None,
            silent_reprompts: 0,
            last_active: Instant::now(),
        }
    }

    pub fn is_first_turn(&self) -> bool {
        self.turn_index == 0
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.last_active.elapsed() > ttl
    }

    /// 标记预约已派发；返回 true 表示这是那唯一一次 false -> true
    pub fn mark_booking_dispatched(&mut self) -> bool {
        if self.flags.booking_dispatched {
            return false;
        }
        self.flags.booking_dispatched = true;
        true
    }

    /// 标记通话结束；重复调用无副作用
    pub fn mark_ended(&mut self) -> bool {
        if self.flags.ended {
            return false;
        }
        self.flags.ended = true;
        true
    }

    /// 老客户不再问转介绍来源；此前来电者已经说过的来源保留
    pub fn skip_referral(&mut self) {
        self.flags.referral_skipped = true;
    }

    pub fn record_caller(&mut self, text: &str) {
        self.history.push(Message::user(text));
    }

    pub fn record_assistant(&mut self, text: &str) {
        self.history.push(Message::assistant(text));
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            turn_index: self.turn_index,
            pending_step: self.pending_step,
            booking_track: self.booking_track,
            collected: self
                .slots
                .filled()
                .map(|(k, v)| (k.as_str().to_string(), v.to_string()))
                .collect(),
            missing_required: self
                .slots
                .missing_required()
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            flags: self.flags.clone(),
        }
    }
}

/// 给生成服务的状态快照（JSON）
#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub turn_index: u64,
    pub pending_step: Step,
    pub booking_track: bool,
    pub collected: Vec<(String, String)>,
    pub missing_required: Vec<String>,
    pub flags: CallFlags,
}
