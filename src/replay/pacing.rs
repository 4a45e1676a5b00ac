use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain_types::PacingPolicy;
use crate::utils::non_negative_between;

/// 節奏器：決定每筆事件發出前需等待多久
///
/// 即時與加速模式以第一筆發出的事件為錨點 `(事件時間, 牆鐘時間)`，
/// 之後每筆事件的目標時刻為 `錨點牆鐘 + (事件時間 - 錨點事件時間) / 倍率`。
/// 等待量扣除已經過的時間，落後時不等待。時間早於錨點的事件立即發出。
#[derive(Debug)]
pub struct Pacer {
    policy: PacingPolicy,
    anchor: Option<(DateTime<Utc>, Instant)>,
    emitted: u64,
}

impl Pacer {
    pub fn new(policy: PacingPolicy) -> Self {
        Self {
            policy,
            anchor: None,
            emitted: 0,
        }
    }

    /// 已發出的事件數
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// 以當前時間計算發出前的等待時間
    pub fn delay_before(&mut self, event_time: DateTime<Utc>) -> Duration {
        self.delay_before_at(event_time, Instant::now())
    }

    /// 以指定時間點計算發出前的等待時間
    pub fn delay_before_at(&mut self, event_time: DateTime<Utc>, now: Instant) -> Duration {
        match self.policy {
            PacingPolicy::RealTime => self.scaled_delay(event_time, now, 1.0),
            PacingPolicy::Accelerated { multiplier } => self.scaled_delay(event_time, now, multiplier),
            PacingPolicy::Burst { batch_size, pause } => {
                // 每滿一批，下一筆發出前停頓
                if self.emitted > 0 && self.emitted % batch_size.max(1) as u64 == 0 {
                    pause
                } else {
                    Duration::ZERO
                }
            }
        }
    }

    /// 記錄一筆事件已發出
    pub fn record_emitted(&mut self) {
        self.emitted += 1;
    }

    fn scaled_delay(&mut self, event_time: DateTime<Utc>, now: Instant, multiplier: f64) -> Duration {
        let (anchor_event_time, anchor_wall) = *self.anchor.get_or_insert((event_time, now));

        let due = non_negative_between(anchor_event_time, event_time);
        let scaled = Duration::try_from_secs_f64(due.as_secs_f64() / multiplier).unwrap_or(Duration::MAX);
        let elapsed = now.saturating_duration_since(anchor_wall);

        scaled.saturating_sub(elapsed)
    }
}
