use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pacing::SpeedMode;

/// 重播進度快照，用於崩潰或停止後恢復
///
/// `resume_sequence_number` 取自已完成發布的事件數，而非讀取位置。
/// 發布尚在途中的事件在恢復後可能重送（至少一次），但不會被跳過。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayCheckpoint {
    /// 來源識別碼
    pub source_id: String,
    /// 恢復時需跳過的事件數
    pub resume_sequence_number: u64,
    /// 累計成功發布數
    pub events_published: u64,
    /// 累計發布失敗數
    pub events_failed: u64,
    /// 最後一筆完成發布事件的原始時間
    pub last_event_time: Option<DateTime<Utc>>,
    /// 速度模式
    pub speed_mode: SpeedMode,
    /// 快照時間
    pub snapshot_time: DateTime<Utc>,
    /// 來源總事件數（若已知）
    #[serde(default)]
    pub total_events: Option<u64>,
    /// 進度百分比 (0-100)，來源總數未知時為空
    #[serde(default)]
    pub progress_percentage: Option<f64>,
}

impl ReplayCheckpoint {
    /// 創建新的快照，快照時間為當下
    pub fn new(source_id: impl Into<String>, resume_sequence_number: u64, speed_mode: SpeedMode) -> Self {
        Self {
            source_id: source_id.into(),
            resume_sequence_number,
            events_published: 0,
            events_failed: 0,
            last_event_time: None,
            speed_mode,
            snapshot_time: Utc::now(),
            total_events: None,
            progress_percentage: None,
        }
    }

    /// 設置累計計數
    pub fn with_counts(mut self, published: u64, failed: u64) -> Self {
        self.events_published = published;
        self.events_failed = failed;
        self
    }

    /// 設置最後事件時間
    pub fn with_last_event_time(mut self, last_event_time: Option<DateTime<Utc>>) -> Self {
        self.last_event_time = last_event_time;
        self
    }

    /// 設置來源總數並計算進度
    pub fn with_total_events(mut self, total_events: Option<u64>) -> Self {
        self.total_events = total_events;
        self.progress_percentage = total_events.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.resume_sequence_number as f64 * 100.0 / total as f64).min(100.0)
            }
        });
        self
    }

    /// 是否屬於指定來源
    pub fn belongs_to(&self, source_id: &str) -> bool {
        self.source_id == source_id
    }
}
