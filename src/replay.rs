//! 重播協調
//!
//! [`ReplayScheduler`] 持有工作階段生命週期：選定節奏策略、驅動事件來源、
//! 依節奏發布事件，並定期寫入檢查點。同一時間只允許一個工作階段。

pub mod pacing;
pub mod scheduler;
pub mod session;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::domain_types::ReplayCheckpoint;

pub use pacing::Pacer;
pub use scheduler::{ReplayHandle, ReplayScheduler};

/// 重播錯誤
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Replay is already running")]
    AlreadyRunning,

    #[error("Replay is not running")]
    NotRunning,

    #[error("Invalid pacing policy: {0}")]
    InvalidPolicy(String),
}

/// 排程器狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplayState {
    Idle,
    Running,
    /// 來源讀完，正在收尾
    Completing,
    /// 收到停止請求，正在收尾
    Stopped,
    /// 來源讀取失敗，正在收尾
    Failed,
}

impl fmt::Display for ReplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplayState::Idle => "IDLE",
            ReplayState::Running => "RUNNING",
            ReplayState::Completing => "COMPLETING",
            ReplayState::Stopped => "STOPPED",
            ReplayState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// 工作階段結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionOutcome {
    /// 來源讀完，檢查點已刪除
    Completed,
    /// 依請求停止，檢查點保留
    Stopped,
    /// 來源無法開啟或讀取，檢查點保留
    Failed(String),
}

/// 工作階段計數（由單一計數任務維護）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// 已確認發布的事件數
    pub processed: u64,
    /// 發布失敗的事件數
    pub failed: u64,
    /// 最後一筆確認發布事件的原始時間
    pub last_event_time: Option<DateTime<Utc>>,
}

/// 排程器狀態快照
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStatus {
    pub state: ReplayState,
    pub running: bool,
    pub events_processed: u64,
    pub events_failed: u64,
    pub current_checkpoint: Option<ReplayCheckpoint>,
    pub source_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_event_time: Option<DateTime<Utc>>,
    pub last_outcome: Option<SessionOutcome>,
}
