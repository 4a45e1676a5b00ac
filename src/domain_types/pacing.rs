use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 重播速度模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeedMode {
    /// 保持原始事件間隔
    RealTime,
    /// 依倍率壓縮原始間隔
    Accelerated,
    /// 不延遲，批次間短暫停頓
    Burst,
}

impl SpeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedMode::RealTime => "real-time",
            SpeedMode::Accelerated => "accelerated",
            SpeedMode::Burst => "burst",
        }
    }
}

impl fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpeedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "real-time" => Ok(SpeedMode::RealTime),
            "accelerated" => Ok(SpeedMode::Accelerated),
            "burst" => Ok(SpeedMode::Burst),
            other => Err(format!("未知的速度模式: {}", other)),
        }
    }
}

/// 節奏策略，於啟動時選定，整個工作階段內固定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacingPolicy {
    /// 即時重播
    RealTime,
    /// 加速重播，`multiplier` 必須大於 0
    Accelerated { multiplier: f64 },
    /// 突發重播：每 `batch_size` 筆事件後暫停 `pause`
    Burst { batch_size: usize, pause: Duration },
}

impl PacingPolicy {
    /// 突發模式預設的批次間停頓
    pub const DEFAULT_BURST_PAUSE: Duration = Duration::from_millis(10);

    /// 對應的速度模式
    pub fn speed_mode(&self) -> SpeedMode {
        match self {
            PacingPolicy::RealTime => SpeedMode::RealTime,
            PacingPolicy::Accelerated { .. } => SpeedMode::Accelerated,
            PacingPolicy::Burst { .. } => SpeedMode::Burst,
        }
    }

    /// 檢查策略參數
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            PacingPolicy::RealTime => Ok(()),
            PacingPolicy::Accelerated { multiplier } => {
                if multiplier.is_finite() && multiplier > 0.0 {
                    Ok(())
                } else {
                    Err(format!("加速倍率必須大於 0: {}", multiplier))
                }
            }
            PacingPolicy::Burst { batch_size, .. } => {
                if batch_size == 0 {
                    Err("突發批次大小必須至少為 1".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Display for PacingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacingPolicy::RealTime => write!(f, "real-time"),
            PacingPolicy::Accelerated { multiplier } => write!(f, "accelerated(x{})", multiplier),
            PacingPolicy::Burst { batch_size, pause } => {
                write!(f, "burst(batch={}, pause={:?})", batch_size, pause)
            }
        }
    }
}
