// monitor.rs - 監控指標模組

pub mod metrics;

// 重新導出常用元素
pub use self::metrics::{install_exporter, MetricType, ReplayMetrics, METRIC_NAMESPACE};

/// 監控系統錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 初始化錯誤
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// 監控結果類型
pub type MonitorResult<T> = Result<T, MonitorError>;
