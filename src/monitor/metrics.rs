use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::monitor::{MonitorError, MonitorResult};

/// 監控指標命名空間
pub const METRIC_NAMESPACE: &str = "replay";

/// 發布指標類型
#[derive(Debug, Clone, Copy)]
pub enum MetricType<'a> {
    Published { topic: &'a str },
    Failed { topic: &'a str },
    Latency { topic: &'a str },
}

/// 重播監控指標記錄器
pub struct ReplayMetrics;

impl ReplayMetrics {
    /// 記錄發布指標
    ///
    /// # Arguments
    /// * `metric_type` - 指標類型
    /// * `duration` - 可選的持續時間，用於延遲指標
    pub fn record(metric_type: MetricType<'_>, duration: Option<Duration>) {
        match metric_type {
            MetricType::Published { topic } => {
                counter!(
                    format!("{}.events.published", METRIC_NAMESPACE),
                    "topic" => topic.to_string()
                )
                .increment(1);
            }
            MetricType::Failed { topic } => {
                counter!(
                    format!("{}.events.failed", METRIC_NAMESPACE),
                    "topic" => topic.to_string()
                )
                .increment(1);
            }
            MetricType::Latency { topic } => {
                if let Some(dur) = duration {
                    histogram!(
                        format!("{}.events.publish.latency", METRIC_NAMESPACE),
                        "topic" => topic.to_string()
                    )
                    .record(dur.as_secs_f64());
                }
            }
        }
    }

    /// 記錄一次發布結果（成功或失敗）及其延遲
    pub fn record_publish(topic: &str, success: bool, duration: Duration) {
        let outcome = if success {
            MetricType::Published { topic }
        } else {
            MetricType::Failed { topic }
        };
        Self::record(outcome, None);
        Self::record(MetricType::Latency { topic }, Some(duration));
    }

    /// 更新工作階段指標
    pub fn session(processed: u64, failed: u64, running: bool) {
        gauge!(format!("{}.events.processed", METRIC_NAMESPACE)).set(processed as f64);
        gauge!(format!("{}.session.failed", METRIC_NAMESPACE)).set(failed as f64);
        gauge!(format!("{}.is.running", METRIC_NAMESPACE)).set(if running { 1.0 } else { 0.0 });
    }

    /// 註冊指標說明
    pub fn describe() {
        describe_counter!(
            format!("{}.events.published", METRIC_NAMESPACE),
            "Events acknowledged by the broker"
        );
        describe_counter!(
            format!("{}.events.failed", METRIC_NAMESPACE),
            "Events whose publish failed"
        );
        describe_histogram!(
            format!("{}.events.publish.latency", METRIC_NAMESPACE),
            Unit::Seconds,
            "Time from dispatch to broker acknowledgement"
        );
        describe_gauge!(
            format!("{}.events.processed", METRIC_NAMESPACE),
            "Events published in the current session"
        );
        describe_gauge!(
            format!("{}.session.failed", METRIC_NAMESPACE),
            "Failed publishes in the current session"
        );
        describe_gauge!(
            format!("{}.is.running", METRIC_NAMESPACE),
            "1 while a replay session is running"
        );
    }
}

/// 安裝 Prometheus 匯出器並註冊指標說明
pub fn install_exporter(listen_addr: &str) -> MonitorResult<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .map_err(|err| MonitorError::InitializationError(format!("{}: {}", listen_addr, err)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| MonitorError::InitializationError(err.to_string()))?;

    ReplayMetrics::describe();
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
