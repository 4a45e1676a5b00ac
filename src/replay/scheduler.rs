use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::session::{run_session, SessionContext, Transition};
use super::{ReplayError, ReplayState, ReplayStatus, SessionCounters, SessionOutcome};
use crate::checkpoint::CheckpointManager;
use crate::domain_types::PacingPolicy;
use crate::messaging::EventPublisher;
use crate::monitor::ReplayMetrics;
use crate::source::EventSource;

/// 排程器內部狀態，由互斥鎖保護
struct SchedulerState {
    state: ReplayState,
    cancel: Option<CancellationToken>,
    outcome: Option<watch::Receiver<Option<SessionOutcome>>>,
    counters: Option<watch::Receiver<SessionCounters>>,
    source_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    last_counters: SessionCounters,
    last_outcome: Option<SessionOutcome>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            state: ReplayState::Idle,
            cancel: None,
            outcome: None,
            counters: None,
            source_id: None,
            started_at: None,
            last_counters: SessionCounters::default(),
            last_outcome: None,
        }
    }
}

impl SchedulerState {
    fn counters(&self) -> SessionCounters {
        self.counters
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(self.last_counters)
    }
}

/// 工作階段句柄，可等待結果
#[derive(Debug, Clone)]
pub struct ReplayHandle {
    outcome: watch::Receiver<Option<SessionOutcome>>,
}

impl ReplayHandle {
    /// 等待工作階段結束
    pub async fn wait(mut self) -> SessionOutcome {
        match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(SessionOutcome::Completed),
            Err(_) => SessionOutcome::Failed("replay session ended without reporting".to_string()),
        }
    }

    /// 工作階段是否已結束
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

/// 重播排程器
///
/// 狀態轉換：Idle → Running → {Completing | Stopped | Failed} → Idle。
/// 非 Idle 時啟動返回 [`ReplayError::AlreadyRunning`]，
/// 非 Running 時停止返回 [`ReplayError::NotRunning`]。
pub struct ReplayScheduler {
    source: Arc<dyn EventSource>,
    publisher: Arc<EventPublisher>,
    checkpoints: Arc<CheckpointManager>,
    inner: Arc<Mutex<SchedulerState>>,
}

impl ReplayScheduler {
    pub fn new(
        source: Arc<dyn EventSource>,
        publisher: Arc<EventPublisher>,
        checkpoints: Arc<CheckpointManager>,
    ) -> Self {
        Self {
            source,
            publisher,
            checkpoints,
            inner: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// 以指定節奏策略啟動工作階段
    pub fn start(&self, policy: PacingPolicy) -> Result<ReplayHandle, ReplayError> {
        policy.validate().map_err(ReplayError::InvalidPolicy)?;

        let source_id = self.source.source_id();
        let cancel = CancellationToken::new();
        let (counters_tx, counters_rx) = watch::channel(SessionCounters::default());
        let (outcome_tx, outcome_rx) = watch::channel(None);

        {
            let mut inner = self.inner.lock();
            if inner.state != ReplayState::Idle {
                warn!("Rejected start: replay is {}", inner.state);
                return Err(ReplayError::AlreadyRunning);
            }

            inner.state = ReplayState::Running;
            inner.cancel = Some(cancel.clone());
            inner.outcome = Some(outcome_rx.clone());
            inner.counters = Some(counters_rx);
            inner.source_id = Some(source_id.clone());
            inner.started_at = Some(Utc::now());
            inner.last_outcome = None;
        }
        ReplayMetrics::session(0, 0, true);

        let transition_state = self.inner.clone();
        let transition: Transition = Arc::new(move |state| {
            transition_state.lock().state = state;
        });

        let ctx = SessionContext {
            source: self.source.clone(),
            publisher: self.publisher.clone(),
            checkpoints: self.checkpoints.clone(),
            policy,
            source_id,
            cancel,
            transition,
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = run_session(ctx, counters_tx).await;

            let counters = {
                let mut state = inner.lock();
                let counters = state.counters();
                state.state = ReplayState::Idle;
                state.cancel = None;
                state.outcome = None;
                state.counters = None;
                state.last_counters = counters;
                state.last_outcome = Some(outcome.clone());
                counters
            };
            ReplayMetrics::session(counters.processed, counters.failed, false);

            let _ = outcome_tx.send(Some(outcome));
        });

        info!("Replay started with policy {}", policy);
        Ok(ReplayHandle { outcome: outcome_rx })
    }

    /// 停止運行中的工作階段並等待收尾完成
    pub async fn stop(&self) -> Result<SessionOutcome, ReplayError> {
        let (cancel, outcome) = {
            let inner = self.inner.lock();
            match (&inner.state, &inner.cancel, &inner.outcome) {
                (ReplayState::Running, Some(cancel), Some(outcome)) => (cancel.clone(), outcome.clone()),
                _ => {
                    warn!("Rejected stop: replay is {}", inner.state);
                    return Err(ReplayError::NotRunning);
                }
            }
        };

        info!("Stopping replay");
        cancel.cancel();
        Ok(ReplayHandle { outcome }.wait().await)
    }

    /// 當前狀態
    pub fn state(&self) -> ReplayState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ReplayState::Running
    }

    /// 狀態快照；工作階段結束後保留最後的計數
    pub fn status(&self) -> ReplayStatus {
        let inner = self.inner.lock();
        let counters = inner.counters();

        ReplayStatus {
            state: inner.state,
            running: inner.state == ReplayState::Running,
            events_processed: counters.processed,
            events_failed: counters.failed,
            current_checkpoint: self.checkpoints.current(),
            source_id: inner.source_id.clone(),
            started_at: inner.started_at,
            last_event_time: counters.last_event_time,
            last_outcome: inner.last_outcome.clone(),
        }
    }

    /// 發布端健康檢查
    pub async fn check_health(&self) -> bool {
        match self.publisher.check_health().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Publisher health check failed: {}", err);
                false
            }
        }
    }
}
