//! 單一重播工作階段的執行流程

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Pacer, ReplayState, SessionCounters, SessionOutcome};
use crate::checkpoint::CheckpointManager;
use crate::domain_types::{PacingPolicy, ReplayCheckpoint, SpeedMode};
use crate::messaging::EventPublisher;
use crate::monitor::ReplayMetrics;
use crate::source::{EventSource, EventStream, SourceError};

/// 狀態轉換回呼
pub(crate) type Transition = Arc<dyn Fn(ReplayState) + Send + Sync>;

/// 工作階段所需的協作元件
pub(crate) struct SessionContext {
    pub source: Arc<dyn EventSource>,
    pub publisher: Arc<EventPublisher>,
    pub checkpoints: Arc<CheckpointManager>,
    pub policy: PacingPolicy,
    pub source_id: String,
    pub cancel: CancellationToken,
    pub transition: Transition,
}

/// 單筆發布完成通知
#[derive(Debug)]
struct Completion {
    success: bool,
    event_time: DateTime<Utc>,
}

/// 從先前檢查點延續的進度
#[derive(Debug, Clone, Copy, Default)]
struct ResumedProgress {
    skip: u64,
    published: u64,
    failed: u64,
}

impl From<&ReplayCheckpoint> for ResumedProgress {
    fn from(checkpoint: &ReplayCheckpoint) -> Self {
        Self {
            skip: checkpoint.resume_sequence_number,
            published: checkpoint.events_published,
            failed: checkpoint.events_failed,
        }
    }
}

/// 依工作階段計數產生檢查點
#[derive(Debug, Clone)]
struct SnapshotBuilder {
    source_id: String,
    speed_mode: SpeedMode,
    resumed: ResumedProgress,
    total_events: Option<u64>,
}

impl SnapshotBuilder {
    fn build(&self, counters: &SessionCounters) -> ReplayCheckpoint {
        ReplayCheckpoint::new(
            self.source_id.clone(),
            self.resumed.skip + counters.processed,
            self.speed_mode,
        )
        .with_counts(
            self.resumed.published + counters.processed,
            self.resumed.failed + counters.failed,
        )
        .with_last_event_time(counters.last_event_time)
        .with_total_events(self.total_events)
    }
}

/// 節奏迴圈結束原因
enum LoopEnd {
    Exhausted,
    Cancelled,
    ReadError(SourceError),
}

/// 執行一個完整的工作階段並返回結果
///
/// 計數由單一任務透過 `counters` 發布；發布任務只送出完成通知。
pub(crate) async fn run_session(
    ctx: SessionContext,
    counters: watch::Sender<SessionCounters>,
) -> SessionOutcome {
    info!("Starting replay of {} with policy {}", ctx.source_id, ctx.policy);

    let resumed = ctx
        .checkpoints
        .load(&ctx.source_id)
        .await
        .as_ref()
        .map(ResumedProgress::from)
        .unwrap_or_default();

    let total_events = match ctx.source.count().await {
        Ok(total) => total,
        Err(err) => {
            warn!("Unable to count events in {}: {}", ctx.source_id, err);
            None
        }
    };

    let mut stream = match ctx.source.open().await {
        Ok(stream) => stream,
        Err(err) => {
            error!("Failed to open event source {}: {}", ctx.source_id, err);
            (ctx.transition)(ReplayState::Failed);
            close_source(&ctx).await;
            return SessionOutcome::Failed(err.to_string());
        }
    };

    if resumed.skip > 0 {
        info!("Resuming {}: skipping first {} events", ctx.source_id, resumed.skip);
        if let Some(end) = skip_events(&mut stream, resumed.skip, &ctx.cancel).await {
            let snapshot = SnapshotBuilder {
                source_id: ctx.source_id.clone(),
                speed_mode: ctx.policy.speed_mode(),
                resumed,
                total_events,
            };
            return finish(&ctx, end, Some(&ctx.publisher), snapshot, SessionCounters::default()).await;
        }
    }

    let snapshot = SnapshotBuilder {
        source_id: ctx.source_id.clone(),
        speed_mode: ctx.policy.speed_mode(),
        resumed,
        total_events,
    };

    // 單一計數任務
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let counters_rx = counters.subscribe();
    let counter_task = tokio::spawn(count_completions(done_rx, counters));

    let timer_cancel = ctx.cancel.child_token();
    let timer = ctx.checkpoints.is_enabled().then(|| {
        tokio::spawn(run_checkpoint_timer(
            ctx.checkpoints.clone(),
            snapshot.clone(),
            counters_rx,
            timer_cancel.clone(),
        ))
    });

    let mut pacer = Pacer::new(ctx.policy);
    let mut in_flight = JoinSet::new();

    let end = loop {
        if ctx.cancel.is_cancelled() {
            break LoopEnd::Cancelled;
        }

        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break LoopEnd::Cancelled,
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(err)) => break LoopEnd::ReadError(err),
            None => break LoopEnd::Exhausted,
        };

        let delay = pacer.delay_before(event.timestamp());
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break LoopEnd::Cancelled,
                _ = sleep(delay) => {}
            }
        }
        pacer.record_emitted();

        let publisher = ctx.publisher.clone();
        let done = done_tx.clone();
        in_flight.spawn(async move {
            let result = publisher.publish(&event).await;
            let _ = done.send(Completion {
                success: result.is_ok(),
                event_time: event.timestamp(),
            });
        });

        // 回收已完成的任務
        while in_flight.try_join_next().is_some() {}
    };
    drop(stream);

    debug!(
        "Pacing loop ended after emitting {} events, waiting for {} in-flight publishes",
        pacer.emitted(),
        in_flight.len()
    );

    stop_timer(&timer_cancel, timer).await;

    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            warn!("Publish task ended abnormally: {}", err);
        }
    }
    drop(done_tx);

    let final_counters = match counter_task.await {
        Ok(counters) => counters,
        Err(err) => {
            error!("Counter task ended abnormally: {}", err);
            SessionCounters::default()
        }
    };

    finish(&ctx, end, Some(&ctx.publisher), snapshot, final_counters).await
}

/// 依結束原因收尾
async fn finish(
    ctx: &SessionContext,
    end: LoopEnd,
    publisher: Option<&Arc<EventPublisher>>,
    snapshot: SnapshotBuilder,
    counters: SessionCounters,
) -> SessionOutcome {
    let outcome = match end {
        LoopEnd::Exhausted => {
            (ctx.transition)(ReplayState::Completing);
            ctx.checkpoints.delete(&ctx.source_id).await;
            info!(
                "Replay of {} completed: {} published, {} failed",
                ctx.source_id, counters.processed, counters.failed
            );
            SessionOutcome::Completed
        }
        LoopEnd::Cancelled => {
            (ctx.transition)(ReplayState::Stopped);
            let checkpoint = snapshot.build(&counters);
            let resume_at = checkpoint.resume_sequence_number;
            if let Err(err) = ctx.checkpoints.save(checkpoint).await {
                warn!("Failed to save final checkpoint: {}", err);
            }
            info!(
                "Replay of {} stopped: {} published, {} failed, resume at {}",
                ctx.source_id, counters.processed, counters.failed, resume_at
            );
            SessionOutcome::Stopped
        }
        LoopEnd::ReadError(err) => {
            (ctx.transition)(ReplayState::Failed);
            error!("Replay of {} failed while reading: {}", ctx.source_id, err);
            SessionOutcome::Failed(err.to_string())
        }
    };

    if let Some(publisher) = publisher {
        if let Err(err) = publisher.close().await {
            warn!("Failed to close publisher: {}", err);
        }
    }
    close_source(ctx).await;

    outcome
}

async fn close_source(ctx: &SessionContext) {
    if let Err(err) = ctx.source.close().await {
        warn!("Failed to close event source {}: {}", ctx.source_id, err);
    }
}

/// 定位跳過前 `count` 筆事件；正常跳完返回 None
async fn skip_events(stream: &mut EventStream, count: u64, cancel: &CancellationToken) -> Option<LoopEnd> {
    let mut skipped = 0;
    while skipped < count {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Some(LoopEnd::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(_)) => skipped += 1,
            Some(Err(err)) => return Some(LoopEnd::ReadError(err)),
            None => {
                debug!("Source ended after skipping {} of {} events", skipped, count);
                return Some(LoopEnd::Exhausted);
            }
        }
    }
    None
}

/// 計數任務：唯一擁有工作階段計數的地方
async fn count_completions(
    mut completions: mpsc::UnboundedReceiver<Completion>,
    counters: watch::Sender<SessionCounters>,
) -> SessionCounters {
    let mut current = SessionCounters::default();

    while let Some(completion) = completions.recv().await {
        if completion.success {
            current.processed += 1;
            current.last_event_time = Some(completion.event_time);
        } else {
            current.failed += 1;
        }
        counters.send_replace(current);
        ReplayMetrics::session(current.processed, current.failed, true);
    }

    current
}

/// 檢查點定時器，讀取計數但不阻塞節奏迴圈
async fn run_checkpoint_timer(
    checkpoints: Arc<CheckpointManager>,
    snapshot: SnapshotBuilder,
    counters: watch::Receiver<SessionCounters>,
    cancel: CancellationToken,
) {
    let period = checkpoints.interval();
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let current = *counters.borrow();
                if let Err(err) = checkpoints.save(snapshot.build(&current)).await {
                    warn!("Failed to save checkpoint: {}", err);
                }
            }
        }
    }
    debug!("Checkpoint timer stopped");
}

async fn stop_timer(cancel: &CancellationToken, timer: Option<JoinHandle<()>>) {
    cancel.cancel();
    if let Some(timer) = timer {
        if let Err(err) = timer.await {
            warn!("Checkpoint timer ended abnormally: {}", err);
        }
    }
}
