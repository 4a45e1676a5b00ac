use anyhow::{anyhow, Result};
use clap::Parser;
use replay_engine::checkpoint::CheckpointManager;
use replay_engine::config::{self, LogConfig, SourceType};
use replay_engine::domain_types::SpeedMode;
use replay_engine::messaging::EventPublisher;
use replay_engine::monitor;
use replay_engine::replay::{ReplayError, ReplayScheduler, SessionOutcome};
use replay_engine::source;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Chipmunk 事件重播引擎
#[derive(Parser, Debug)]
#[command(name = "replay_engine", version, about = "Replay Chipmunk event files into RabbitMQ")]
struct Cli {
    /// 覆寫速度模式 (real-time | accelerated | burst)
    #[arg(long)]
    speed_mode: Option<SpeedMode>,

    /// 覆寫加速倍率
    #[arg(long)]
    multiplier: Option<f64>,

    /// 改為重播指定的本地檔案
    #[arg(long)]
    file: Option<String>,

    /// 忽略現有檢查點，從頭開始
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化配置
    let app_config = config::init_config()?;

    // 初始化日誌系統
    let _log_guard = init_logging(&app_config.log)?;

    if app_config.metrics.enabled {
        monitor::install_exporter(&app_config.metrics.listen_addr)?;
    }

    let mut source_config = app_config.source.clone();
    if let Some(file) = cli.file {
        source_config.source_type = SourceType::LocalFile;
        source_config.local.file_path = file;
    }
    let event_source = source::from_config(&source_config);
    info!("事件來源: {}", event_source.source_id());

    let checkpoints = Arc::new(CheckpointManager::from_config(&app_config.checkpoint));
    if cli.fresh {
        checkpoints.delete(&event_source.source_id()).await;
    }

    let publisher = Arc::new(EventPublisher::from_config(&app_config.rabbitmq)?);
    if let Err(err) = publisher.check_health().await {
        warn!("RabbitMQ 目前無法連線，事件發布可能失敗: {}", err);
    }

    let mut replay_config = app_config.replay.clone();
    if let Some(speed_mode) = cli.speed_mode {
        replay_config.speed_mode = speed_mode;
    }
    if let Some(multiplier) = cli.multiplier {
        replay_config.speed_multiplier = multiplier;
    }

    let scheduler = ReplayScheduler::new(event_source, publisher, checkpoints);
    let handle = scheduler.start(replay_config.pacing_policy())?;

    let outcome = tokio::select! {
        outcome = handle.clone().wait() => outcome,
        _ = signal::ctrl_c() => {
            info!("收到中斷信號，正在停止重播");
            match scheduler.stop().await {
                Ok(outcome) => outcome,
                // 工作階段恰好已在收尾
                Err(ReplayError::NotRunning) => handle.wait().await,
                Err(err) => return Err(err.into()),
            }
        }
    };

    let status = scheduler.status();
    info!(
        "重播結束: {:?} (已發布 {}, 失敗 {})",
        outcome, status.events_processed, status.events_failed
    );

    match outcome {
        SessionOutcome::Failed(reason) => {
            error!("重播失敗: {}", reason);
            Err(anyhow!("重播失敗: {}", reason))
        }
        SessionOutcome::Completed | SessionOutcome::Stopped => Ok(()),
    }
}

/// 初始化日誌系統，返回的 guard 需在程序結束前保持存活
fn init_logging(log_config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_config.level.to_lowercase()));

    let (writer, guard) = if log_config.directory.is_empty() {
        (BoxMakeWriter::new(std::io::stdout), None)
    } else {
        let appender = tracing_appender::rolling::daily(&log_config.directory, "replay-engine.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        (BoxMakeWriter::new(non_blocking), Some(guard))
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    let result = if log_config.format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| anyhow!("設置日誌系統失敗: {}", e))?;

    info!("日誌系統初始化完成");
    Ok(guard)
}
