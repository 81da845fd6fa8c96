//! 实时温湿度曲线监视：订阅各通道快照，重建曲线并推送给展示层。

mod feed;
mod sink;

use aircare_config::{AppConfig, ConfigError};
use aircare_normalize::RecordParser;
use aircare_pipeline::PipelineCoordinator;
use aircare_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let parser = RecordParser::with_offset_minutes(config.time_offset_minutes).ok_or_else(|| {
        ConfigError::Invalid(
            "AIRCARE_TIME_OFFSET_MINUTES".to_string(),
            config.time_offset_minutes.to_string(),
        )
    })?;

    // 订阅源：MQTT 需要常驻驱动任务，回放源没有
    let feed::BuiltFeed { feed, driver } = feed::build_feed(&config)?;
    let mut coordinator = PipelineCoordinator::new(feed, parser);
    coordinator
        .start(config.channels.clone(), Arc::new(sink::LoggingSink))
        .await?;
    info!(
        target: "aircare.app",
        channels = ?config.channels,
        "monitor_started"
    );

    match driver {
        Some(mut driver) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                result = &mut driver => match result {
                    Ok(Ok(())) => info!(target: "aircare.app", "feed_finished"),
                    Ok(Err(err)) => error!(target: "aircare.app", error = %err, "feed_failed"),
                    Err(err) => error!(target: "aircare.app", error = %err, "feed_task_failed"),
                },
            }
            driver.abort();
        }
        None => tokio::signal::ctrl_c().await?,
    }

    coordinator.shutdown().await;
    let snapshot = metrics().snapshot();
    info!(
        target: "aircare.app",
        snapshots_received = snapshot.snapshots_received,
        records_accepted = snapshot.records_accepted,
        records_rejected = snapshot.records_rejected,
        series_published = snapshot.series_published,
        subscription_errors = snapshot.subscription_errors,
        max_queue_depth = snapshot.max_queue_depth,
        "monitor_stopped"
    );
    Ok(())
}
