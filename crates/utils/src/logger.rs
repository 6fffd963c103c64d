use std::fs;
use std::path::Path;
use tracing_subscriber::filter::{EnvFilter, FilterFn, LevelFilter};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};
use tracing_appender::{non_blocking, rolling};
use time::macros::offset;

/// 中继请求日志的 target
pub const RELAY_TARGET: &str = "flashbots_relay";
/// 提交生命周期日志的 target
pub const SUBMISSION_TARGET: &str = "bundle_submission";

/// 日志管理器 - 基于target分类的日志系统
///
/// 持有 non-blocking writer 的 guard，drop 时刷新缓冲区，需要活到进程结束。
pub struct LoggerManager {
    _guards: Vec<non_blocking::WorkerGuard>,
}

impl LoggerManager {
    /// 初始化日志系统
    ///
    /// 日志分类：
    /// - 控制台: 级别由 `level` (RUST_LOG 语法) 决定
    /// - app.log: 通用应用日志
    /// - relay.log: Flashbots 中继请求与响应
    /// - submission.log: bundle 提交、重试、上链结果
    pub fn init(log_dir: impl AsRef<Path>, level: &str) -> Self {
        let log_dir = log_dir.as_ref();
        let mut guards = Vec::new();

        // 创建日志目录
        fs::create_dir_all(log_dir).ok();

        // 配置时区为东八区 (UTC+8 上海时间)
        let timer = OffsetTime::new(
            offset!(+8),
            time::format_description::well_known::Rfc3339,
        );

        // 1. 控制台输出
        let console_layer = fmt::layer()
            .compact()
            .with_target(true)
            .with_timer(timer.clone())
            .with_filter(
                EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
            );

        // 2. 通用应用日志 (app.log) - 排除中继请求的详细日志
        let (app_writer, app_guard) = non_blocking(rolling::daily(log_dir, "app.log"));
        guards.push(app_guard);

        let app_layer = fmt::layer()
            .compact()
            .with_writer(app_writer)
            .with_ansi(false)
            .with_target(true)
            .with_timer(timer.clone())
            .with_filter(LevelFilter::INFO)
            .with_filter(FilterFn::new(|metadata| metadata.target() != RELAY_TARGET));

        // 3. 中继日志 (relay.log)，包含 DEBUG 级别的请求体
        let (relay_writer, relay_guard) = non_blocking(rolling::daily(log_dir, "relay.log"));
        guards.push(relay_guard);

        let relay_layer = fmt::layer()
            .compact()
            .with_writer(relay_writer)
            .with_ansi(false)
            .with_target(true)
            .with_timer(timer.clone())
            .with_filter(FilterFn::new(|metadata| metadata.target() == RELAY_TARGET));

        // 4. 提交日志 (submission.log)
        let (submission_writer, submission_guard) =
            non_blocking(rolling::daily(log_dir, "submission.log"));
        guards.push(submission_guard);

        let submission_layer = fmt::layer()
            .compact()
            .with_writer(submission_writer)
            .with_ansi(false)
            .with_target(true)
            .with_timer(timer)
            .with_filter(FilterFn::new(|metadata| metadata.target() == SUBMISSION_TARGET));

        // 初始化tracing订阅器
        tracing_subscriber::registry()
            .with(console_layer)
            .with(app_layer)
            .with(relay_layer)
            .with(submission_layer)
            .init();

        Self { _guards: guards }
    }
}
