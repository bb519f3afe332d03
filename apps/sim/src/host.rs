//! 模拟宿主框架
//!
//! 以固定频率在当前线程上依次调用 `init` → `init_loop`* → `start` → `loop`* → `stop`，
//! 与真实宿主的轮询线程行为一致。

use anyhow::Result;
use linear_opmode::{HostControl, OpMode, OpModeLifecycle, TaskExit, TelemetrySink};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SimConfig;

/// 模拟宿主：记录 OpMode 的停止请求
#[derive(Debug, Default)]
pub struct SimHost {
    stop_requested: AtomicBool,
}

impl SimHost {
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

impl HostControl for SimHost {
    fn request_op_mode_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            info!("OpMode requested stop");
        }
    }
}

/// 模拟遥测：仅记录刷新次数
#[derive(Debug, Default)]
pub struct SimTelemetry {
    flushes: AtomicUsize,
}

impl SimTelemetry {
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }
}

impl TelemetrySink for SimTelemetry {
    fn flush_if_dirty(&self) {
        let count = self.flushes.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Telemetry flushed ({} total)", count);
    }
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// OpMode 请求停止
    Requested,
    /// 回调回抛了任务失败
    Failed,
    /// 运行时间耗尽
    Elapsed,
    /// Ctrl-C
    Interrupted,
}

/// 会话报告
#[derive(Debug)]
pub struct SessionReport {
    pub cause: StopCause,
    pub polls: u64,
    pub started: bool,
    /// 回抛给宿主的失败
    pub failure: Option<String>,
    pub exit: Option<TaskExit>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// 运行一次完整的 OpMode 会话
///
/// `init` 或 `start` 返回状态/配置错误时直接返回 `Err`；
/// 任务失败记录在报告中，随后仍会调用 `stop`。
pub fn run_session<M: OpMode>(
    lifecycle: &mut OpModeLifecycle<M>,
    host: &SimHost,
    config: &SimConfig,
    interrupted: &AtomicBool,
) -> Result<SessionReport> {
    let period = config.period();
    let mut report = SessionReport {
        cause: StopCause::Elapsed,
        polls: 0,
        started: false,
        failure: None,
        exit: None,
    };

    lifecycle.init()?;

    // 阶段 1：等待 start
    let init_at = Instant::now();
    let mut cause = None;
    while cause.is_none() && init_at.elapsed() < config.start_after() {
        cause = poll_once(lifecycle, host, interrupted, &mut report, false);
        spin_sleep::sleep(period);
    }

    // 阶段 2：运行
    if cause.is_none() {
        lifecycle.start()?;
        report.started = true;

        let start_at = Instant::now();
        while cause.is_none() {
            if start_at.elapsed() >= config.run_for() {
                cause = Some(StopCause::Elapsed);
                break;
            }
            cause = poll_once(lifecycle, host, interrupted, &mut report, true);
            spin_sleep::sleep(period);
        }
    }

    report.cause = cause.unwrap_or(StopCause::Elapsed);
    info!("Stopping OpMode ({:?}) after {} polls", report.cause, report.polls);

    if let Err(e) = lifecycle.stop() {
        error!("stop failed: {}", e);
        report.failure.get_or_insert_with(|| e.to_string());
    }
    report.exit = lifecycle.last_exit().cloned();

    Ok(report)
}

fn poll_once<M: OpMode>(
    lifecycle: &mut OpModeLifecycle<M>,
    host: &SimHost,
    interrupted: &AtomicBool,
    report: &mut SessionReport,
    started: bool,
) -> Option<StopCause> {
    if interrupted.load(Ordering::Acquire) {
        warn!("Interrupted, stopping OpMode");
        return Some(StopCause::Interrupted);
    }

    report.polls += 1;
    let result = if started {
        lifecycle.r#loop()
    } else {
        lifecycle.init_loop()
    };

    if let Err(e) = result {
        error!("OpMode failed: {}", e);
        report.failure = Some(e.to_string());
        return Some(StopCause::Failed);
    }

    host.stop_requested().then_some(StopCause::Requested)
}
