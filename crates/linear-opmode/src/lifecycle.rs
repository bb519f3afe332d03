//! OpMode 生命周期：宿主轮询回调 → 任务生命周期
//!
//! | 回调 | 调用时机 | 效果 |
//! |---|---|---|
//! | `init` | 按下 start 之前，一次 | 启动任务 |
//! | `init_loop` | start 之前，反复 | 让出 + 错误检查 |
//! | `start` | 按下 start，一次 | 打开闸门 |
//! | `loop` | 运行期间，反复 | 让出 + 错误检查 |
//! | `stop` | 停止/中止，一次 | 取消 + join + 复位 |
//!
//! # 线程模型
//!
//! 所有回调都在宿主的轮询线程上以 `&mut self` 调用；用户例程在独立的任务线程上运行。
//! 两者之间只共享闸门、取消令牌和被捕获错误槽。

use crossbeam_channel::{Receiver, RecvTimeoutError, SendError};
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::cancel::CancelReason;
use crate::config::LifecycleConfig;
use crate::context::OpModeContext;
use crate::error::{OpModeError, RunResult, TaskFailure, panic_message};
use crate::host::{HostControl, NoopTelemetry, TelemetrySink};
use crate::state::{HostCallback, LifecycleState};
use crate::task::{self, RunShared, TaskExit, TaskOutcome};

/// 用户 OpMode
///
/// 实现 `run` 即可；闭包 `FnMut(&OpModeContext) -> RunResult` 自动实现此 trait。
///
/// # 示例
///
/// ```rust
/// use linear_opmode::{OpMode, OpModeContext, RunResult};
///
/// struct DriveForward {
///     duration_ms: u64,
/// }
///
/// impl OpMode for DriveForward {
///     fn run(&mut self, ctx: &OpModeContext) -> RunResult {
///         ctx.wait_for_start()?;
///         ctx.sleep_ms(self.duration_ms)?;
///         Ok(())
///     }
///
///     fn name(&self) -> &str {
///         "drive-forward"
///     }
/// }
/// ```
pub trait OpMode: Send + 'static {
    /// 运行例程
    ///
    /// 每次 `init` 调用一次。返回 `Ok(())` 表示正常完成，
    /// 返回 `Err(RunError::Cancelled)` 表示被取消，其余错误会在下一次轮询时回抛给宿主。
    fn run(&mut self, ctx: &OpModeContext) -> RunResult;

    /// 日志中使用的名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> OpMode for F
where
    F: FnMut(&OpModeContext) -> RunResult + Send + 'static,
{
    fn run(&mut self, ctx: &OpModeContext) -> RunResult {
        self(ctx)
    }
}

/// 正在运行的任务
struct RunningTask<M> {
    /// 任务线程句柄；`None` 表示线程未收到 OpMode 即退出
    handle: JoinHandle<Option<TaskOutcome<M>>>,
    shared: Arc<RunShared>,
    /// 任务线程退出时断开
    done: Receiver<Infallible>,
}

/// OpMode 生命周期适配器
///
/// # 示例
///
/// ```rust
/// use linear_opmode::{HostControl, OpModeContext, OpModeLifecycle, RunResult};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Host {
///     stop_requested: AtomicBool,
/// }
///
/// impl HostControl for Host {
///     fn request_op_mode_stop(&self) {
///         self.stop_requested.store(true, Ordering::Release);
///     }
/// }
///
/// let host = Arc::new(Host::default());
/// let mut lifecycle = OpModeLifecycle::new(
///     |ctx: &OpModeContext| -> RunResult {
///         ctx.wait_for_start()?;
///         Ok(())
///     },
///     host.clone(),
/// );
///
/// lifecycle.init()?;
/// lifecycle.init_loop()?;
/// lifecycle.start()?;
/// while !host.stop_requested.load(Ordering::Acquire) {
///     lifecycle.r#loop()?;
/// }
/// lifecycle.stop()?;
/// # Ok::<(), linear_opmode::OpModeError>(())
/// ```
pub struct OpModeLifecycle<M: OpMode> {
    config: LifecycleConfig,
    host: Arc<dyn HostControl>,
    telemetry: Arc<dyn TelemetrySink>,
    state: LifecycleState,
    /// 空闲时持有的 OpMode（运行期间在任务线程上）
    op_mode: Option<M>,
    task: Option<RunningTask<M>>,
    last_exit: Option<TaskExit>,
}

impl<M: OpMode> OpModeLifecycle<M> {
    pub fn new(op_mode: M, host: Arc<dyn HostControl>) -> Self {
        Self {
            config: LifecycleConfig::default(),
            host,
            telemetry: Arc::new(NoopTelemetry),
            state: LifecycleState::Uninitialized,
            op_mode: Some(op_mode),
            task: None,
            last_exit: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// 设置配置（在下一次 `init` 时校验）
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// `init` 回调：启动任务
    ///
    /// # 错误
    ///
    /// - 上一次运行尚未 `stop`：`OpModeError::InvalidState`
    /// - 配置无效：`OpModeError::Config`
    /// - OpMode 已丢失：`OpModeError::OpModeUnavailable`
    /// - 线程创建失败：`OpModeError::Spawn`（OpMode 保留，可重试）
    pub fn init(&mut self) -> Result<(), OpModeError> {
        let next = self.state.on(HostCallback::Init)?;
        if self.task.is_some() {
            return Err(OpModeError::InvalidState {
                callback: HostCallback::Init,
                state: self.state,
            });
        }
        self.config.validate()?;

        let op_mode = self.op_mode.take().ok_or(OpModeError::OpModeUnavailable)?;
        let name = op_mode.name().to_string();

        let shared = Arc::new(RunShared::new());
        let ctx = OpModeContext::new(
            shared.clone(),
            self.telemetry.clone(),
            &self.config.thread_name,
        );
        let host = self.host.clone();
        let notify = self.config.notify_host_on_external_cancel;

        // OpMode 在线程创建成功后才移交，创建失败时可以取回
        let (mode_tx, mode_rx) = crossbeam_channel::bounded::<M>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<Infallible>(0);

        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let _done = done_tx;
                let op_mode = mode_rx.recv().ok()?;
                Some(task::supervise(op_mode, ctx, host.as_ref(), notify))
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.op_mode = Some(op_mode);
                error!("Failed to spawn OpMode `{}` task: {}", name, e);
                return Err(OpModeError::Spawn(e));
            },
        };

        if let Err(SendError(op_mode)) = mode_tx.send(op_mode) {
            self.op_mode = Some(op_mode);
            let _ = handle.join();
            return Err(OpModeError::Spawn(io::Error::other(
                "OpMode task exited before receiving its OpMode",
            )));
        }

        self.task = Some(RunningTask {
            handle,
            shared,
            done: done_rx,
        });
        self.last_exit = None;
        self.state = next;
        info!(
            "OpMode `{}` initialized on thread `{}`",
            name, self.config.thread_name
        );
        Ok(())
    }

    /// `init_loop` 回调：让出轮询线程并回抛被捕获的任务失败
    pub fn init_loop(&mut self) -> Result<(), OpModeError> {
        self.state = self.state.on(HostCallback::InitLoop)?;
        self.poll_health()
    }

    /// `start` 回调：打开启动闸门（重复调用无效果）
    pub fn start(&mut self) -> Result<(), OpModeError> {
        let next = self.state.on(HostCallback::Start)?;
        if let Some(task) = &self.task
            && task.shared.gate.open()
        {
            info!("OpMode started");
        }
        self.state = next;
        Ok(())
    }

    /// `loop` 回调：让出轮询线程并回抛被捕获的任务失败
    ///
    /// 任务失败后，直到 `stop` 之前每次调用都返回同一个失败。
    pub fn r#loop(&mut self) -> Result<(), OpModeError> {
        self.state = self.state.on(HostCallback::Loop)?;
        self.poll_health()
    }

    /// `stop` 回调：取消任务，阻塞到任务线程结束，然后复位
    ///
    /// 未初始化或已停止时为空操作。被捕获的失败在此丢弃，不会回抛到下一次运行。
    ///
    /// # 错误
    ///
    /// 任务监督逻辑自身 panic 时返回 `OpModeError::OpModeUnavailable`（状态仍会复位）。
    pub fn stop(&mut self) -> Result<(), OpModeError> {
        let next = self.state.on(HostCallback::Stop)?;
        if next != LifecycleState::Stopping {
            debug!("stop ignored while {}", self.state);
            return Ok(());
        }
        self.state = next;

        let result = match self.task.take() {
            Some(task) => self.join_task(task),
            None => Ok(()),
        };

        self.state = self.state.finish_stop()?;
        info!("OpMode stopped");
        result
    }

    /// 取消并 join（不设超时）
    fn join_task(&mut self, task: RunningTask<M>) -> Result<(), OpModeError> {
        let RunningTask {
            handle,
            shared,
            done,
        } = task;

        shared
            .cancel
            .cancel(CancelReason::host("OpMode stopped by host"));

        let warn_after = self.config.join_warn_after();
        match done.recv_timeout(warn_after) {
            Ok(never) => match never {},
            Err(RecvTimeoutError::Disconnected) => {},
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "OpMode task still running {:?} after stop; waiting for its next suspension point",
                    warn_after
                );
            },
        }

        let result = match handle.join() {
            Ok(Some(outcome)) => {
                debug!("OpMode task exited: {:?}", outcome.exit);
                self.op_mode = Some(outcome.op_mode);
                self.last_exit = Some(outcome.exit);
                Ok(())
            },
            Ok(None) => {
                self.last_exit = None;
                Err(OpModeError::OpModeUnavailable)
            },
            Err(payload) => {
                self.last_exit = None;
                error!(
                    "OpMode supervisor panicked: {}",
                    panic_message(payload.as_ref())
                );
                Err(OpModeError::OpModeUnavailable)
            },
        };

        // shared（闸门、令牌、错误槽）在此随 task 一起丢弃
        drop(shared);
        result
    }

    /// 让出轮询线程，然后检查错误槽
    fn poll_health(&self) -> Result<(), OpModeError> {
        let pause = self.config.poll_yield();
        if pause.is_zero() {
            thread::yield_now();
        } else {
            spin_sleep::sleep(pause);
        }

        if let Some(task) = &self.task
            && let Some(failure) = task.shared.failure.load_full()
        {
            trace!("re-raising captured OpMode failure: {}", failure);
            return Err(OpModeError::TaskFailed(failure));
        }
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// 启动闸门是否已打开
    pub fn is_started(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| task.shared.gate.is_open())
    }

    /// 任务线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// 当前运行中被捕获的失败
    pub fn captured_failure(&self) -> Option<Arc<TaskFailure>> {
        self.task
            .as_ref()
            .and_then(|task| task.shared.failure.load_full())
    }

    /// 上一次运行的结束方式（`stop` 之后可用，下一次 `init` 时清空）
    pub fn last_exit(&self) -> Option<&TaskExit> {
        self.last_exit.as_ref()
    }

    /// 空闲时访问 OpMode；运行期间返回 `None`
    pub fn op_mode(&self) -> Option<&M> {
        self.op_mode.as_ref()
    }

    pub fn op_mode_mut(&mut self) -> Option<&mut M> {
        self.op_mode.as_mut()
    }

    /// 停止（如在运行）并取回 OpMode
    pub fn into_op_mode(mut self) -> Option<M> {
        if let Err(e) = self.stop() {
            error!("Failed to stop OpMode before releasing it: {}", e);
        }
        self.op_mode.take()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }
}

impl<M: OpMode> Drop for OpModeLifecycle<M> {
    fn drop(&mut self) {
        if self.state.is_active()
            && let Err(e) = self.stop()
        {
            error!("Failed to stop OpMode on drop: {}", e);
        }
    }
}
