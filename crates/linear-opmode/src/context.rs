//! 用户例程上下文
//!
//! `OpModeContext` 是用户例程与生命周期之间的唯一接口，提供三个可取消的挂起点：
//!
//! | 挂起点 | 方法 |
//! |---|---|
//! | 等待开始 | [`OpModeContext::wait_for_start`] |
//! | 协作式让出 | [`OpModeContext::idle`] |
//! | 定时睡眠 | [`OpModeContext::sleep`] |
//!
//! 运行被取消时，挂起点返回 `Err(Cancelled)`。用 `?` 向上传播即可，
//! 例程自身的清理代码（如 `Drop`）会在任务结束前执行。

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cancel::{CancelReason, Cancelled};
use crate::error::{OpModeError, RunResult};
use crate::host::TelemetrySink;
use crate::task::{self, RunShared};

/// 用户例程上下文（可克隆，克隆共享同一次运行）
#[derive(Clone)]
pub struct OpModeContext {
    shared: Arc<RunShared>,
    telemetry: Arc<dyn TelemetrySink>,
    thread_name: Arc<str>,
}

impl OpModeContext {
    pub(crate) fn new(
        shared: Arc<RunShared>,
        telemetry: Arc<dyn TelemetrySink>,
        thread_name: &str,
    ) -> Self {
        Self {
            shared,
            telemetry,
            thread_name: Arc::from(thread_name),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<RunShared> {
        &self.shared
    }

    pub(crate) fn telemetry_handle(&self) -> Arc<dyn TelemetrySink> {
        self.telemetry.clone()
    }

    /// 阻塞直到宿主调用 `start`
    pub fn wait_for_start(&self) -> Result<(), Cancelled> {
        self.shared.gate.wait(&self.shared.cancel)
    }

    /// 带超时的等待开始，超时返回 `Ok(false)`
    pub fn wait_for_start_timeout(&self, timeout: Duration) -> Result<bool, Cancelled> {
        self.shared.gate.wait_timeout(&self.shared.cancel, timeout)
    }

    /// 协作式让出
    ///
    /// 长循环中每次迭代调用一次，使 `stop` 能及时生效。
    pub fn idle(&self) -> Result<(), Cancelled> {
        self.shared.cancel.check()?;
        thread::yield_now();
        self.shared.cancel.check()
    }

    /// 可取消的定时睡眠
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.shared.cancel.sleep(duration)
    }

    pub fn sleep_ms(&self, ms: u64) -> Result<(), Cancelled> {
        self.sleep(Duration::from_millis(ms))
    }

    pub fn is_started(&self) -> bool {
        self.shared.gate.is_open()
    }

    /// 本次运行是否已被要求结束（宿主 stop、用户停止或失败）
    pub fn is_stop_requested(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.shared.cancel.reason().cloned()
    }

    /// 用户主动结束本次运行
    ///
    /// 取消本次运行并返回取消信号，供例程直接传播：
    ///
    /// ```rust,ignore
    /// if battery_low {
    ///     return Err(ctx.request_op_mode_stop("battery low").into());
    /// }
    /// ```
    ///
    /// 任务结束后生命周期会请求宿主停止。已取消时返回已有的取消原因。
    pub fn request_op_mode_stop(&self, message: impl Into<String>) -> Cancelled {
        self.shared.cancel.cancel(CancelReason::user(message.into()));
        self.shared.cancel.cancelled()
    }

    /// 派生后台子任务
    ///
    /// 子任务与主例程共享闸门和取消令牌，在单独的线程上运行。
    /// 任务结束前会 join 所有子任务；子任务失败会被捕获并取消整个运行。
    ///
    /// # 错误
    ///
    /// - 运行已被取消或已结束：`OpModeError::Cancelled`
    /// - 线程创建失败：`OpModeError::Spawn`
    pub fn spawn_background<F>(&self, name: &str, routine: F) -> Result<(), OpModeError>
    where
        F: FnOnce(&OpModeContext) -> RunResult + Send + 'static,
    {
        self.shared.cancel.check()?;

        // 持锁直到句柄入列，与 join_children 的关闭互斥
        let mut children = self.shared.children.lock();
        let Some(handles) = children.as_mut() else {
            let reason = self
                .shared
                .cancel
                .reason()
                .cloned()
                .unwrap_or_else(|| CancelReason::host("OpMode run finished"));
            return Err(OpModeError::Cancelled(Cancelled::new(reason)));
        };

        let ctx = self.clone();
        let who = format!("background task `{}`", name);
        let handle = thread::Builder::new()
            .name(format!("{}/{}", self.thread_name, name))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| routine(&ctx)));
                task::settle(&ctx.shared, &who, outcome);
            })
            .map_err(OpModeError::Spawn)?;

        handles.push(handle);
        Ok(())
    }

    /// 本次运行使用的遥测
    pub fn telemetry(&self) -> &dyn TelemetrySink {
        self.telemetry.as_ref()
    }
}
