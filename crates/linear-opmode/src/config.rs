//! 生命周期配置

use std::time::Duration;

use crate::error::OpModeError;

/// 轮询线程单次让出的上限（微秒）
///
/// 宿主的轮询线程只允许被短暂阻塞。
pub const MAX_POLL_YIELD_US: u64 = 10_000;

/// 生命周期配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LifecycleConfig {
    /// 任务线程名称
    pub thread_name: String,

    /// `init_loop` / `loop` 中让出轮询线程的时长（微秒）
    ///
    /// `0` 表示仅调用 `thread::yield_now()`。
    pub poll_yield_us: u64,

    /// `stop` 等待任务结束超过此时长（毫秒）时记录一次警告
    ///
    /// join 本身不会超时放弃。
    pub join_warn_after_ms: u64,

    /// 宿主 `stop` 引起的取消是否也回调 `HostControl::request_op_mode_stop`
    ///
    /// 用户主动停止总会请求宿主停止。
    pub notify_host_on_external_cancel: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            thread_name: "opmode-task".to_string(),
            poll_yield_us: 0,
            join_warn_after_ms: 500,
            notify_host_on_external_cancel: true,
        }
    }
}

impl LifecycleConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), OpModeError> {
        if self.thread_name.trim().is_empty() {
            return Err(OpModeError::Config(
                "thread_name must not be empty".to_string(),
            ));
        }
        if self.poll_yield_us > MAX_POLL_YIELD_US {
            return Err(OpModeError::Config(format!(
                "Invalid poll_yield_us: {} (must be <= {})",
                self.poll_yield_us, MAX_POLL_YIELD_US
            )));
        }
        Ok(())
    }

    pub fn poll_yield(&self) -> Duration {
        Duration::from_micros(self.poll_yield_us)
    }

    pub fn join_warn_after(&self) -> Duration {
        Duration::from_millis(self.join_warn_after_ms)
    }
}
