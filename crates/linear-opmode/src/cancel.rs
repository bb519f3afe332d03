//! 协作式取消令牌
//!
//! 取消不会抢占纯计算，只在挂起点（等待开始、让出、睡眠）生效。
//! 令牌只能触发一次，第一次写入的取消原因生效。

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::latch::Latch;

/// 取消来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOrigin {
    /// 宿主调用 `stop`
    Host,
    /// 用户例程主动请求停止（`OpModeContext::request_op_mode_stop`）
    User,
    /// 同一次运行中的例程或后台子任务失败
    Failure,
}

impl fmt::Display for CancelOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CancelOrigin::Host => "host",
            CancelOrigin::User => "user",
            CancelOrigin::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// 取消原因（来源 + 描述）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    origin: CancelOrigin,
    message: Cow<'static, str>,
}

impl CancelReason {
    pub fn new(origin: CancelOrigin, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }

    pub fn host(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(CancelOrigin::Host, message)
    }

    pub fn user(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(CancelOrigin::User, message)
    }

    pub fn failure(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(CancelOrigin::Failure, message)
    }

    pub fn origin(&self) -> CancelOrigin {
        self.origin
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.message)
    }
}

/// 取消信号
///
/// 运行被取消时挂起点返回的"错误"。它是正常的停止路径，
/// 永远不会写入被捕获错误槽。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("OpMode cancelled ({reason})")]
pub struct Cancelled {
    reason: CancelReason,
}

impl Cancelled {
    pub fn new(reason: CancelReason) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> &CancelReason {
        &self.reason
    }

    pub fn origin(&self) -> CancelOrigin {
        self.reason.origin
    }
}

#[derive(Debug)]
struct Inner {
    latch: Latch,
    reason: OnceLock<CancelReason>,
}

/// 协作式取消令牌（可克隆，克隆共享同一状态）
///
/// # 示例
///
/// ```rust
/// use linear_opmode::{CancelReason, CancelToken};
/// use std::time::Duration;
///
/// let token = CancelToken::new();
/// assert!(token.sleep(Duration::from_millis(1)).is_ok());
///
/// token.cancel(CancelReason::host("stop pressed"));
/// assert!(token.sleep(Duration::from_secs(60)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                latch: Latch::new(),
                reason: OnceLock::new(),
            }),
        }
    }

    /// 请求取消
    ///
    /// 返回 `true` 表示本次调用触发了取消；已取消时原因不会被覆盖。
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.inner.latch.fire_with(|| {
            let _ = self.inner.reason.set(reason);
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.latch.is_fired()
    }

    pub fn reason(&self) -> Option<&CancelReason> {
        self.inner.reason.get()
    }

    /// 已取消时返回 `Err(Cancelled)`
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(self.cancelled())
        } else {
            Ok(())
        }
    }

    /// 可取消的定时睡眠
    ///
    /// 令牌触发时立即返回 `Err(Cancelled)`，否则睡满 `duration` 后返回 `Ok(())`。
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.check()?;
        match self.inner.latch.signal().recv_timeout(duration) {
            Ok(never) => match never {},
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => Err(self.cancelled()),
        }
    }

    pub(crate) fn signal(&self) -> &Receiver<Infallible> {
        self.inner.latch.signal()
    }

    pub(crate) fn cancelled(&self) -> Cancelled {
        // 原因先于 fired 标志写入
        let reason = self
            .reason()
            .cloned()
            .unwrap_or_else(|| CancelReason::host("cancelled"));
        Cancelled::new(reason)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
