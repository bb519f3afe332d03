//! 启动闸门（StartGate）
//!
//! 宿主按下 "start" 时打开，之后永不关闭。任意数量的等待者阻塞到打开为止，
//! 打开之后才来的等待者立即返回。

use crossbeam_channel::select;
use std::time::Duration;

use crate::cancel::{CancelToken, Cancelled};
use crate::latch::Latch;

/// 一次性启动闸门
///
/// # 线程安全
///
/// `open()` / `wait()` / `is_open()` 均可从多个线程并发调用。
/// `open()` 返回之前对闸门的写入，对被释放的等待者可见。
///
/// # 示例
///
/// ```rust
/// use linear_opmode::{CancelToken, StartGate};
///
/// let gate = StartGate::new();
/// let token = CancelToken::new();
///
/// assert!(gate.open());
/// assert!(!gate.open()); // 幂等
/// assert!(gate.wait(&token).is_ok()); // 已打开，立即返回
/// ```
#[derive(Debug)]
pub struct StartGate {
    latch: Latch,
}

impl StartGate {
    pub fn new() -> Self {
        Self {
            latch: Latch::new(),
        }
    }

    /// 打开闸门，释放所有当前和未来的等待者
    ///
    /// 只有真正打开闸门的那次调用返回 `true`。
    pub fn open(&self) -> bool {
        self.latch.fire()
    }

    /// 非阻塞读取闸门状态
    pub fn is_open(&self) -> bool {
        self.latch.is_fired()
    }

    /// 阻塞直到闸门打开
    ///
    /// # 错误
    ///
    /// 等待期间 `cancel` 被触发时返回 `Err(Cancelled)`。
    pub fn wait(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        if self.is_open() {
            return Ok(());
        }
        cancel.check()?;

        select! {
            recv(self.latch.signal()) -> _ => Ok(()),
            recv(cancel.signal()) -> _ => Err(cancel.cancelled()),
        }
    }

    /// 带超时的等待
    ///
    /// - `Ok(true)`: 闸门已打开
    /// - `Ok(false)`: 超时，闸门仍关闭
    /// - `Err(Cancelled)`: 等待期间被取消
    pub fn wait_timeout(&self, cancel: &CancelToken, timeout: Duration) -> Result<bool, Cancelled> {
        if self.is_open() {
            return Ok(true);
        }
        cancel.check()?;

        select! {
            recv(self.latch.signal()) -> _ => Ok(true),
            recv(cancel.signal()) -> _ => Err(cancel.cancelled()),
            default(timeout) => Ok(self.is_open()),
        }
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}
