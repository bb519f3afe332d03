//! 一次性广播闩锁
//!
//! `StartGate` 与 `CancelToken` 共用的底层原语：唯一的 `Sender` 被 drop 时，
//! 所有克隆出的 `Receiver` 同时观察到 `Disconnected`，无需维护等待者队列。

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub(crate) struct Latch {
    fired: AtomicBool,
    trigger: Mutex<Option<Sender<Infallible>>>,
    signal: Receiver<Infallible>,
}

impl Latch {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            fired: AtomicBool::new(false),
            trigger: Mutex::new(Some(tx)),
            signal: rx,
        }
    }

    /// 触发闩锁，仅第一次调用返回 `true`
    ///
    /// `fired` 先于 drop `Sender` 写入，被唤醒的等待者一定能读到 `true`。
    pub(crate) fn fire(&self) -> bool {
        self.fire_with(|| {})
    }

    /// 在触发者持有 `trigger` 锁的情况下执行 `before_fire`，再触发
    ///
    /// 用于先写入附加数据（如取消原因）再唤醒等待者。
    pub(crate) fn fire_with(&self, before_fire: impl FnOnce()) -> bool {
        let mut trigger = self.trigger.lock();
        match trigger.take() {
            Some(tx) => {
                before_fire();
                self.fired.store(true, Ordering::Release);
                drop(tx);
                true
            },
            None => false,
        }
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// 触发时断开连接的接收端（用于 `select!` / `recv_timeout`）
    pub(crate) fn signal(&self) -> &Receiver<Infallible> {
        &self.signal
    }
}
