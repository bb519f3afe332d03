//! Mock 宿主与遥测
//!
//! 记录停止请求与遥测刷新次数，供集成测试断言。

#![allow(dead_code)]

use linear_opmode::{HostControl, OpMode, OpModeError, OpModeLifecycle, TelemetrySink};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// 记录 `request_op_mode_stop` 调用次数的宿主
#[derive(Default)]
pub struct MockHost {
    stop_requests: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::Acquire)
    }
}

impl HostControl for MockHost {
    fn request_op_mode_stop(&self) {
        self.stop_requests.fetch_add(1, Ordering::AcqRel);
    }
}

/// 记录刷新次数的遥测
#[derive(Default)]
pub struct MockTelemetry {
    flushes: AtomicUsize,
}

impl MockTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }
}

impl TelemetrySink for MockTelemetry {
    fn flush_if_dirty(&self) {
        self.flushes.fetch_add(1, Ordering::AcqRel);
    }
}

/// 以宿主的方式反复调用 `loop`，直到宿主收到停止请求、回调返回错误或超时
///
/// 返回 `loop` 的最后一次结果。
pub fn poll_loop_until_stop<M: OpMode>(
    lifecycle: &mut OpModeLifecycle<M>,
    host: &MockHost,
    timeout: Duration,
) -> Result<(), OpModeError> {
    let deadline = Instant::now() + timeout;
    loop {
        lifecycle.r#loop()?;
        if host.stop_requests() > 0 {
            return Ok(());
        }
        assert!(
            Instant::now() < deadline,
            "host stop was not requested within {:?}",
            timeout
        );
        thread::sleep(Duration::from_millis(2));
    }
}

/// 等待条件成立
pub fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
