//! 生命周期状态机
//!
//! 宿主的每个轮询回调对应一次显式状态转移，不依赖对象字段的隐式修改顺序。
//!
//! ```text
//! Uninitialized ──init──▶ Initialized ──start──▶ Started
//!       ▲                      │                    │
//!       │                      └──────stop──────────┤
//!       │                                           ▼
//!    (new run) ◀──init── Stopped ◀──(joined)── Stopping
//! ```

use std::fmt;

use crate::error::OpModeError;

/// 宿主轮询回调
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCallback {
    Init,
    InitLoop,
    Start,
    Loop,
    Stop,
}

impl fmt::Display for HostCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostCallback::Init => "init",
            HostCallback::InitLoop => "init_loop",
            HostCallback::Start => "start",
            HostCallback::Loop => "loop",
            HostCallback::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// 从未初始化
    #[default]
    Uninitialized,
    /// 任务运行中，闸门关闭
    Initialized,
    /// 任务运行中，闸门已打开
    Started,
    /// 已请求取消，正在 join 任务
    Stopping,
    /// 任务已结束并复位，可以开始下一次运行
    Stopped,
}

impl LifecycleState {
    /// 计算回调 `callback` 触发的下一个状态
    ///
    /// `Stop` 只给出中间态 `Stopping`（任务在运行时），join 完成后由调用方
    /// 调用 [`LifecycleState::finish_stop`]。
    ///
    /// # 错误
    ///
    /// 非法转移返回 `OpModeError::InvalidState`。
    pub fn on(self, callback: HostCallback) -> Result<LifecycleState, OpModeError> {
        use HostCallback::*;
        use LifecycleState::*;

        let next = match (self, callback) {
            (Uninitialized | Stopped, Init) => Initialized,

            (Initialized | Started, InitLoop) => self,

            (Initialized, Start) => Started,
            (Started, Start) => Started,

            (Started, Loop) => Started,

            (Initialized | Started, Stop) => Stopping,
            (Uninitialized | Stopped, Stop) => self,

            _ => {
                return Err(OpModeError::InvalidState {
                    callback,
                    state: self,
                });
            },
        };

        Ok(next)
    }

    /// `Stopping` 在任务 join 完成后的去向
    pub fn finish_stop(self) -> Result<LifecycleState, OpModeError> {
        match self {
            LifecycleState::Stopping => Ok(LifecycleState::Stopped),
            state => Err(OpModeError::InvalidState {
                callback: HostCallback::Stop,
                state,
            }),
        }
    }

    /// 任务是否应处于运行中（`Drop` 据此决定是否 stop）
    pub(crate) fn is_active(self) -> bool {
        matches!(self, LifecycleState::Initialized | LifecycleState::Started)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Started => "started",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HostCallback::*;
    use LifecycleState::*;

    #[test]
    fn test_happy_path() {
        let state = Uninitialized.on(Init).unwrap();
        assert_eq!(state, Initialized);
        assert_eq!(state.on(InitLoop).unwrap(), Initialized);

        let state = state.on(Start).unwrap();
        assert_eq!(state, Started);
        assert_eq!(state.on(Loop).unwrap(), Started);

        let state = state.on(Stop).unwrap();
        assert_eq!(state, Stopping);
        assert_eq!(state.finish_stop().unwrap(), Stopped);
    }

    #[test]
    fn test_start_is_idempotent() {
        assert_eq!(Started.on(Start).unwrap(), Started);
    }

    #[test]
    fn test_stop_without_start() {
        assert_eq!(Initialized.on(Stop).unwrap(), Stopping);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        assert_eq!(Uninitialized.on(Stop).unwrap(), Uninitialized);
        assert_eq!(Stopped.on(Stop).unwrap(), Stopped);
    }

    #[test]
    fn test_new_run_after_stop() {
        assert_eq!(Stopped.on(Init).unwrap(), Initialized);
    }

    #[test]
    fn test_invalid_transitions() {
        let invalid = [
            (Initialized, Init),
            (Started, Init),
            (Stopping, Init),
            (Uninitialized, Start),
            (Stopped, Start),
            (Uninitialized, Loop),
            (Initialized, Loop),
            (Uninitialized, InitLoop),
            (Stopping, Stop),
        ];

        for (state, callback) in invalid {
            match state.on(callback) {
                Err(OpModeError::InvalidState {
                    callback: c,
                    state: s,
                }) => {
                    assert_eq!(c, callback);
                    assert_eq!(s, state);
                },
                other => panic!("{state} --{callback}--> expected InvalidState, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_finish_stop_requires_stopping() {
        assert!(Started.finish_stop().is_err());
    }

    #[test]
    fn test_default() {
        let state: LifecycleState = Default::default();
        assert_eq!(state, Uninitialized);
        assert!(!state.is_active());
    }

    #[test]
    fn test_is_active() {
        assert!(Initialized.is_active());
        assert!(Started.is_active());
        assert!(!Stopping.is_active());
        assert!(!Stopped.is_active());
    }
}
