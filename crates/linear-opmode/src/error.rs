//! 错误类型定义
//!
//! - `OpModeError`: 宿主回调返回的错误（状态错误、回抛的任务失败等）
//! - `RunError`: 用户例程返回的错误（取消信号或任意用户错误）
//! - `TaskFailure`: 被捕获错误槽中保存的任务失败

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use crate::cancel::Cancelled;
use crate::state::{HostCallback, LifecycleState};

/// 宿主回调错误
#[derive(Debug, thiserror::Error)]
pub enum OpModeError {
    /// 回调在错误的生命周期状态下被调用（如上一次运行尚未 stop 就再次 init）
    #[error("Invalid lifecycle state: cannot handle `{callback}` while {state}")]
    InvalidState {
        callback: HostCallback,
        state: LifecycleState,
    },

    /// 用户任务失败，在下一次 `init_loop` / `loop` 中回抛
    ///
    /// 每次回抛的都是同一个 `Arc`，保留原始错误的身份与内容。
    #[error("OpMode task failed: {0}")]
    TaskFailed(#[source] Arc<TaskFailure>),

    /// OpMode 实例已丢失（任务监督逻辑自身 panic）
    #[error("OpMode instance unavailable (lost after a supervisor panic)")]
    OpModeUnavailable,

    /// 任务线程创建失败
    #[error("Failed to spawn OpMode thread: {0}")]
    Spawn(#[source] io::Error),

    /// 配置无效
    #[error("Invalid lifecycle config: {0}")]
    Config(String),

    /// 运行已被取消（仅 `spawn_background` 返回）
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl OpModeError {
    /// 若为回抛的任务失败，返回被捕获的失败
    pub fn task_failure(&self) -> Option<&Arc<TaskFailure>> {
        match self {
            OpModeError::TaskFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// 被捕获的任务失败
#[derive(Debug, thiserror::Error)]
pub enum TaskFailure {
    /// 例程返回了非取消错误
    #[error("run routine failed: {0}")]
    Error(#[source] Box<dyn StdError + Send + Sync>),

    /// 例程 panic
    #[error("run routine panicked: {message}")]
    Panic { message: String },
}

impl TaskFailure {
    /// 按具体类型取回原始错误
    ///
    /// # 示例
    ///
    /// ```rust
    /// use linear_opmode::TaskFailure;
    /// use std::io;
    ///
    /// let failure = TaskFailure::Error(Box::new(io::Error::other("bus off")));
    /// assert!(failure.downcast_ref::<io::Error>().is_some());
    /// ```
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            TaskFailure::Error(err) => err.downcast_ref::<E>(),
            TaskFailure::Panic { .. } => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskFailure::Panic { .. })
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        TaskFailure::Panic {
            message: panic_message(payload.as_ref()),
        }
    }
}

/// 提取 panic 载荷中的消息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// 用户例程的返回类型
pub type RunResult = Result<(), RunError>;

/// 用户例程错误
///
/// 任何 `std::error::Error + Send + Sync + 'static` 都可以通过 `?` 转换为 `RunError`；
/// 其中 [`Cancelled`] 被识别为取消信号，其余视为失败。
///
/// ⚠️ `RunError` 本身不实现 `std::error::Error`（与 `anyhow::Error` 相同），
/// 否则通用 `From` 实现会与标准库的 `From<T> for T` 冲突。
#[derive(Debug)]
pub enum RunError {
    /// 取消信号（正常停止路径）
    Cancelled(Cancelled),
    /// 例程失败
    Failed(Box<dyn StdError + Send + Sync>),
}

impl RunError {
    /// 用一条消息构造失败
    pub fn msg(message: impl Into<String>) -> Self {
        RunError::Failed(Box::new(MessageError(message.into())))
    }

    /// 从已装箱的错误构造
    ///
    /// `Cancelled` 与 `OpModeError::Cancelled` 都被识别为取消信号。
    pub fn from_boxed(err: Box<dyn StdError + Send + Sync>) -> Self {
        let err = match err.downcast::<Cancelled>() {
            Ok(cancelled) => return RunError::Cancelled(*cancelled),
            Err(other) => other,
        };
        match err.downcast::<OpModeError>() {
            Ok(op_mode_err) => match *op_mode_err {
                OpModeError::Cancelled(cancelled) => RunError::Cancelled(cancelled),
                other => RunError::Failed(Box::new(other)),
            },
            Err(other) => RunError::Failed(other),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled(_))
    }
}

impl<E> From<E> for RunError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        RunError::from_boxed(Box::new(err))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Cancelled(cancelled) => write!(f, "{}", cancelled),
            RunError::Failed(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for MessageError {}
