//! 任务监督逻辑
//!
//! 在任务线程上运行用户例程，并对结果分类：
//! - 正常完成 → 请求宿主停止
//! - 取消 → 作为 `TaskExit::Cancelled` 传出，不记录为错误
//! - 其他错误 / panic → 写入被捕获错误槽，任务正常结束
//!
//! 无论结果如何，后台子任务全部 join 之后才刷新遥测并结束任务。

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::cancel::{CancelOrigin, CancelReason, CancelToken, Cancelled};
use crate::context::OpModeContext;
use crate::error::{RunError, RunResult, TaskFailure, panic_message};
use crate::gate::StartGate;
use crate::host::HostControl;
use crate::lifecycle::OpMode;

/// 任务线程与轮询线程共享的单次运行状态
///
/// 每次 `init` 新建，`stop` join 之后整体丢弃。
pub(crate) struct RunShared {
    pub(crate) gate: StartGate,
    pub(crate) cancel: CancelToken,
    /// 被捕获错误槽（第一个失败生效）
    pub(crate) failure: ArcSwapOption<TaskFailure>,
    /// 后台子任务句柄；`None` 表示子任务已全部 join，不再接受新的子任务
    pub(crate) children: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl RunShared {
    pub(crate) fn new() -> Self {
        Self {
            gate: StartGate::new(),
            cancel: CancelToken::new(),
            failure: ArcSwapOption::empty(),
            children: Mutex::new(Some(Vec::new())),
        }
    }

    /// 记录失败并取消本次运行，返回槽中最终保存的失败
    pub(crate) fn fail(&self, failure: TaskFailure) -> Arc<TaskFailure> {
        let failure = Arc::new(failure);
        let empty: Option<Arc<TaskFailure>> = None;
        let previous = self.failure.compare_and_swap(&empty, Some(failure.clone()));

        self.cancel
            .cancel(CancelReason::failure("OpMode run failed"));

        match &*previous {
            Some(first) => first.clone(),
            None => failure,
        }
    }
}

/// 一次运行的结束方式
#[derive(Debug, Clone)]
pub enum TaskExit {
    /// 例程正常返回
    Completed,
    /// 例程被取消
    Cancelled(Cancelled),
    /// 例程或后台子任务失败
    Failed(Arc<TaskFailure>),
}

pub(crate) struct TaskOutcome<M> {
    pub(crate) op_mode: M,
    pub(crate) exit: TaskExit,
}

/// 单个例程（主例程或子任务）的结果
pub(crate) enum Settled {
    Completed,
    Cancelled(Cancelled),
    Failed(Arc<TaskFailure>),
}

/// 对例程结果分类，失败会写入错误槽
pub(crate) fn settle(shared: &RunShared, who: &str, outcome: thread::Result<RunResult>) -> Settled {
    match outcome {
        Ok(Ok(())) => {
            debug!("{} returned", who);
            Settled::Completed
        },
        Ok(Err(RunError::Cancelled(cancelled))) => {
            debug!("{} cancelled: {}", who, cancelled.reason());
            Settled::Cancelled(cancelled)
        },
        Ok(Err(RunError::Failed(err))) => {
            error!("{} failed: {}", who, err);
            Settled::Failed(shared.fail(TaskFailure::Error(err)))
        },
        Err(payload) => {
            let failure = TaskFailure::from_panic(payload);
            error!("{} panicked: {}", who, failure);
            Settled::Failed(shared.fail(failure))
        },
    }
}

/// 任务线程入口
pub(crate) fn supervise<M: OpMode>(
    mut op_mode: M,
    ctx: OpModeContext,
    host: &dyn HostControl,
    notify_host_on_external_cancel: bool,
) -> TaskOutcome<M> {
    let name = op_mode.name().to_string();
    let shared = ctx.shared().clone();
    info!("OpMode `{}` task started", name);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| op_mode.run(&ctx)));
    let main = settle(&shared, &name, outcome);

    // 主例程被取消时，子任务随之取消（用户自行构造的 Cancelled 也算）
    if let Settled::Cancelled(cancelled) = &main
        && !shared.cancel.is_cancelled()
    {
        shared.cancel.cancel(cancelled.reason().clone());
    }

    join_children(&shared);

    let exit = match (main, shared.failure.load_full()) {
        (Settled::Failed(failure), _) | (_, Some(failure)) => TaskExit::Failed(failure),
        (Settled::Completed, None) => {
            info!("OpMode `{}` completed, requesting host stop", name);
            notify_host(host);
            TaskExit::Completed
        },
        (Settled::Cancelled(cancelled), None) => {
            let notify = match cancelled.origin() {
                CancelOrigin::Host => notify_host_on_external_cancel,
                CancelOrigin::User | CancelOrigin::Failure => true,
            };
            if notify {
                notify_host(host);
            }
            info!("OpMode `{}` cancelled ({})", name, cancelled.reason());
            TaskExit::Cancelled(cancelled)
        },
    };

    let telemetry = ctx.telemetry_handle();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| telemetry.flush_if_dirty())) {
        warn!(
            "Telemetry flush panicked during OpMode teardown: {}",
            panic_message(payload.as_ref())
        );
    }

    TaskOutcome { op_mode, exit }
}

/// 请求宿主停止；宿主实现 panic 时只记录日志
fn notify_host(host: &dyn HostControl) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| host.request_op_mode_stop())) {
        warn!(
            "Host stop request panicked during OpMode teardown: {}",
            panic_message(payload.as_ref())
        );
    }
}

/// join 所有后台子任务（包括子任务在运行中新派生的）
///
/// 列表为空时关闭，之后 `spawn_background` 被拒绝。
fn join_children(shared: &RunShared) {
    loop {
        let next = {
            let mut children = shared.children.lock();
            let next = children.as_mut().and_then(Vec::pop);
            if next.is_none() {
                *children = None;
            }
            next
        };
        let Some(handle) = next else {
            break;
        };
        if let Err(payload) = handle.join() {
            error!(
                "Background task wrapper panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_wins() {
        let shared = RunShared::new();

        let first = shared.fail(TaskFailure::Panic {
            message: "first".to_string(),
        });
        let second = shared.fail(TaskFailure::Panic {
            message: "second".to_string(),
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&shared.failure.load_full().unwrap(), &first));
        assert_eq!(
            shared.cancel.reason().unwrap().origin(),
            CancelOrigin::Failure
        );
    }

    #[test]
    fn test_join_children_closes_list() {
        let shared = RunShared::new();
        let handle = thread::spawn(|| {});
        shared.children.lock().as_mut().unwrap().push(handle);

        join_children(&shared);
        assert!(shared.children.lock().is_none());

        // 再次调用不阻塞
        join_children(&shared);
    }

    #[test]
    fn test_notify_host_swallows_panic() {
        struct Exploding;
        impl HostControl for Exploding {
            fn request_op_mode_stop(&self) {
                panic!("host gone");
            }
        }

        notify_host(&Exploding);
    }

    #[test]
    fn test_settle_classifies_outcomes() {
        let shared = RunShared::new();

        assert!(matches!(settle(&shared, "t", Ok(Ok(()))), Settled::Completed));
        assert!(shared.failure.load().is_none());

        let cancelled = Cancelled::new(CancelReason::host("stop"));
        assert!(matches!(
            settle(&shared, "t", Ok(Err(RunError::Cancelled(cancelled)))),
            Settled::Cancelled(_)
        ));
        assert!(shared.failure.load().is_none());
        assert!(!shared.cancel.is_cancelled());

        assert!(matches!(
            settle(&shared, "t", Ok(Err(RunError::msg("boom")))),
            Settled::Failed(_)
        ));
        assert!(shared.failure.load().is_some());
        assert!(shared.cancel.is_cancelled());
    }
}
