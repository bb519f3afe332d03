//! # Linear OpMode - 线性 OpMode 生命周期适配层
//!
//! 宿主框架以轮询回调（`init` / `init_loop` / `start` / `loop` / `stop`）驱动用户代码，
//! 本库把这套轮询协议桥接为**一个**长时间运行、可挂起、可取消的任务，
//! 用户只需编写一段线性的 `run` 例程。
//!
//! ## 模块
//!
//! - `gate` - 一次性启动闸门（StartGate）
//! - `cancel` - 协作式取消令牌
//! - `state` - 生命周期状态机（显式转移表）
//! - `lifecycle` - 宿主回调 → 任务生命周期（启动、取消、join、错误回抛）
//! - `task` - 任务线程上的监督逻辑（结果分类、子任务 join、遥测刷新）
//! - `context` - 用户例程可用的挂起点（等待开始、让出、睡眠）
//! - `host` - 外部协作者（宿主停止请求、遥测刷新）
//! - `config` - 生命周期配置
//! - `error` - 错误类型
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use linear_opmode::{HostControl, OpModeContext, OpModeLifecycle, RunResult};
//! use std::sync::Arc;
//!
//! struct Host;
//! impl HostControl for Host {
//!     fn request_op_mode_stop(&self) {}
//! }
//!
//! fn drive_square(ctx: &OpModeContext) -> RunResult {
//!     ctx.wait_for_start()?;
//!     for _ in 0..4 {
//!         ctx.sleep_ms(500)?;
//!     }
//!     Ok(())
//! }
//!
//! # fn main() -> Result<(), linear_opmode::OpModeError> {
//! let mut lifecycle = OpModeLifecycle::new(drive_square, Arc::new(Host));
//! lifecycle.init()?;
//! lifecycle.init_loop()?;
//! lifecycle.start()?;
//! lifecycle.r#loop()?;
//! lifecycle.stop()?;
//! # Ok(())
//! # }
//! ```

mod latch;

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod host;
pub mod lifecycle;
pub mod state;
mod task;

pub use cancel::{CancelOrigin, CancelReason, CancelToken, Cancelled};
pub use config::LifecycleConfig;
pub use context::OpModeContext;
pub use error::{OpModeError, RunError, RunResult, TaskFailure};
pub use gate::StartGate;
pub use host::{HostControl, NoopTelemetry, TelemetrySink};
pub use lifecycle::{OpMode, OpModeLifecycle};
pub use state::{HostCallback, LifecycleState};
pub use task::TaskExit;
