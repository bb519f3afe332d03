//! 外部协作者接口
//!
//! 生命周期只需要宿主的两个能力：请求停止当前 OpMode、在任务结束时刷新遥测。
//! 硬件读写与遥测内容模型不在本库范围内。

/// 宿主控制接口
///
/// 由任务线程调用，实现必须是线程安全且非阻塞的
/// （通常只是设置一个标志，由宿主在下一次轮询后调用 `stop`）。
pub trait HostControl: Send + Sync {
    /// 请求宿主停止当前 OpMode
    fn request_op_mode_stop(&self);
}

/// 遥测输出
pub trait TelemetrySink: Send + Sync {
    /// 若有未发送的内容则刷新
    ///
    /// 每次运行在任务结束前调用一次，无论例程成功、失败还是被取消。
    /// 必须是幂等的。
    fn flush_if_dirty(&self);
}

/// 空遥测（默认）
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn flush_if_dirty(&self) {}
}
