//! 演示 OpMode
//!
//! 每个场景覆盖生命周期的一条退出路径。

use clap::ValueEnum;
use linear_opmode::{OpMode, OpModeContext, RunResult};
use std::hint::black_box;
use tracing::info;

/// 单条边的行驶时间（毫秒）
const LEG_MS: u64 = 100;

/// 演示场景
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// 走一个正方形后正常结束
    Drive,
    /// 行驶中电机堵转，返回错误
    Fail,
    /// 读取空的传感器缓冲区，panic
    Panic,
    /// 等待片刻后主动请求停止
    Quit,
}

#[derive(Debug, thiserror::Error)]
#[error("drive motor stalled on leg {leg}")]
pub struct MotorStalled {
    pub leg: u32,
}

/// 演示 OpMode
#[derive(Debug)]
pub struct DemoOpMode {
    scenario: Scenario,
    /// 累计完成的边数（跨运行保留）
    legs_driven: u32,
}

impl DemoOpMode {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            legs_driven: 0,
        }
    }

    pub fn legs_driven(&self) -> u32 {
        self.legs_driven
    }

    fn drive_leg(&mut self, ctx: &OpModeContext, leg: u32) -> RunResult {
        info!("Driving leg {}", leg);
        ctx.sleep_ms(LEG_MS)?;
        self.legs_driven += 1;
        Ok(())
    }
}

impl OpMode for DemoOpMode {
    fn run(&mut self, ctx: &OpModeContext) -> RunResult {
        ctx.wait_for_start()?;

        match self.scenario {
            Scenario::Drive => {
                for leg in 1..=4 {
                    self.drive_leg(ctx, leg)?;
                }
                info!("Square complete");
                Ok(())
            },
            Scenario::Fail => {
                self.drive_leg(ctx, 1)?;
                Err(MotorStalled { leg: 2 }.into())
            },
            Scenario::Panic => {
                let readings: Vec<u64> = Vec::new();
                let latest = readings[black_box(0)];
                ctx.sleep_ms(latest)?;
                Ok(())
            },
            Scenario::Quit => {
                ctx.sleep_ms(LEG_MS)?;
                Err(ctx.request_op_mode_stop("operator quit").into())
            },
        }
    }

    fn name(&self) -> &str {
        match self.scenario {
            Scenario::Drive => "demo-drive",
            Scenario::Fail => "demo-fail",
            Scenario::Panic => "demo-panic",
            Scenario::Quit => "demo-quit",
        }
    }
}
