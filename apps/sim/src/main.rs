//! # Linear OpMode Simulator
//!
//! 模拟宿主框架的轮询线程，驱动一个演示 OpMode 走完整个生命周期。
//!
//! ```bash
//! # 正常完成
//! linear-opmode-sim --scenario drive
//!
//! # 任务失败（退出码非零）
//! RUST_LOG=linear_opmode=debug linear-opmode-sim --scenario fail
//!
//! # 从配置文件加载
//! linear-opmode-sim --config sim.toml --rate-hz 100
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use linear_opmode::OpModeLifecycle;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

mod config;
mod host;
mod scenarios;

use config::SimConfig;
use host::{SimHost, SimTelemetry, run_session};
use scenarios::{DemoOpMode, Scenario};

/// Linear OpMode 模拟器
#[derive(Parser, Debug)]
#[command(name = "linear-opmode-sim")]
#[command(about = "Drive a demo OpMode through a simulated host polling loop", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML 配置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 演示场景
    #[arg(short, long, value_enum, default_value_t = Scenario::Drive)]
    scenario: Scenario,

    /// 轮询频率（Hz）
    #[arg(long)]
    rate_hz: Option<u32>,

    /// init 之后多久按下 start（毫秒）
    #[arg(long)]
    start_after_ms: Option<u64>,

    /// start 之后最长运行时间（毫秒）
    #[arg(long)]
    run_for_ms: Option<u64>,
}

impl Cli {
    fn sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };

        if let Some(rate_hz) = self.rate_hz {
            config.rate_hz = rate_hz;
        }
        if let Some(start_after_ms) = self.start_after_ms {
            config.start_after_ms = start_after_ms;
        }
        if let Some(run_for_ms) = self.run_for_ms {
            config.run_for_ms = run_for_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<ExitCode> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linear_opmode=info,linear_opmode_sim=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.sim_config()?;

    // Ctrl-C 只设置标志，由轮询线程调用 stop
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_flag = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_flag.store(true, Ordering::Release);
    })
    .context("设置 Ctrl-C 处理失败")?;

    let host = Arc::new(SimHost::default());
    let telemetry = Arc::new(SimTelemetry::default());
    let mut lifecycle = OpModeLifecycle::new(DemoOpMode::new(cli.scenario), host.clone())
        .with_telemetry(telemetry.clone())
        .with_config(config.lifecycle.clone());

    info!(
        "Running {:?} at {} Hz (start after {} ms, run for {} ms)",
        cli.scenario, config.rate_hz, config.start_after_ms, config.run_for_ms
    );

    let report = run_session(&mut lifecycle, &host, &config, &interrupted)?;
    let legs = lifecycle.op_mode().map(DemoOpMode::legs_driven).unwrap_or(0);

    info!(
        "Session ended: {:?} (started: {}), {} polls, {} legs driven, {} telemetry flushes",
        report.cause,
        report.started,
        report.polls,
        legs,
        telemetry.flushes()
    );
    if let Some(exit) = &report.exit {
        info!("Task exit: {:?}", exit);
    }

    if !report.is_success() {
        error!(
            "❌ OpMode failed: {}",
            report.failure.as_deref().unwrap_or("unknown failure")
        );
        return Ok(ExitCode::FAILURE);
    }

    info!("✅ OpMode finished");
    Ok(ExitCode::SUCCESS)
}
