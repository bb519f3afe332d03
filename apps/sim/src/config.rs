//! 模拟器配置
//!
//! 从可选的 TOML 文件加载，命令行参数覆盖文件中的值。
//!
//! ```toml
//! rate_hz = 50
//! start_after_ms = 200
//! run_for_ms = 3000
//!
//! [lifecycle]
//! thread_name = "sim-opmode"
//! poll_yield_us = 100
//! ```

use anyhow::{Context, Result, bail};
use linear_opmode::LifecycleConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 轮询频率上限（Hz）
const MAX_RATE_HZ: u32 = 1_000;

/// 模拟器配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// 宿主轮询频率（Hz）
    pub rate_hz: u32,

    /// `init` 之后多久按下 start（毫秒）
    pub start_after_ms: u64,

    /// start 之后最长运行时间（毫秒），超时由宿主 stop
    pub run_for_ms: u64,

    /// 生命周期配置
    pub lifecycle: LifecycleConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50,
            start_after_ms: 200,
            run_for_ms: 3_000,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl SimConfig {
    /// 加载配置文件
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.rate_hz == 0 || self.rate_hz > MAX_RATE_HZ {
            bail!("Invalid rate_hz: {} (must be 1..={})", self.rate_hz, MAX_RATE_HZ);
        }
        self.lifecycle.validate()?;
        Ok(())
    }

    /// 轮询周期
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(1) as f64)
    }

    pub fn start_after(&self) -> Duration {
        Duration::from_millis(self.start_after_ms)
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_millis(self.run_for_ms)
    }
}
