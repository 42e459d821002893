use crate::error::{AgentError, Result};
use anyhow::anyhow;
use std::env;
use std::time::Duration;

pub const DEBUG_VAR: &str = "AUTOGENTS_DEBUG";

/// 环境变量配置管理
pub struct EnvConfig;

impl EnvConfig {
    /// 从环境变量获取值
    pub fn get_env(key: &str) -> Result<String> {
        env::var(key).map_err(|_| AgentError::Other(anyhow!("environment variable `{}` is not set", key)))
    }

    /// 获取可选的环境变量
    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    /// 检查是否启用调试模式
    pub fn is_debug_mode() -> bool {
        env::var(DEBUG_VAR).is_ok()
    }

    /// Reads a duration in milliseconds; unset means `None`, garbage is an
    /// error.
    pub fn get_duration_ms(key: &str) -> Result<Option<Duration>> {
        let Some(raw) = Self::get_env_optional(key) else {
            return Ok(None);
        };
        let millis: u64 = raw.trim().parse().map_err(|_| {
            AgentError::Other(anyhow!(
                "environment variable `{}` must be a number of milliseconds, got `{}`",
                key,
                raw
            ))
        })?;
        Ok(Some(Duration::from_millis(millis)))
    }
}
