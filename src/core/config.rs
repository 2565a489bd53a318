use serde::{Deserialize, Serialize};

use crate::{DEFAULT_RING_SIZE, ENFORCE_KERNEL_VERSION_ENV, NO_NATIVE_ENV, RING_SIZE_ENV};

/// Switches read once before the io_uring probe runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Force the native transport off
    pub no_native: bool,
    /// Treat a kernel older than the minimum as unavailable instead of only logging it
    pub enforce_kernel_version: bool,
    /// Number of entries of the transient probe ring
    pub ring_size: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            no_native: false,
            enforce_kernel_version: true,
            ring_size: DEFAULT_RING_SIZE,
        }
    }
}

impl ProbeConfig {
    /// 从进程环境变量读取配置
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取配置，未知或无效的值回退到默认值
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            no_native: read_bool(&lookup, NO_NATIVE_ENV, defaults.no_native),
            enforce_kernel_version: read_bool(
                &lookup,
                ENFORCE_KERNEL_VERSION_ENV,
                defaults.enforce_kernel_version,
            ),
            ring_size: read_ring_size(&lookup, defaults.ring_size),
        };

        tracing::debug!("io_uring probe configuration: {:?}", config);
        config
    }
}

fn read_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().to_lowercase().as_str() {
        // 仅设置变量而不赋值视为开启
        "" | "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        other => {
            tracing::warn!(
                "Unable to parse the boolean {}={:?}, using the default value: {}",
                key,
                other,
                default
            );
            default
        }
    }
}

fn read_ring_size<F>(lookup: &F, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(RING_SIZE_ENV) else {
        return default;
    };

    match raw.trim().parse::<u32>() {
        Ok(size) if size > 0 => size,
        _ => {
            tracing::warn!(
                "Invalid ring size {}={:?}, using the default value: {}",
                RING_SIZE_ENV,
                raw,
                default
            );
            default
        }
    }
}
