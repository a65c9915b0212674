//! 资源采样器：为自适应策略提供瞬时 CPU / 内存负载。
//!
//! Resource sampler.
//!
//! The adaptive strategy queries a [`ResourceSampler`] once per execution to
//! pick a concurrency tier. [`StaticSampler`] reports fixed values (tests,
//! environments without load data); [`SystemSampler`] reads the host through
//! `sysinfo` when the `system-metrics` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Instantaneous host load, both in percent (0-100).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl LoadSample {
    pub fn new(cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
        }
    }

    /// The larger of the two readings.
    pub fn peak(&self) -> f64 {
        self.cpu_percent.max(self.memory_percent)
    }
}

#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Must be non-blocking or near-instant.
    async fn sample(&self) -> LoadSample;
}

/// Sampler returning a settable, fixed reading.
#[derive(Debug, Default)]
pub struct StaticSampler {
    current: Mutex<LoadSample>,
}

impl StaticSampler {
    pub fn new(cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            current: Mutex::new(LoadSample::new(cpu_percent, memory_percent)),
        }
    }

    pub fn set(&self, sample: LoadSample) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = sample;
    }
}

#[async_trait]
impl ResourceSampler for StaticSampler {
    async fn sample(&self) -> LoadSample {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Host sampler backed by `sysinfo`.
#[cfg(feature = "system-metrics")]
pub struct SystemSampler {
    system: Mutex<sysinfo::System>,
}

#[cfg(feature = "system-metrics")]
impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new_all()),
        }
    }
}

#[cfg(feature = "system-metrics")]
impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "system-metrics")]
#[async_trait]
impl ResourceSampler for SystemSampler {
    async fn sample(&self) -> LoadSample {
        let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        let total = sys.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            sys.used_memory() as f64 / total as f64 * 100.0
        };
        LoadSample::new(sys.global_cpu_usage() as f64, memory_percent)
    }
}
