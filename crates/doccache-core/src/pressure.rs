//! Host memory sampling and pressure classification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Byte counts from one memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total bytes.
    pub total: u64,
    pub used: u64,
    /// Bytes still free.
    pub available: u64,
}

impl MemoryInfo {
    /// Build a sample from `total` and `used`, clamping `used` to `total`.
    #[must_use]
    pub fn new(total: u64, used: u64) -> Self {
        let used = used.min(total);
        Self {
            total,
            used,
            available: total - used,
        }
    }
}

/// Coarse memory pressure, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressureLevel {
    #[default]
    Normal,
    Warning,
    Urgent,
    Critical,
}

impl fmt::Display for MemoryPressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        })
    }
}

/// Breakpoints in percent. A ratio exactly on a breakpoint stays at the lower
/// level.
const WARNING_ABOVE_PERCENT: u128 = 70;
const URGENT_ABOVE_PERCENT: u128 = 80;
const CRITICAL_ABOVE_PERCENT: u128 = 90;

/// Classify a sample. Exact integer arithmetic, so boundaries are stable.
///
/// ```rust
/// use doccache_core::{MemoryInfo, MemoryPressureLevel, classify};
///
/// assert_eq!(classify(MemoryInfo::new(100, 70)), MemoryPressureLevel::Normal);
/// assert_eq!(classify(MemoryInfo::new(1_000_000, 700_001)), MemoryPressureLevel::Warning);
/// assert_eq!(classify(MemoryInfo::new(100, 95)), MemoryPressureLevel::Critical);
/// ```
#[must_use]
pub fn classify(info: MemoryInfo) -> MemoryPressureLevel {
    if info.total == 0 {
        return MemoryPressureLevel::Normal;
    }
    let used = u128::from(info.used.min(info.total)) * 100;
    let total = u128::from(info.total);

    if used <= total * WARNING_ABOVE_PERCENT {
        MemoryPressureLevel::Normal
    } else if used <= total * URGENT_ABOVE_PERCENT {
        MemoryPressureLevel::Warning
    } else if used <= total * CRITICAL_ABOVE_PERCENT {
        MemoryPressureLevel::Urgent
    } else {
        MemoryPressureLevel::Critical
    }
}

/// Source of memory samples.
pub trait MemorySampler: Send + Sync {
    /// Take a sample.
    fn sample(&self) -> MemoryInfo;

    /// Classify a fresh sample.
    fn pressure(&self) -> MemoryPressureLevel {
        classify(self.sample())
    }
}

/// What "used" means for [`SystemMemorySampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerScope {
    /// Host-wide used memory.
    #[default]
    System,
    /// Resident memory of this process against host total.
    Process,
}

/// Samples the host through `sysinfo`.
pub struct SystemMemorySampler {
    system: Mutex<System>,
    scope: SamplerScope,
    pid: u32,
}

impl fmt::Debug for SystemMemorySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemMemorySampler")
            .field("scope", &self.scope)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Default for SystemMemorySampler {
    fn default() -> Self {
        Self::new(SamplerScope::default())
    }
}

impl SystemMemorySampler {
    /// Sampler for `scope`.
    #[must_use]
    pub fn new(scope: SamplerScope) -> Self {
        Self {
            system: Mutex::new(System::new()),
            scope,
            pid: std::process::id(),
        }
    }
}

impl MemorySampler for SystemMemorySampler {
    fn sample(&self) -> MemoryInfo {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        match self.scope {
            SamplerScope::System => {
                system.refresh_memory();
                MemoryInfo::new(system.total_memory(), system.used_memory())
            },
            SamplerScope::Process => {
                system.refresh_all();
                let used = system
                    .process(sysinfo::Pid::from(self.pid as usize))
                    .map_or(0, sysinfo::Process::memory);
                MemoryInfo::new(system.total_memory(), used)
            },
        }
    }
}

/// Fixed-total sampler whose usage can be changed at runtime. Clones share
/// the same reading.
#[derive(Debug, Clone)]
pub struct StaticMemorySampler {
    total: u64,
    used: Arc<AtomicU64>,
}

impl StaticMemorySampler {
    /// Fixed sample of `used` out of `total` bytes.
    #[must_use]
    pub fn new(total: u64, used: u64) -> Self {
        Self {
            total,
            used: Arc::new(AtomicU64::new(used)),
        }
    }

    /// Sampler reporting `percent` of a 1 GiB host as used.
    #[must_use]
    pub fn at_percent(percent: u64) -> Self {
        let total = 1 << 30;
        Self::new(total, total / 100 * percent)
    }

    /// Change the used byte count.
    pub fn set_used(&self, used: u64) {
        self.used.store(used, Ordering::Relaxed);
    }

    /// Set usage to `percent` of total.
    pub fn set_percent(&self, percent: u64) {
        self.set_used(self.total / 100 * percent);
    }
}

impl MemorySampler for StaticMemorySampler {
    fn sample(&self) -> MemoryInfo {
        MemoryInfo::new(self.total, self.used.load(Ordering::Relaxed))
    }
}
