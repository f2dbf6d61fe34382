//! Process-level resource sampling.

use std::sync::Mutex;
use sysinfo::{Pid, System};
use tracing::debug;

/// Memory figures for the current process, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryUsage {
    /// Resident set size
    pub rss: u64,
    /// Memory currently in use by the process
    pub heap_used: u64,
    /// Memory budget the process is measured against
    pub heap_total: u64,
    /// Mapped but non-resident memory
    pub external: u64,
}

impl MemoryUsage {
    /// `heap_used / heap_total`, or 0 when the total is unknown
    pub fn heap_ratio(&self) -> f64 {
        if self.heap_total == 0 {
            0.0
        } else {
            self.heap_used as f64 / self.heap_total as f64
        }
    }
}

/// Cumulative CPU time of the current process, in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuUsage {
    pub user: u64,
    pub system: u64,
}

/// Source of process resource figures
pub trait ProcessSampler: Send + Sync {
    fn memory(&self) -> MemoryUsage;
    fn cpu(&self) -> CpuUsage;
}

/// Samples the running process through the operating system.
///
/// `heap_total` is the configured memory limit, or total system memory when
/// no limit is set.
pub struct SystemSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
    memory_limit: Option<u64>,
}

impl SystemSampler {
    /// Create a sampler for the current process
    pub fn new(memory_limit: Option<u64>) -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            debug!("Current pid unavailable, memory samples will be zero");
        }

        Self {
            system: Mutex::new(System::new()),
            pid,
            memory_limit,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProcessSampler for SystemSampler {
    fn memory(&self) -> MemoryUsage {
        let Ok(mut system) = self.system.lock() else {
            return MemoryUsage::default();
        };

        let heap_total = match self.memory_limit {
            Some(limit) => limit,
            None => {
                system.refresh_memory();
                system.total_memory()
            }
        };

        let Some(pid) = self.pid else {
            return MemoryUsage {
                heap_total,
                ..MemoryUsage::default()
            };
        };

        let _ = system.refresh_process(pid);
        match system.process(pid) {
            Some(process) => {
                let rss = process.memory();
                let virtual_memory = process.virtual_memory();
                MemoryUsage {
                    rss,
                    heap_used: rss,
                    heap_total,
                    external: virtual_memory.saturating_sub(rss),
                }
            }
            None => MemoryUsage {
                heap_total,
                ..MemoryUsage::default()
            },
        }
    }

    fn cpu(&self) -> CpuUsage {
        rusage_self()
    }
}

#[cfg(unix)]
fn rusage_self() -> CpuUsage {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the provided struct.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return CpuUsage::default();
    }
    // SAFETY: zero-initialised and filled by a successful getrusage call.
    let usage = unsafe { usage.assume_init() };

    let micros = |tv: libc::timeval| (tv.tv_sec.max(0) as u64) * 1_000_000 + tv.tv_usec.max(0) as u64;
    CpuUsage {
        user: micros(usage.ru_utime),
        system: micros(usage.ru_stime),
    }
}

#[cfg(not(unix))]
fn rusage_self() -> CpuUsage {
    CpuUsage::default()
}
