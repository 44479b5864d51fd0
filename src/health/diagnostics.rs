//! Process-level diagnostics for the deep health view.

use serde::Serialize;
use sysinfo::{Pid, System};

/// Snapshot of process and runtime resource usage.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessDiagnostics {
    pub pid: u32,
    /// Resident set size in bytes.
    pub memory_rss_bytes: Option<u64>,
    pub virtual_memory_bytes: Option<u64>,
    pub system_total_memory_bytes: u64,
    pub available_parallelism: Option<usize>,
    pub runtime: Option<RuntimeDiagnostics>,
}

/// Tokio runtime counters.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeDiagnostics {
    pub worker_threads: usize,
    pub alive_tasks: usize,
}

impl RuntimeDiagnostics {
    /// Counters of the runtime the caller runs on, if any.
    pub fn current() -> Option<Self> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let metrics = handle.metrics();
        Some(Self {
            worker_threads: metrics.num_workers(),
            alive_tasks: metrics.num_alive_tasks(),
        })
    }
}

/// Read memory figures for the current process. Blocking: reads procfs.
pub fn collect_process() -> ProcessDiagnostics {
    let pid = std::process::id();
    let sys_pid = Pid::from_u32(pid);

    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_process(sys_pid);

    let (memory_rss_bytes, virtual_memory_bytes) = match sys.process(sys_pid) {
        Some(process) => (Some(process.memory()), Some(process.virtual_memory())),
        None => (None, None),
    };

    ProcessDiagnostics {
        pid,
        memory_rss_bytes,
        virtual_memory_bytes,
        system_total_memory_bytes: sys.total_memory(),
        available_parallelism: std::thread::available_parallelism().ok().map(|n| n.get()),
        runtime: None,
    }
}

/// Collect process and runtime diagnostics without blocking the runtime.
pub async fn collect() -> ProcessDiagnostics {
    let runtime = RuntimeDiagnostics::current();
    let mut diagnostics = match tokio::task::spawn_blocking(collect_process).await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "Diagnostics collection failed");
            ProcessDiagnostics {
                pid: std::process::id(),
                memory_rss_bytes: None,
                virtual_memory_bytes: None,
                system_total_memory_bytes: 0,
                available_parallelism: None,
                runtime: None,
            }
        }
    };
    diagnostics.runtime = runtime;
    diagnostics
}
