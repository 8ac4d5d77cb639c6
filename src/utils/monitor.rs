use std::sync::Mutex;
use std::time::{Duration, Instant};

#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[derive(Debug, Clone)]
pub struct PhaseStats {
    pub phase: String,
    pub phase_time: Duration,
    pub elapsed_time: Duration,
    pub memory_usage_mb: Option<u64>,
}

/// 每個 ETL 階段的耗時與記憶體
pub struct RunMonitor {
    enabled: bool,
    start_time: Instant,
    last_mark: Mutex<Instant>,
    peak_memory_mb: Mutex<u64>,
    #[cfg(feature = "cli")]
    system: Option<(Mutex<System>, Pid)>,
}

impl RunMonitor {
    pub fn new(enabled: bool) -> Self {
        #[cfg(feature = "cli")]
        let system = if enabled {
            match sysinfo::get_current_pid() {
                Ok(pid) => Some((
                    Mutex::new(System::new_with_specifics(RefreshKind::everything())),
                    pid,
                )),
                Err(e) => {
                    tracing::warn!("Memory stats unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let now = Instant::now();
        Self {
            enabled,
            start_time: now,
            last_mark: Mutex::new(now),
            peak_memory_mb: Mutex::new(0),
            #[cfg(feature = "cli")]
            system,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(feature = "cli")]
    fn memory_mb(&self) -> Option<u64> {
        let (system, pid) = self.system.as_ref()?;
        let mut system = system.lock().ok()?;
        system.refresh_all();
        let process = system.process(*pid)?;
        Some(process.memory() / 1024 / 1024)
    }

    #[cfg(not(feature = "cli"))]
    fn memory_mb(&self) -> Option<u64> {
        None
    }

    /// Closes the current phase and returns its stats; `None` when disabled.
    pub fn mark(&self, phase: &str) -> Option<PhaseStats> {
        if !self.enabled {
            return None;
        }

        let now = Instant::now();
        let phase_time = {
            let mut last = self.last_mark.lock().ok()?;
            let took = now.duration_since(*last);
            *last = now;
            took
        };

        let memory_usage_mb = self.memory_mb();
        if let Some(mb) = memory_usage_mb {
            if let Ok(mut peak) = self.peak_memory_mb.lock() {
                *peak = (*peak).max(mb);
            }
        }

        Some(PhaseStats {
            phase: phase.to_string(),
            phase_time,
            elapsed_time: now.duration_since(self.start_time),
            memory_usage_mb,
        })
    }

    pub fn log_phase(&self, phase: &str) {
        if let Some(stats) = self.mark(phase) {
            match stats.memory_usage_mb {
                Some(mb) => tracing::info!(
                    "📊 {} - took {:?}, Memory: {}MB, Total: {:?}",
                    stats.phase,
                    stats.phase_time,
                    mb,
                    stats.elapsed_time
                ),
                None => tracing::info!(
                    "📊 {} - took {:?}, Total: {:?}",
                    stats.phase,
                    stats.phase_time,
                    stats.elapsed_time
                ),
            }
        }
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        let peak = self.peak_memory_mb.lock().map(|p| *p).unwrap_or(0);
        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
            self.start_time.elapsed(),
            peak
        );
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
