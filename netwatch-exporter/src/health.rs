use crate::collector::CycleSummary;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Serialize)]
pub struct ExporterHealth {
    pub uptime_seconds: u64,
    pub cycles_completed: u64,
    pub cycle_overruns: u64,
    pub memory_usage_mb: Option<f32>,
    pub last_cycle: Option<CycleSummary>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    cycles_completed: Arc<AtomicU64>,
    cycle_overruns: Arc<AtomicU64>,
    last_cycle: Arc<Mutex<Option<CycleSummary>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles_completed: Arc::new(AtomicU64::new(0)),
            cycle_overruns: Arc::new(AtomicU64::new(0)),
            last_cycle: Arc::new(Mutex::new(None)),
        }
    }

    /// Record a finished cycle; returns true when it ran longer than `interval`
    pub fn record_cycle(&self, summary: &CycleSummary, interval: Duration) -> bool {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.lock() = Some(summary.clone());

        let overran = summary.duration() > interval;
        if overran {
            self.cycle_overruns.fetch_add(1, Ordering::Relaxed);
        }
        overran
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn get_health(&self) -> ExporterHealth {
        ExporterHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            cycles_completed: self.cycles_completed(),
            cycle_overruns: self.cycle_overruns.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
            last_cycle: self.last_cycle.lock().clone(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> Option<f32> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let kb = status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())?;
        Some(kb as f32 / 1024.0) // KB -> MB
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
