// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Resource Probes
//
// CPU/RAM readings behind a small trait so the scaling loop can be driven
// by injected values in tests and on targets without procfs.

use serde::{Deserialize, Serialize};

use crate::error::{NexusError, Result};

const KB_PER_GB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub ram_gb: f64,
}

pub trait ResourceMonitor: Send {
    fn sample(&mut self) -> Result<ResourceSample>;
}

// ─── Fixed readings ─────────────────────────────────────────────────────────

/// Returns whatever reading it was last given. A cleared reading makes the
/// probe fail, which exercises the skip-cycle path.
#[derive(Debug, Clone, Default)]
pub struct FixedResourceMonitor {
    reading: Option<ResourceSample>,
}

impl FixedResourceMonitor {
    pub fn new(cpu_percent: f64, ram_gb: f64) -> Self {
        Self { reading: Some(ResourceSample { cpu_percent, ram_gb }) }
    }

    pub fn failing() -> Self {
        Self { reading: None }
    }

    pub fn set(&mut self, cpu_percent: f64, ram_gb: f64) {
        self.reading = Some(ResourceSample { cpu_percent, ram_gb });
    }

    pub fn clear(&mut self) {
        self.reading = None;
    }
}

impl ResourceMonitor for FixedResourceMonitor {
    fn sample(&mut self) -> Result<ResourceSample> {
        self.reading
            .ok_or_else(|| NexusError::ResourceProbe("no reading configured".into()))
    }
}

/// Shares one reading between the coordinator and the test driving it.
#[derive(Debug, Clone, Default)]
pub struct SharedResourceMonitor {
    inner: std::sync::Arc<parking_lot::Mutex<FixedResourceMonitor>>,
}

impl SharedResourceMonitor {
    pub fn new(cpu_percent: f64, ram_gb: f64) -> Self {
        Self {
            inner: std::sync::Arc::new(parking_lot::Mutex::new(FixedResourceMonitor::new(cpu_percent, ram_gb))),
        }
    }

    pub fn set(&self, cpu_percent: f64, ram_gb: f64) {
        self.inner.lock().set(cpu_percent, ram_gb);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl ResourceMonitor for SharedResourceMonitor {
    fn sample(&mut self) -> Result<ResourceSample> {
        self.inner.lock().sample()
    }
}

// ─── procfs ─────────────────────────────────────────────────────────────────

/// System CPU from `/proc/stat` deltas and process RSS from the `VmRSS`
/// line of `/proc/self/status`, which the kernel reports in kB regardless
/// of page size.
#[derive(Debug, Clone, Default)]
pub struct ProcResourceMonitor {
    last_cpu: Option<CpuTimes>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

impl ProcResourceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(path: &str) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| NexusError::ResourceProbe(format!("{}: {}", path, e)))
    }
}

impl ResourceMonitor for ProcResourceMonitor {
    fn sample(&mut self) -> Result<ResourceSample> {
        let times = parse_cpu_line(&Self::read("/proc/stat")?)?;
        let cpu_percent = match self.last_cpu {
            Some(prev) if times.total > prev.total => {
                100.0 * times.busy.saturating_sub(prev.busy) as f64 / (times.total - prev.total) as f64
            }
            _ if times.total > 0 => 100.0 * times.busy as f64 / times.total as f64,
            _ => 0.0,
        };
        self.last_cpu = Some(times);

        let ram_gb = parse_vmrss_kb(&Self::read("/proc/self/status")?)? / KB_PER_GB;
        Ok(ResourceSample { cpu_percent: cpu_percent.clamp(0.0, 100.0), ram_gb })
    }
}

fn parse_cpu_line(stat: &str) -> Result<CpuTimes> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| NexusError::ResourceProbe("missing aggregate cpu line".into()))?;
    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NexusError::ResourceProbe(format!("cpu line: {}", e)))?;
    if fields.len() < 4 {
        return Err(NexusError::ResourceProbe("cpu line too short".into()));
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Ok(CpuTimes { busy: total.saturating_sub(idle), total })
}

fn parse_vmrss_kb(status: &str) -> Result<f64> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|f| f.parse::<u64>().ok())
        .map(|kb| kb as f64)
        .ok_or_else(|| NexusError::ResourceProbe("missing or malformed VmRSS line".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_line_parses_busy_and_total() {
        let t = parse_cpu_line("cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 1 2 3 4\n").unwrap();
        assert_eq!(t.total, 1000);
        assert_eq!(t.busy, 150);
    }

    #[test]
    fn malformed_inputs_are_probe_errors() {
        assert!(matches!(parse_cpu_line("intr 1 2 3"), Err(NexusError::ResourceProbe(_))));
        assert!(matches!(parse_vmrss_kb("Name:\tnexus\nVmSize:\t 1024 kB\n"), Err(NexusError::ResourceProbe(_))));
        assert!(matches!(parse_vmrss_kb("VmRSS:\t lots kB\n"), Err(NexusError::ResourceProbe(_))));
    }

    #[test]
    fn vmrss_is_read_in_kilobytes() {
        let status = "Name:\tnexus\nVmPeak:\t  9000 kB\nVmRSS:\t  2097152 kB\nThreads:\t4\n";
        let kb = parse_vmrss_kb(status).unwrap();
        assert_eq!(kb, 2097152.0);
        assert!((kb / KB_PER_GB - 2.0).abs() < 1e-12);
    }

    #[test]
    fn fixed_monitor_can_fail() {
        let mut m = FixedResourceMonitor::new(12.0, 0.5);
        assert_eq!(m.sample().unwrap().cpu_percent, 12.0);
        m.clear();
        assert!(m.sample().is_err());
    }

    #[test]
    fn shared_monitor_sees_updates() {
        let handle = SharedResourceMonitor::new(10.0, 1.0);
        let mut probe = handle.clone();
        handle.set(95.0, 1.0);
        assert_eq!(probe.sample().unwrap().cpu_percent, 95.0);
    }
}
