// Per-Tick JSONL Time Series Recorder
// One JSON line per tick for offline analysis

use nexus_engine::{MarketPhase, NexusInsight, RiskLevel, TradingAction};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub sentiment: f64,
    pub volatility: f64,
    pub cpu_percent: f64,
    pub phase: MarketPhase,
    pub raw_phase: MarketPhase,
    pub phase_changed: bool,
    pub stability_score: f64,
    pub order_parameter: f64,
    pub temperature: f64,
    pub susceptibility: f64,
    pub symmetry_breaking: bool,
    pub action: TradingAction,
    pub strength: f64,
    pub confidence: f64,
    pub phase_adjusted: bool,
    pub swarm_opinion: f64,
    pub swarm_confidence: f64,
    pub active_nodes: usize,
    pub hibernating_nodes: usize,
    pub risk_level: RiskLevel,
}

impl TickSnapshot {
    pub fn from_insight(tick: u64, sentiment: f64, volatility: f64, insight: &NexusInsight) -> Self {
        let field = &insight.phase_state.field_state;
        Self {
            tick,
            sentiment,
            volatility,
            cpu_percent: insight.swarm.cpu_percent,
            phase: insight.phase_state.current_phase,
            raw_phase: field.phase,
            phase_changed: insight.phase_state.changed,
            stability_score: insight.phase_state.stability_score,
            order_parameter: field.order_parameter,
            temperature: field.temperature,
            susceptibility: field.susceptibility,
            symmetry_breaking: insight.symmetry_breaking.is_some(),
            action: insight.signal.action,
            strength: insight.signal.strength,
            confidence: insight.signal.confidence,
            phase_adjusted: insight.signal.phase_adjusted,
            swarm_opinion: insight.collective.opinion,
            swarm_confidence: insight.collective.collective_confidence,
            active_nodes: insight.swarm.active_nodes,
            hibernating_nodes: insight.swarm.hibernating_nodes,
            risk_level: insight.risk_level,
        }
    }
}

/// Time series recorder that accumulates snapshots and writes JSONL
pub struct TimeSeriesRecorder {
    snapshots: Vec<TickSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self { snapshots: Vec::new() }
    }

    pub fn record(&mut self, snapshot: TickSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Write all snapshots to a JSONL file
    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
