// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Configuration
//
// Typed parameter blocks for every component. Each block carries its own
// defaults so a partial JSON document only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::error::{NexusError, Result};
use crate::types::MarketPhase;

/// One year; idle expiry beyond this is meaningless.
pub(crate) const MAX_NODE_TTL_MINUTES: i64 = 525_600;
/// One day between resource checks.
pub(crate) const MAX_RESOURCE_CHECK_INTERVAL_SECS: i64 = 86_400;

// ─── Field Dynamics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldConfig {
    /// Dimension D of the order-parameter space.
    pub dimension: usize,
    pub mu_squared: f64,
    pub lambda: f64,
    /// Volatility to temperature scale factor.
    pub temperature_scale: f64,
    pub critical_volatility: f64,
    /// Half-width of the critical band around T/Tc = 1.
    pub critical_band: f64,
    /// |φ|/v below which a hot field is SYMMETRIC.
    pub symmetric_threshold: f64,
    /// |φ|/v above which a cold field is BROKEN_*.
    pub vacuum_threshold: f64,
    /// Number of recent magnitudes inspected for chaotic swings.
    pub chaos_window: usize,
    pub history_size: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            dimension: 8,
            mu_squared: 1.0,
            lambda: 0.25,
            temperature_scale: 100.0,
            critical_volatility: 0.20,
            critical_band: 0.15,
            symmetric_threshold: 0.3,
            vacuum_threshold: 0.7,
            chaos_window: 10,
            history_size: 100,
        }
    }
}

// ─── Phase Detector ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhaseConfig {
    pub lookback_window: usize,
    /// Ticks a phase must be held before a change is committed.
    pub min_stability_window: u32,
    pub first_order_threshold: f64,
    /// Multiplier on the field's critical band.
    pub sensitivity: f64,
    pub chaos_override: f64,
    pub butterfly_critical: f64,
    pub prediction_threshold: f64,
    pub history_size: usize,
    pub tick_interval_hours: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            lookback_window: 20,
            min_stability_window: 3,
            first_order_threshold: 0.7,
            sensitivity: 1.0,
            chaos_override: 3.0,
            butterfly_critical: 0.8,
            prediction_threshold: 0.2,
            history_size: 100,
            tick_interval_hours: 1.0,
        }
    }
}

impl PhaseConfig {
    /// Trend histories hold twice the lookback window.
    pub fn trend_capacity(&self) -> usize {
        self.lookback_window * 2
    }
}

// ─── Swarm Coordinator ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    /// Baseline active population; phase scaling targets are relative to it.
    pub initial_nodes: usize,
    pub min_active_nodes: usize,
    pub max_active_nodes: usize,
    pub max_total_nodes: usize,
    pub cpu_ceiling_percent: f64,
    pub ram_ceiling_gb: f64,
    pub hibernation_threshold: f64,
    pub wake_threshold: f64,
    pub node_ttl_minutes: i64,
    pub resource_check_interval_secs: i64,
    pub consensus_threshold: f64,
    pub min_votes_for_decision: usize,
    pub scale_up_step: usize,
    pub scale_down_step: usize,
    pub wake_batch: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            initial_nodes: 20,
            min_active_nodes: 5,
            max_active_nodes: 100,
            max_total_nodes: 200,
            cpu_ceiling_percent: 80.0,
            ram_ceiling_gb: 4.0,
            hibernation_threshold: 0.9,
            wake_threshold: 0.6,
            node_ttl_minutes: 30,
            resource_check_interval_secs: 5,
            consensus_threshold: 0.6,
            min_votes_for_decision: 3,
            scale_up_step: 20,
            scale_down_step: 10,
            wake_batch: 5,
        }
    }
}

// ─── Signal Arbiter ─────────────────────────────────────────────────────────

/// Base (echo, singularity) weights for one phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PhaseWeights {
    pub echo: f64,
    pub singularity: f64,
}

impl PhaseWeights {
    pub const fn new(echo: f64, singularity: f64) -> Self {
        Self { echo, singularity }
    }

    /// Rescale so the pair sums to one. Degenerate rows fall back to 50/50.
    pub fn normalized(&self) -> Self {
        let e = if self.echo.is_finite() { self.echo.max(0.0) } else { 0.0 };
        let s = if self.singularity.is_finite() { self.singularity.max(0.0) } else { 0.0 };
        let total = e + s;
        if total <= f64::EPSILON {
            Self::new(0.5, 0.5)
        } else {
            Self::new(e / total, s / total)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeightTable {
    pub symmetric: PhaseWeights,
    pub transition: PhaseWeights,
    pub broken: PhaseWeights,
    pub critical: PhaseWeights,
    pub chaotic: PhaseWeights,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            symmetric: PhaseWeights::new(0.45, 0.55),
            transition: PhaseWeights::new(0.6, 0.4),
            broken: PhaseWeights::new(0.4, 0.6),
            critical: PhaseWeights::new(0.7, 0.3),
            chaotic: PhaseWeights::new(0.75, 0.25),
        }
    }
}

impl WeightTable {
    pub fn for_phase(&self, phase: MarketPhase) -> PhaseWeights {
        let raw = match phase {
            MarketPhase::Symmetric => self.symmetric,
            MarketPhase::Transition => self.transition,
            MarketPhase::BrokenBullish | MarketPhase::BrokenBearish => self.broken,
            MarketPhase::Critical => self.critical,
            MarketPhase::Chaotic => self.chaotic,
        };
        raw.normalized()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArbiterConfig {
    pub weights: WeightTable,
    /// Share of the confidence-ratio pair in the final weights.
    pub confidence_blend: f64,
    pub swarm_weight: f64,
    pub veto_threshold: f64,
    pub strong_signal_threshold: f64,
    pub weak_signal_threshold: f64,
    pub authority_gap: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            weights: WeightTable::default(),
            confidence_blend: 0.3,
            swarm_weight: 0.2,
            veto_threshold: 0.8,
            strong_signal_threshold: 0.6,
            weak_signal_threshold: 0.2,
            authority_gap: 0.15,
            min_confidence: 0.1,
            max_confidence: 0.95,
        }
    }
}

// ─── Top-level ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NexusConfig {
    pub field: FieldConfig,
    pub phase: PhaseConfig,
    pub swarm: SwarmConfig,
    pub arbiter: ArbiterConfig,
    /// Insight history capacity (FIFO).
    pub history_size: usize,
    /// Seed for node and insight identifiers.
    pub seed: u64,
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            field: FieldConfig::default(),
            phase: PhaseConfig::default(),
            swarm: SwarmConfig::default(),
            arbiter: ArbiterConfig::default(),
            history_size: 100,
            seed: 0x4e58_5553,
        }
    }
}

impl NexusConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| NexusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let f = &self.field;
        if f.dimension == 0 {
            return Err(NexusError::Config("field.dimension must be at least 1".into()));
        }
        if !(f.mu_squared > 0.0) || !(f.lambda > 0.0) {
            return Err(NexusError::Config("field.mu_squared and field.lambda must be positive".into()));
        }
        if !(f.temperature_scale > 0.0) || !(f.critical_volatility > 0.0) {
            return Err(NexusError::Config(
                "field.temperature_scale and field.critical_volatility must be positive".into(),
            ));
        }
        if f.history_size == 0 || f.chaos_window == 0 {
            return Err(NexusError::Config("field windows must be non-empty".into()));
        }

        let p = &self.phase;
        if p.lookback_window == 0 || p.history_size == 0 {
            return Err(NexusError::Config("phase windows must be non-empty".into()));
        }
        if !(p.sensitivity > 0.0) {
            return Err(NexusError::Config("phase.sensitivity must be positive".into()));
        }

        let s = &self.swarm;
        if s.min_active_nodes > s.max_active_nodes {
            return Err(NexusError::Config(format!(
                "swarm.min_active_nodes ({}) exceeds swarm.max_active_nodes ({})",
                s.min_active_nodes, s.max_active_nodes
            )));
        }
        if s.max_active_nodes > s.max_total_nodes {
            return Err(NexusError::Config(format!(
                "swarm.max_active_nodes ({}) exceeds swarm.max_total_nodes ({})",
                s.max_active_nodes, s.max_total_nodes
            )));
        }
        if !(1..=MAX_NODE_TTL_MINUTES).contains(&s.node_ttl_minutes) {
            return Err(NexusError::Config(format!(
                "swarm.node_ttl_minutes must lie in [1, {}], got {}",
                MAX_NODE_TTL_MINUTES, s.node_ttl_minutes
            )));
        }
        if !(1..=MAX_RESOURCE_CHECK_INTERVAL_SECS).contains(&s.resource_check_interval_secs) {
            return Err(NexusError::Config(format!(
                "swarm.resource_check_interval_secs must lie in [1, {}], got {}",
                MAX_RESOURCE_CHECK_INTERVAL_SECS, s.resource_check_interval_secs
            )));
        }
        if s.wake_threshold > s.hibernation_threshold {
            return Err(NexusError::Config(
                "swarm.wake_threshold must not exceed swarm.hibernation_threshold".into(),
            ));
        }

        let a = &self.arbiter;
        if a.min_confidence > a.max_confidence {
            return Err(NexusError::Config("arbiter.min_confidence exceeds arbiter.max_confidence".into()));
        }
        if a.weak_signal_threshold >= a.strong_signal_threshold {
            return Err(NexusError::Config(
                "arbiter.weak_signal_threshold must be below arbiter.strong_signal_threshold".into(),
            ));
        }
        if !(0.0..=1.0).contains(&a.confidence_blend) || !(0.0..=1.0).contains(&a.swarm_weight) {
            return Err(NexusError::Config(
                "arbiter.confidence_blend and arbiter.swarm_weight must lie in [0, 1]".into(),
            ));
        }
        for phase in MarketPhase::ALL {
            let raw = match phase {
                MarketPhase::Symmetric => a.weights.symmetric,
                MarketPhase::Transition => a.weights.transition,
                MarketPhase::BrokenBullish | MarketPhase::BrokenBearish => a.weights.broken,
                MarketPhase::Critical => a.weights.critical,
                MarketPhase::Chaotic => a.weights.chaotic,
            };
            if !(raw.echo + raw.singularity > 0.0) || raw.echo < 0.0 || raw.singularity < 0.0 {
                return Err(NexusError::Config(format!(
                    "arbiter weight row for {} must be non-negative with a positive sum",
                    phase
                )));
            }
        }
        Ok(())
    }
}
