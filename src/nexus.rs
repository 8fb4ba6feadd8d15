// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Core Orchestrator
//
// One `analyze` call is one tick:
//
//   market data -> PhaseDetector (field + hysteresis)
//               -> callbacks on phase change / symmetry breaking
//               -> SwarmCoordinator (resource cycle, phase scaling, batch)
//               -> SignalArbiter
//               -> narrative, risk, history
//
// `Nexus` is the single writer. `SharedNexus` serialises concurrent callers
// behind one mutex so at most one tick is in flight.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use crate::arbiter::{ArbitratedSignal, SignalArbiter};
use crate::clock::{Clock, SystemClock};
use crate::config::NexusConfig;
use crate::error::{NexusError, Result};
use crate::field::SymmetryBreakingEvent;
use crate::narrative::{self, NarrativeInput};
use crate::phase::{PhaseDetector, PhaseState, PhaseTransition, UpstreamSignals};
use crate::stats::{self, push_and_trim};
use crate::swarm::{
    CollectiveOpinion, FixedResourceMonitor, ResourceCheck, ResourceMonitor, ScaleDecision, SwarmCoordinator,
    SwarmMetrics,
};
use crate::types::{
    EchoResults, EngineAuthority, HealthStatus, MarketData, MarketPhase, RiskLevel, SingularityResults, TradingAction,
};

/// Offset keeping insight ids on a different stream from node ids.
const INSIGHT_SEED_OFFSET: u64 = 0x1d5e_ed00;

// ─── Records ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseChangeEvent {
    pub timestamp: DateTime<Utc>,
    pub from_phase: MarketPhase,
    pub to_phase: MarketPhase,
    pub stability_score: f64,
    pub transition: Option<PhaseTransition>,
}

pub type PhaseChangeCallback = Box<dyn Fn(&PhaseChangeEvent) + Send + Sync>;
pub type SymmetryBreakingCallback = Box<dyn Fn(&SymmetryBreakingEvent) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NexusInsight {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub phase_state: PhaseState,
    pub symmetry_breaking: Option<SymmetryBreakingEvent>,
    pub signal: ArbitratedSignal,
    pub swarm: SwarmMetrics,
    pub collective: CollectiveOpinion,
    pub narrative: String,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub action_items: Vec<String>,
    pub watch_list: Vec<String>,
    pub technical: Value,
}

/// Signal block of the flat record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalBlock {
    pub action: TradingAction,
    pub confidence: f64,
    pub strength: f64,
    pub authority: EngineAuthority,
    pub phase_adjusted: bool,
    pub override_reasons: Vec<String>,
    pub swarm_consensus: f64,
    pub dissent_reasons: Vec<String>,
}

/// Flat, serialisable view of an insight for external consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightRecord {
    pub id: String,
    pub timestamp: String,
    pub phase: MarketPhase,
    pub phase_stability: f64,
    pub pending_transition: Option<MarketPhase>,
    pub transition_probability: Option<f64>,
    pub symmetry_breaking: bool,
    pub signal: SignalBlock,
    pub swarm: SwarmMetrics,
    pub recommendation: String,
    pub risk_level: RiskLevel,
    pub action_items: Vec<String>,
    pub watch_list: Vec<String>,
    pub narrative: String,
}

impl NexusInsight {
    pub fn to_record(&self) -> InsightRecord {
        let pending = self.phase_state.pending_transition.as_ref();
        InsightRecord {
            id: self.id.to_string(),
            timestamp: self.timestamp.to_rfc3339(),
            phase: self.phase_state.current_phase,
            phase_stability: self.phase_state.stability_score,
            pending_transition: pending.map(|t| t.to_phase),
            transition_probability: pending.map(|t| t.probability),
            symmetry_breaking: self.symmetry_breaking.is_some(),
            signal: SignalBlock {
                action: self.signal.action,
                confidence: self.signal.confidence,
                strength: self.signal.strength,
                authority: self.signal.authority,
                phase_adjusted: self.signal.phase_adjusted,
                override_reasons: self.signal.override_reasons.clone(),
                swarm_consensus: self.signal.swarm_consensus,
                dissent_reasons: self.signal.dissent_reasons.clone(),
            },
            swarm: self.swarm.clone(),
            recommendation: self.recommendation.clone(),
            risk_level: self.risk_level,
            action_items: self.action_items.clone(),
            watch_list: self.watch_list.clone(),
            narrative: self.narrative.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.to_record()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub uptime_secs: f64,
    pub cpu_percent: f64,
    pub ram_gb: f64,
    pub active_nodes: usize,
    pub hibernating_nodes: usize,
    pub insights_generated: u64,
    pub current_phase: MarketPhase,
    pub warnings: Vec<String>,
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Nexus {
    config: NexusConfig,
    detector: PhaseDetector,
    swarm: SwarmCoordinator,
    arbiter: SignalArbiter,
    history: VecDeque<NexusInsight>,
    phase_callbacks: Vec<PhaseChangeCallback>,
    symmetry_callbacks: Vec<SymmetryBreakingCallback>,
    clock: Box<dyn Clock>,
    rng: ChaCha8Rng,
    started_at: DateTime<Utc>,
    stopped: bool,
    insights_generated: u64,
}

impl std::fmt::Debug for Nexus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nexus")
            .field("phase", &self.detector.current_phase())
            .field("swarm", &self.swarm)
            .field("history", &self.history.len())
            .field("stopped", &self.stopped)
            .finish()
    }
}

/// procfs where the target has it, a zero reading elsewhere.
fn default_monitor() -> Box<dyn ResourceMonitor> {
    #[cfg(target_os = "linux")]
    {
        Box::new(crate::swarm::ProcResourceMonitor::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(FixedResourceMonitor::new(0.0, 0.0))
    }
}

impl Nexus {
    pub fn new(config: NexusConfig) -> Result<Self> {
        Self::with_parts(config, Box::new(SystemClock), default_monitor())
    }

    /// Build with an injected clock and resource probe.
    pub fn with_parts(config: NexusConfig, clock: Box<dyn Clock>, monitor: Box<dyn ResourceMonitor>) -> Result<Self> {
        config.validate()?;
        let now = clock.now();
        let detector = PhaseDetector::new(config.field.clone(), config.phase.clone());
        let swarm = SwarmCoordinator::new(config.swarm.clone(), monitor, config.seed, now);
        let arbiter = SignalArbiter::new(config.arbiter.clone());
        tracing::info!(
            nodes = swarm.pool().active_count(),
            vacuum_radius = detector.field().vacuum_radius(),
            "nexus started"
        );
        Ok(Self {
            history: VecDeque::with_capacity(config.history_size),
            phase_callbacks: Vec::new(),
            symmetry_callbacks: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(INSIGHT_SEED_OFFSET)),
            started_at: now,
            stopped: false,
            insights_generated: 0,
            detector,
            swarm,
            arbiter,
            clock,
            config,
        })
    }

    /// Fixed resource readings, for tests and hosts without procfs.
    pub fn with_fixed_resources(config: NexusConfig, clock: Box<dyn Clock>, cpu_percent: f64, ram_gb: f64) -> Result<Self> {
        Self::with_parts(config, clock, Box::new(FixedResourceMonitor::new(cpu_percent, ram_gb)))
    }

    pub fn config(&self) -> &NexusConfig {
        &self.config
    }

    pub fn swarm(&self) -> &SwarmCoordinator {
        &self.swarm
    }

    pub fn detector(&self) -> &PhaseDetector {
        &self.detector
    }

    pub fn on_phase_change<F>(&mut self, callback: F)
    where
        F: Fn(&PhaseChangeEvent) + Send + Sync + 'static,
    {
        self.phase_callbacks.push(Box::new(callback));
    }

    pub fn on_symmetry_breaking<F>(&mut self, callback: F)
    where
        F: Fn(&SymmetryBreakingEvent) + Send + Sync + 'static,
    {
        self.symmetry_callbacks.push(Box::new(callback));
    }

    /// Run one tick.
    pub fn analyze(
        &mut self,
        echo: &EchoResults,
        singularity: &SingularityResults,
        market: &MarketData,
    ) -> Result<NexusInsight> {
        if self.stopped {
            return Err(NexusError::Stopped);
        }
        market.validate()?;
        let now = self.clock.now();

        let upstream = UpstreamSignals::from_results(echo, singularity);
        let phase_state = self.detector.update(market, &upstream, now);
        let symmetry_breaking = self.detector.detect_symmetry_breaking(market, now);

        if phase_state.changed {
            let event = PhaseChangeEvent {
                timestamp: now,
                from_phase: phase_state.previous_phase,
                to_phase: phase_state.current_phase,
                stability_score: phase_state.stability_score,
                transition: phase_state.pending_transition.clone(),
            };
            for callback in &self.phase_callbacks {
                callback(&event);
            }
        }
        if let Some(event) = &symmetry_breaking {
            for callback in &self.symmetry_callbacks {
                callback(event);
            }
        }

        let phase = phase_state.current_phase;
        let resource_check = self.swarm.maybe_check_resources(now);
        let scale = self.swarm.scale_for_phase(phase, now);
        let collective = self.swarm.process_batch(&swarm_vectors(market), phase, now);

        let signal = self
            .arbiter
            .arbitrate(echo, singularity, phase, phase_state.stability_score, &collective);
        let swarm = self.swarm.metrics();

        let summary = narrative::summarize(&NarrativeInput {
            phase: &phase_state,
            symmetry_breaking: symmetry_breaking.as_ref(),
            signal: &signal,
            echo,
            singularity,
        });
        let technical = technical_details(&phase_state, &signal, resource_check.as_ref(), &scale, summary.risk_points);

        let insight = NexusInsight {
            id: Uuid::from_u128(self.rng.gen::<u128>()),
            timestamp: now,
            phase_state,
            symmetry_breaking,
            signal,
            swarm,
            collective,
            narrative: summary.narrative,
            risk_level: summary.risk_level,
            recommendation: summary.recommendation,
            action_items: summary.action_items,
            watch_list: summary.watch_list,
            technical,
        };

        tracing::debug!(
            id = %insight.id,
            phase = %phase,
            action = %insight.signal.action,
            strength = insight.signal.strength,
            confidence = insight.signal.confidence,
            risk = insight.risk_level.as_str(),
            "analysis tick"
        );

        push_and_trim(&mut self.history, insight.clone(), self.config.history_size);
        self.insights_generated += 1;
        Ok(insight)
    }

    /// `analyze` over loosely-typed payloads. `null` payloads fall back to
    /// defaults; other non-object shapes are rejected.
    pub fn analyze_json(&mut self, echo: &Value, singularity: &Value, market: &Value) -> Result<NexusInsight> {
        let echo = EchoResults::from_value(echo)?;
        let singularity = SingularityResults::from_value(singularity)?;
        let market = MarketData::from_value(market)?;
        self.analyze(&echo, &singularity, &market)
    }

    pub fn get_current_phase(&self) -> MarketPhase {
        self.detector.current_phase()
    }

    /// The last `n` insights, oldest first.
    pub fn get_recent_insights(&self, n: usize) -> Vec<NexusInsight> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn get_health(&self) -> HealthReport {
        let now = self.clock.now();
        let sample = self.swarm.last_sample();
        let cfg = &self.config.swarm;
        let pool = self.swarm.pool();

        let mut warnings = Vec::new();
        match sample {
            Some(s) => {
                if s.cpu_percent > cfg.cpu_ceiling_percent * cfg.hibernation_threshold {
                    warnings.push(format!(
                        "CPU at {:.1}% exceeds {:.1}% hibernation ceiling",
                        s.cpu_percent,
                        cfg.cpu_ceiling_percent * cfg.hibernation_threshold
                    ));
                }
                if s.ram_gb > cfg.ram_ceiling_gb * cfg.hibernation_threshold {
                    warnings.push(format!(
                        "RAM at {:.2} GB exceeds {:.2} GB hibernation ceiling",
                        s.ram_gb,
                        cfg.ram_ceiling_gb * cfg.hibernation_threshold
                    ));
                }
            }
            None if self.swarm.probe_failures() > 0 => {
                warnings.push(format!(
                    "Resource probe unavailable ({} failures)",
                    self.swarm.probe_failures()
                ));
            }
            None => {}
        }
        if pool.active_count() < cfg.min_active_nodes {
            warnings.push(format!(
                "Active nodes {} below floor {}",
                pool.active_count(),
                cfg.min_active_nodes
            ));
        }

        let status = if self.stopped {
            HealthStatus::Stopped
        } else if warnings.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        let sample = sample.unwrap_or_default();

        HealthReport {
            status,
            uptime_secs: (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0,
            cpu_percent: sample.cpu_percent,
            ram_gb: sample.ram_gb,
            active_nodes: pool.active_count(),
            hibernating_nodes: pool.hibernating_count(),
            insights_generated: self.insights_generated,
            current_phase: self.detector.current_phase(),
            warnings,
        }
    }

    /// Refuse further ticks. History stays readable.
    pub fn stop(&mut self) {
        if !self.stopped {
            tracing::info!(insights = self.insights_generated, "nexus stopped");
        }
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// One vector per location and per chain:
/// `[own, other-kind mean, market mean, -volatility]`.
fn swarm_vectors(market: &MarketData) -> Vec<Vec<f64>> {
    let locations = market.location_values();
    let chains = market.chain_values();
    let location_mean = stats::mean(&locations);
    let chain_mean = stats::mean(&chains);
    let market_mean = stats::mean(locations.iter().chain(chains.iter()));
    let risk = -market.volatility;

    let from_locations = locations
        .iter()
        .map(|s| vec![*s, chain_mean, market_mean, risk]);
    let from_chains = chains
        .iter()
        .map(|s| vec![*s, location_mean, market_mean, risk]);
    from_locations.chain(from_chains).collect()
}

fn technical_details(
    phase: &PhaseState,
    signal: &ArbitratedSignal,
    resources: Option<&ResourceCheck>,
    scale: &ScaleDecision,
    risk_points: u32,
) -> Value {
    let field = &phase.field_state;
    json!({
        "field": {
            "raw_phase": field.phase,
            "temperature": field.temperature,
            "critical_temperature": field.critical_temperature,
            "order_parameter": field.order_parameter,
            "susceptibility": field.susceptibility,
            "correlation_length": field.correlation_length,
            "potential": field.potential.potential,
            "curvature": field.potential.curvature,
            "distance_from_vacuum": field.potential.distance_from_vacuum,
            "vacuum_radius": field.potential.vacuum_radius,
            "is_critical": field.is_critical,
        },
        "stability_counter": phase.stability_counter,
        "weights": {
            "echo": signal.echo.weight,
            "singularity": signal.singularity.weight,
        },
        "resources": resources.map(|r| json!({
            "cpu_percent": r.sample.map(|s| s.cpu_percent),
            "ram_gb": r.sample.map(|s| s.ram_gb),
            "hibernated": r.hibernated,
            "woken": r.woken,
            "expired": r.expired,
        })),
        "scale": scale,
        "risk_points": risk_points,
    })
}

// ─── Shared handle ──────────────────────────────────────────────────────────

/// Cloneable handle serialising every call through one lock.
#[derive(Clone)]
pub struct SharedNexus {
    inner: Arc<Mutex<Nexus>>,
}

impl SharedNexus {
    pub fn new(nexus: Nexus) -> Self {
        Self { inner: Arc::new(Mutex::new(nexus)) }
    }

    pub fn analyze(
        &self,
        echo: &EchoResults,
        singularity: &SingularityResults,
        market: &MarketData,
    ) -> Result<NexusInsight> {
        self.inner.lock().analyze(echo, singularity, market)
    }

    pub fn analyze_json(&self, echo: &Value, singularity: &Value, market: &Value) -> Result<NexusInsight> {
        self.inner.lock().analyze_json(echo, singularity, market)
    }

    pub fn get_health(&self) -> HealthReport {
        self.inner.lock().get_health()
    }

    pub fn get_current_phase(&self) -> MarketPhase {
        self.inner.lock().get_current_phase()
    }

    pub fn get_recent_insights(&self, n: usize) -> Vec<NexusInsight> {
        self.inner.lock().get_recent_insights(n)
    }

    pub fn on_phase_change<F>(&self, callback: F)
    where
        F: Fn(&PhaseChangeEvent) + Send + Sync + 'static,
    {
        self.inner.lock().on_phase_change(callback);
    }

    pub fn on_symmetry_breaking<F>(&self, callback: F)
    where
        F: Fn(&SymmetryBreakingEvent) + Send + Sync + 'static,
    {
        self.inner.lock().on_symmetry_breaking(callback);
    }

    pub fn stop(&self) {
        self.inner.lock().stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn nexus(config: NexusConfig) -> (Nexus, ManualClock) {
        let clock = ManualClock::default();
        let n = Nexus::with_fixed_resources(config, Box::new(clock.clone()), 20.0, 0.5).unwrap();
        (n, clock)
    }

    fn market(sentiment: f64, volatility: f64) -> MarketData {
        let mut m = MarketData { volatility, ..MarketData::default() };
        for i in 0..4 {
            m.chain_sentiments.insert(format!("chain-{}", i), sentiment);
            m.location_sentiments.insert(format!("loc-{}", i), sentiment);
        }
        m
    }

    #[test]
    fn history_is_fifo_and_capped() {
        let (mut n, clock) = nexus(NexusConfig { history_size: 3, ..NexusConfig::default() });
        let mut ids = Vec::new();
        for _ in 0..5 {
            let insight = n
                .analyze(&EchoResults::default(), &SingularityResults::default(), &market(0.1, 0.1))
                .unwrap();
            ids.push(insight.id);
            clock.advance(Duration::hours(1));
        }
        assert_eq!(n.history_len(), 3);
        let recent: Vec<Uuid> = n.get_recent_insights(10).iter().map(|i| i.id).collect();
        assert_eq!(recent, ids[2..].to_vec());
        assert_eq!(n.get_recent_insights(1)[0].id, ids[4]);
    }

    #[test]
    fn stopped_engine_refuses_ticks() {
        let (mut n, _) = nexus(NexusConfig::default());
        n.stop();
        let err = n
            .analyze(&EchoResults::default(), &SingularityResults::default(), &MarketData::default())
            .unwrap_err();
        assert_eq!(err, NexusError::Stopped);
        assert_eq!(n.get_health().status, HealthStatus::Stopped);
    }

    #[test]
    fn invalid_market_is_rejected_without_side_effects() {
        let (mut n, _) = nexus(NexusConfig::default());
        let bad = MarketData { volatility: f64::NAN, ..MarketData::default() };
        assert!(n.analyze(&EchoResults::default(), &SingularityResults::default(), &bad).is_err());
        assert_eq!(n.history_len(), 0);
        assert_eq!(n.detector().field().history_len(), 0);
    }

    #[test]
    fn phase_callbacks_fire_on_commit() {
        let (mut n, clock) = nexus(NexusConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        n.on_phase_change(move |ev| {
            assert_eq!(ev.to_phase, MarketPhase::BrokenBullish);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..6 {
            n.analyze(&EchoResults::default(), &SingularityResults::default(), &market(0.3, 0.05))
                .unwrap();
            clock.advance(Duration::hours(1));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(n.get_current_phase(), MarketPhase::BrokenBullish);
    }

    #[test]
    fn symmetry_callbacks_fire_once() {
        let (mut n, clock) = nexus(NexusConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        n.on_symmetry_breaking(move |ev| {
            assert!(ev.trigger.starts_with("chain:"));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        for i in 0..14 {
            let m = if i < 5 { market(0.0, 0.05) } else { market(0.3, 0.05) };
            n.analyze(&EchoResults::default(), &SingularityResults::default(), &m).unwrap();
            clock.advance(Duration::hours(1));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn swarm_vectors_cover_locations_and_chains() {
        let mut m = MarketData { volatility: 0.2, ..MarketData::default() };
        m.location_sentiments = BTreeMap::from([("a".to_string(), 0.4), ("b".to_string(), 0.2)]);
        m.chain_sentiments = BTreeMap::from([("x".to_string(), -0.2)]);
        let v = swarm_vectors(&m);
        assert_eq!(v.len(), 3);
        assert_eq!(v[0][0], 0.4);
        assert_eq!(v[0][1], -0.2);
        assert!((v[0][2] - 0.4 / 3.0).abs() < 1e-12);
        assert_eq!(v[0][3], -0.2);
        assert!((v[2][1] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn health_degrades_under_pressure() {
        let clock = ManualClock::default();
        let mut n = Nexus::with_fixed_resources(NexusConfig::default(), Box::new(clock.clone()), 95.0, 0.5).unwrap();
        assert_eq!(n.get_health().status, HealthStatus::Healthy);
        n.analyze(&EchoResults::default(), &SingularityResults::default(), &market(0.1, 0.1))
            .unwrap();
        let health = n.get_health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.warnings[0].starts_with("CPU"));
    }

    #[test]
    fn record_is_flat_json() {
        let (mut n, _) = nexus(NexusConfig::default());
        let insight = n
            .analyze(&EchoResults::default(), &SingularityResults::default(), &market(0.1, 0.1))
            .unwrap();
        let json = insight.to_json();
        assert_eq!(json["phase"], "SYMMETRIC");
        assert!(json["signal"]["action"].is_string());
        assert!(json["swarm"]["active_nodes"].is_u64());
        assert!(json["action_items"].as_array().unwrap().len() <= 5);
    }

    #[test]
    fn shared_handle_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedNexus>();
    }
}
