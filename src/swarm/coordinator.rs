// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Swarm Coordinator
//
// Keeps the node pool inside its CPU/RAM ceilings, rescales it for the
// current market phase, and reduces node opinions into one collective view.
//
// Resource loop (at most once per `resource_check_interval_secs`):
//   over ceiling × hibernation_threshold  -> hibernate lowest-energy 25%
//   under ceiling × wake_threshold        -> wake up to `wake_batch` nodes
//   idle longer than `node_ttl_minutes`   -> hibernate
// None of these drop the active population below `min_active_nodes`.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use super::node::{NexusNode, Specialization};
use super::pool::NodePool;
use super::resources::{ResourceMonitor, ResourceSample};
use crate::config::{SwarmConfig, MAX_NODE_TTL_MINUTES, MAX_RESOURCE_CHECK_INTERVAL_SECS};
use crate::stats;
use crate::types::MarketPhase;

// ─── Constants ──────────────────────────────────────────────────────────────

const HIBERNATE_FRACTION_DIVISOR: usize = 4;
const VOTER_MIN_CONFIDENCE: f64 = 0.3;
const NEUTRAL_BAND: f64 = 0.1;

const CI_WEIGHT_CONFIDENCE: f64 = 0.5;
const CI_WEIGHT_CONVERGENCE: f64 = 0.3;
const CI_WEIGHT_DIVERSITY: f64 = 0.2;

// ─── Records ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectiveOpinion {
    pub opinion: f64,
    pub collective_confidence: f64,
    pub consensus_reached: bool,
    /// Fraction of confident voters agreeing in sign with the opinion.
    pub consensus_score: f64,
    pub participating_nodes: usize,
    pub voters: usize,
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
    pub dissent_reasons: Vec<String>,
}

impl CollectiveOpinion {
    fn without_nodes() -> Self {
        Self {
            dissent_reasons: vec!["No active nodes".to_string()],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SwarmMetrics {
    pub active_nodes: usize,
    pub hibernating_nodes: usize,
    pub total_nodes: usize,
    pub cpu_percent: f64,
    pub ram_gb: f64,
    pub mean_energy: f64,
    pub collective_intelligence: f64,
    pub convergence_rate: f64,
    pub diversity_index: f64,
}

/// Outcome of one resource cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceCheck {
    /// `None` when the probe failed and the rescale decision was skipped.
    pub sample: Option<ResourceSample>,
    pub hibernated: usize,
    pub woken: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleDecision {
    pub target: usize,
    pub woken: usize,
    pub spawned: usize,
    pub hibernated: usize,
}

// ─── Coordinator ────────────────────────────────────────────────────────────

pub struct SwarmCoordinator {
    config: SwarmConfig,
    pool: NodePool,
    monitor: Box<dyn ResourceMonitor>,
    rng: ChaCha8Rng,
    last_check: Option<DateTime<Utc>>,
    last_sample: Option<ResourceSample>,
    under_pressure: bool,
    probe_failures: u64,
}

impl std::fmt::Debug for SwarmCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmCoordinator")
            .field("active", &self.pool.active_count())
            .field("hibernating", &self.pool.hibernating_count())
            .field("last_sample", &self.last_sample)
            .field("probe_failures", &self.probe_failures)
            .finish()
    }
}

impl SwarmCoordinator {
    pub fn new(config: SwarmConfig, monitor: Box<dyn ResourceMonitor>, seed: u64, now: DateTime<Utc>) -> Self {
        let mut coordinator = Self {
            pool: NodePool::new(config.max_active_nodes, config.max_total_nodes),
            monitor,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_check: None,
            last_sample: None,
            under_pressure: false,
            probe_failures: 0,
            config,
        };
        let initial = coordinator
            .config
            .initial_nodes
            .max(coordinator.config.min_active_nodes)
            .min(coordinator.config.max_active_nodes);
        for _ in 0..initial {
            if coordinator.spawn_node(now).is_none() {
                break;
            }
        }
        coordinator
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn last_sample(&self) -> Option<ResourceSample> {
        self.last_sample
    }

    pub fn probe_failures(&self) -> u64 {
        self.probe_failures
    }

    pub fn under_pressure(&self) -> bool {
        self.under_pressure
    }

    fn spawn_node(&mut self, now: DateTime<Utc>) -> Option<String> {
        let mut id = format!("node-{:08x}", self.rng.gen::<u32>());
        while self.pool.contains(&id) {
            id = format!("node-{:08x}", self.rng.gen::<u32>());
        }
        let specialization = Specialization::ALL[self.rng.gen_range(0..Specialization::ALL.len())];
        self.pool.spawn(id, specialization, now).map(|n| n.id.clone())
    }

    fn hibernation_room(&self) -> usize {
        self.pool.active_count().saturating_sub(self.config.min_active_nodes)
    }

    // --- Resource loop -----------------------------------------------------------

    /// Throttled resource cycle. Returns `None` when the last check is more
    /// recent than the configured interval.
    pub fn maybe_check_resources(&mut self, now: DateTime<Utc>) -> Option<ResourceCheck> {
        if let Some(last) = self.last_check {
            if now - last < self.check_interval() {
                return None;
            }
        }
        self.last_check = Some(now);

        let mut check = ResourceCheck::default();
        match self.monitor.sample() {
            Ok(sample) => {
                self.last_sample = Some(sample);
                check.sample = Some(sample);
                let cpu_ceiling = self.config.cpu_ceiling_percent;
                let ram_ceiling = self.config.ram_ceiling_gb;
                let hibernate_at = self.config.hibernation_threshold;
                let wake_at = self.config.wake_threshold;

                self.under_pressure =
                    sample.cpu_percent > cpu_ceiling * hibernate_at || sample.ram_gb > ram_ceiling * hibernate_at;
                if self.under_pressure {
                    check.hibernated = self.hibernate_excess();
                } else if sample.cpu_percent < cpu_ceiling * wake_at && sample.ram_gb < ram_ceiling * wake_at {
                    check.woken = self.wake_batch(self.config.wake_batch, now);
                }
            }
            Err(e) => {
                self.probe_failures += 1;
                tracing::warn!(error = %e, "resource probe failed, skipping rescale");
            }
        }
        check.expired = self.expire_idle(now);
        Some(check)
    }

    // Clamped so an unvalidated config can neither drop the throttle nor overflow chrono.
    fn check_interval(&self) -> Duration {
        Duration::seconds(self.config.resource_check_interval_secs.clamp(1, MAX_RESOURCE_CHECK_INTERVAL_SECS))
    }

    fn node_ttl(&self) -> Duration {
        Duration::minutes(self.config.node_ttl_minutes.clamp(1, MAX_NODE_TTL_MINUTES))
    }

    /// Hibernate the lowest-energy quarter of the active nodes.
    fn hibernate_excess(&mut self) -> usize {
        let count = (self.pool.active_count() / HIBERNATE_FRACTION_DIVISOR).min(self.hibernation_room());
        let victims: Vec<String> = self.pool.active_by_energy().into_iter().take(count).collect();
        let hibernated = victims.iter().filter(|id| self.pool.hibernate(id)).count();
        if hibernated > 0 {
            tracing::info!(hibernated, active = self.pool.active_count(), "resource ceiling hit, hibernating nodes");
        }
        hibernated
    }

    fn wake_batch(&mut self, limit: usize, now: DateTime<Utc>) -> usize {
        let candidates: Vec<String> = self.pool.hibernating_by_energy_desc().into_iter().take(limit).collect();
        let woken = candidates.iter().filter(|id| self.pool.wake(id, now)).count();
        if woken > 0 {
            tracing::info!(woken, active = self.pool.active_count(), "resources available, waking nodes");
        }
        woken
    }

    fn expire_idle(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.node_ttl();
        let room = self.hibernation_room();
        let idle: Vec<String> = self.pool.idle_since(cutoff).into_iter().take(room).collect();
        let expired = idle.iter().filter(|id| self.pool.hibernate(id)).count();
        if expired > 0 {
            tracing::debug!(expired, "idle nodes hibernated");
        }
        expired
    }

    // --- Phase scaling -----------------------------------------------------------

    /// Active-node target for a phase, relative to the configured baseline.
    pub fn target_for_phase(&self, phase: MarketPhase) -> usize {
        let base = self.config.initial_nodes;
        let target = match phase {
            p if p.is_turbulent() => base.saturating_add(self.config.scale_up_step),
            MarketPhase::Symmetric => base.saturating_sub(self.config.scale_down_step),
            _ => base,
        };
        target.max(self.config.min_active_nodes).min(self.config.max_active_nodes)
    }

    /// Move the active population toward the phase target. Hibernating
    /// nodes are woken before new ones are spawned; growth is suspended
    /// while the last resource reading was over the hibernation ceiling.
    pub fn scale_for_phase(&mut self, phase: MarketPhase, now: DateTime<Utc>) -> ScaleDecision {
        let mut target = self.target_for_phase(phase);
        if self.under_pressure {
            target = target.min(self.pool.active_count().max(self.config.min_active_nodes));
        }
        let mut decision = ScaleDecision { target, ..ScaleDecision::default() };

        let active = self.pool.active_count();
        if active < target {
            decision.woken = self.wake_batch(target - active, now);
            while self.pool.active_count() < target {
                if self.spawn_node(now).is_none() {
                    break;
                }
                decision.spawned += 1;
            }
        } else if active > target {
            let excess = active - target;
            let victims: Vec<String> = self.pool.active_by_energy().into_iter().take(excess).collect();
            decision.hibernated = victims.iter().filter(|id| self.pool.hibernate(id)).count();
        }

        if decision.woken + decision.spawned + decision.hibernated > 0 {
            tracing::info!(
                phase = %phase,
                target_nodes = target,
                woken = decision.woken,
                spawned = decision.spawned,
                hibernated = decision.hibernated,
                "swarm rescaled"
            );
        }
        debug_assert!(self.pool.check_disjoint());
        decision
    }

    // --- Batch processing --------------------------------------------------------

    /// Round-robin `vectors` over the active nodes (id order), process every
    /// assignment, then reduce the participants into a collective opinion.
    /// With no vectors the current node opinions are reduced as they stand.
    pub fn process_batch(&mut self, vectors: &[Vec<f64>], phase: MarketPhase, now: DateTime<Utc>) -> CollectiveOpinion {
        let n = self.pool.active_count();
        if n == 0 {
            return CollectiveOpinion::without_nodes();
        }

        let views: Vec<(f64, f64)> = if vectors.is_empty() {
            self.pool.active().map(|node| (node.opinion, node.confidence)).collect()
        } else {
            let mut assignments: Vec<Vec<&[f64]>> = vec![Vec::new(); n];
            for (i, v) in vectors.iter().enumerate() {
                assignments[i % n].push(v.as_slice());
            }
            let work: Vec<(&mut NexusNode, Vec<&[f64]>)> = self
                .pool
                .active_mut()
                .zip(assignments)
                .filter(|(_, batch)| !batch.is_empty())
                .collect();
            run_assignments(work, phase, now)
        };

        let collective = self.reduce(&views);
        tracing::debug!(
            participants = collective.participating_nodes,
            opinion = collective.opinion,
            consensus = collective.consensus_reached,
            "swarm batch reduced"
        );
        collective
    }

    fn reduce(&self, views: &[(f64, f64)]) -> CollectiveOpinion {
        if views.is_empty() {
            return CollectiveOpinion::without_nodes();
        }
        let weight: f64 = views.iter().map(|(_, c)| c).sum();
        let opinion = if weight > f64::EPSILON {
            (views.iter().map(|(o, c)| o * c).sum::<f64>() / weight).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let collective_confidence = stats::mean(views.iter().map(|(_, c)| c)).clamp(0.0, 1.0);

        let bullish = views.iter().filter(|(o, _)| *o >= NEUTRAL_BAND).count();
        let bearish = views.iter().filter(|(o, _)| *o <= -NEUTRAL_BAND).count();
        let neutral = views.len() - bullish - bearish;

        let voters: Vec<f64> = views
            .iter()
            .filter(|(_, c)| *c > VOTER_MIN_CONFIDENCE)
            .map(|(o, _)| *o)
            .collect();
        let agreeing = voters
            .iter()
            .filter(|o| **o != 0.0 && opinion != 0.0 && o.signum() == opinion.signum())
            .count();
        let consensus_score = if voters.is_empty() { 0.0 } else { agreeing as f64 / voters.len() as f64 };

        let enough_votes = voters.len() >= self.config.min_votes_for_decision;
        let consensus_reached = enough_votes && consensus_score >= self.config.consensus_threshold;

        let mut dissent_reasons = Vec::new();
        if !enough_votes {
            dissent_reasons.push(format!(
                "Insufficient votes: {} confident nodes, {} required",
                voters.len(),
                self.config.min_votes_for_decision
            ));
        } else if !consensus_reached {
            dissent_reasons.push(format!(
                "Split: {} bullish, {} bearish, {} neutral",
                bullish, bearish, neutral
            ));
        }

        CollectiveOpinion {
            opinion,
            collective_confidence,
            consensus_reached,
            consensus_score,
            participating_nodes: views.len(),
            voters: voters.len(),
            bullish,
            bearish,
            neutral,
            dissent_reasons,
        }
    }

    // --- Metrics -------------------------------------------------------------

    pub fn metrics(&self) -> SwarmMetrics {
        let opinions: Vec<f64> = self.pool.active().map(|n| n.opinion).collect();
        let mean_energy = stats::mean(self.pool.active().map(|n| &n.energy));
        let mean_confidence = stats::mean(self.pool.active().map(|n| &n.confidence));
        let convergence_rate = if opinions.is_empty() {
            0.0
        } else {
            (1.0 - stats::std_dev(&opinions)).clamp(0.0, 1.0)
        };
        let diversity_index = diversity(&opinions);
        let sample = self.last_sample.unwrap_or_default();

        SwarmMetrics {
            active_nodes: self.pool.active_count(),
            hibernating_nodes: self.pool.hibernating_count(),
            total_nodes: self.pool.total_count(),
            cpu_percent: sample.cpu_percent,
            ram_gb: sample.ram_gb,
            mean_energy,
            collective_intelligence: (CI_WEIGHT_CONFIDENCE * mean_confidence
                + CI_WEIGHT_CONVERGENCE * convergence_rate
                + CI_WEIGHT_DIVERSITY * diversity_index)
                .clamp(0.0, 1.0),
            convergence_rate,
            diversity_index,
        }
    }
}

/// Fan out node work and wait for every node before returning
/// `(opinion, confidence)` per participant.
#[cfg(not(target_arch = "wasm32"))]
fn run_assignments(work: Vec<(&mut NexusNode, Vec<&[f64]>)>, phase: MarketPhase, now: DateTime<Utc>) -> Vec<(f64, f64)> {
    work.into_par_iter()
        .map(|(node, batch)| process_node(node, &batch, phase, now))
        .collect()
}

#[cfg(target_arch = "wasm32")]
fn run_assignments(work: Vec<(&mut NexusNode, Vec<&[f64]>)>, phase: MarketPhase, now: DateTime<Utc>) -> Vec<(f64, f64)> {
    work.into_iter()
        .map(|(node, batch)| process_node(node, &batch, phase, now))
        .collect()
}

fn process_node(node: &mut NexusNode, batch: &[&[f64]], phase: MarketPhase, now: DateTime<Utc>) -> (f64, f64) {
    for vector in batch {
        node.process(vector, phase, now);
    }
    (node.opinion, node.confidence)
}

/// Normalised Shannon entropy over bullish/bearish/neutral buckets.
fn diversity(opinions: &[f64]) -> f64 {
    if opinions.is_empty() {
        return 0.0;
    }
    let total = opinions.len() as f64;
    let buckets = [
        opinions.iter().filter(|o| **o >= NEUTRAL_BAND).count(),
        opinions.iter().filter(|o| **o <= -NEUTRAL_BAND).count(),
        opinions.iter().filter(|o| o.abs() < NEUTRAL_BAND).count(),
    ];
    let entropy: f64 = buckets
        .iter()
        .filter(|c| **c > 0)
        .map(|c| {
            let p = *c as f64 / total;
            -p * p.ln()
        })
        .sum();
    entropy / (3.0f64).ln()
}
