// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Swarm Node
//
// A lightweight worker that turns a short history of input vectors into an
// opinion in [-1, 1] and a confidence in [0, 1]. Energy decays with use and
// is restored when the node wakes from hibernation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::stats::{self, push_and_trim};
use crate::types::{MarketPhase, NodeState};

// ─── Constants ──────────────────────────────────────────────────────────────

pub const NODE_HISTORY_CAP: usize = 10;

const RECENT_SAMPLES: usize = 3;

/// Every node starts from one neutral observation, so its first real input
/// already reads as a move away from neutral.
const NEUTRAL_PRIOR: f64 = 0.0;
const TREND_GAIN: f64 = 2.0;

const MIN_CONFIDENCE: f64 = 0.1;
const CHAOTIC_CONFIDENCE_FACTOR: f64 = 0.5;
const CRITICAL_CONFIDENCE_FACTOR: f64 = 0.7;

const ENERGY_DECAY: f64 = 0.01;
const MIN_ENERGY: f64 = 0.1;
const FULL_ENERGY: f64 = 1.0;

// ─── Specialization ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specialization {
    Momentum,
    Contrarian,
    Volatility,
    Sentiment,
    Generalist,
}

impl Specialization {
    pub const ALL: [Specialization; 5] = [
        Self::Momentum,
        Self::Contrarian,
        Self::Volatility,
        Self::Sentiment,
        Self::Generalist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Momentum => "momentum",
            Self::Contrarian => "contrarian",
            Self::Volatility => "volatility",
            Self::Sentiment => "sentiment",
            Self::Generalist => "generalist",
        }
    }
}

// ─── Node ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusNode {
    pub id: String,
    pub state: NodeState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub energy: f64,
    pub opinion: f64,
    pub confidence: f64,
    pub specialization: Specialization,
    history: VecDeque<Vec<f64>>,
}

impl NexusNode {
    pub fn new(id: String, specialization: Specialization, now: DateTime<Utc>) -> Self {
        let mut history = VecDeque::with_capacity(NODE_HISTORY_CAP);
        history.push_back(vec![NEUTRAL_PRIOR]);
        Self {
            id,
            state: NodeState::Active,
            created_at: now,
            last_active: now,
            energy: FULL_ENERGY,
            opinion: 0.0,
            confidence: 0.5,
            specialization,
            history,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Fold one input vector into the node's view. The last three samples
    /// are compared against the older ones; with fewer than two samples the
    /// opinion is left unchanged.
    pub fn process(&mut self, vector: &[f64], phase: MarketPhase, now: DateTime<Utc>) {
        push_and_trim(&mut self.history, vector.to_vec(), NODE_HISTORY_CAP);
        self.last_active = now;
        self.energy = (self.energy - ENERGY_DECAY).max(MIN_ENERGY);

        let n = self.history.len();
        if n < 2 {
            return;
        }

        let sample_means: Vec<f64> = self
            .history
            .iter()
            .map(|v| stats::finite_or(stats::mean(v), 0.0))
            .collect();
        let split = n - RECENT_SAMPLES.min(n - 1);
        let trend = stats::mean(&sample_means[split..]) - stats::mean(&sample_means[..split]);

        self.opinion = (TREND_GAIN * trend).tanh().clamp(-1.0, 1.0);

        let mut confidence = (1.0 - stats::variance(&sample_means)).max(MIN_CONFIDENCE);
        match phase {
            MarketPhase::Chaotic => confidence *= CHAOTIC_CONFIDENCE_FACTOR,
            MarketPhase::Critical => confidence *= CRITICAL_CONFIDENCE_FACTOR,
            _ => {}
        }
        self.confidence = confidence.clamp(0.0, 1.0);
    }

    pub fn hibernate(&mut self) {
        self.state = NodeState::Hibernating;
    }

    pub fn wake(&mut self, now: DateTime<Utc>) {
        self.state = NodeState::Active;
        self.energy = FULL_ENERGY;
        self.last_active = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NexusNode {
        NexusNode::new("node-test".into(), Specialization::Generalist, Utc::now())
    }

    #[test]
    fn first_input_moves_away_from_neutral_prior() {
        let mut n = node();
        assert_eq!(n.history_len(), 1);
        n.process(&[0.4, 0.4], MarketPhase::Symmetric, Utc::now());
        assert!((n.opinion - (0.8f64).tanh()).abs() < 1e-9);
        n.process(&[-0.9, -0.9], MarketPhase::Symmetric, Utc::now());
        assert!(n.opinion < 0.0);
    }

    #[test]
    fn constant_positive_inputs_stay_bullish() {
        let mut n = node();
        for _ in 0..5 {
            n.process(&[0.5, 0.6, 0.7, 0.8], MarketPhase::Symmetric, Utc::now());
        }
        assert!(n.opinion > 0.0);
    }

    #[test]
    fn rising_inputs_give_positive_opinion() {
        let mut n = node();
        for k in 0..5 {
            n.process(&[0.1 * k as f64; 4], MarketPhase::Symmetric, Utc::now());
        }
        assert!(n.opinion > 0.0);
        assert!(n.confidence > 0.1 && n.confidence <= 1.0);
    }

    #[test]
    fn phase_dampens_confidence() {
        let mut calm = node();
        let mut chaotic = node();
        let mut critical = node();
        for k in 0..4 {
            let v = [0.05 * k as f64; 4];
            calm.process(&v, MarketPhase::Symmetric, Utc::now());
            chaotic.process(&v, MarketPhase::Chaotic, Utc::now());
            critical.process(&v, MarketPhase::Critical, Utc::now());
        }
        assert!((chaotic.confidence - calm.confidence * 0.5).abs() < 1e-9);
        assert!((critical.confidence - calm.confidence * 0.7).abs() < 1e-9);
    }

    #[test]
    fn energy_decays_to_floor_and_wake_restores() {
        let mut n = node();
        for _ in 0..200 {
            n.process(&[0.0], MarketPhase::Symmetric, Utc::now());
        }
        assert!((n.energy - 0.1).abs() < 1e-9);
        assert_eq!(n.history_len(), NODE_HISTORY_CAP);
        n.hibernate();
        assert_eq!(n.state, NodeState::Hibernating);
        n.wake(Utc::now());
        assert_eq!(n.state, NodeState::Active);
        assert_eq!(n.energy, 1.0);
    }
}
