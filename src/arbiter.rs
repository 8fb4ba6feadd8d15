// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Signal Arbiter
//
// Fuses the Echo and Singularity signals with the swarm's collective
// opinion into one action.
//
//   weights    = normalize(0.7·phase_table + 0.3·confidence_ratio)
//   strength   = w_e·s_echo + w_s·s_sing, then swarm blend / veto
//   confidence = 0.7·weighted + 0.1·swarm + 0.2·stability, clamped
//
// Phase overrides run last and may only downgrade the action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ArbiterConfig, PhaseWeights};
use crate::stats::finite_or;
use crate::swarm::CollectiveOpinion;
use crate::types::{EchoResults, EngineAuthority, MarketPhase, SingularityResults, Stability, TradingAction};

// ─── Constants ──────────────────────────────────────────────────────────────

const ENGINE_CONFIDENCE_SHARE: f64 = 0.7;
const SWARM_CONFIDENCE_SHARE: f64 = 0.1;
const STABILITY_SHARE: f64 = 0.2;

const SWARM_BLEND_MIN_CONFIDENCE: f64 = 0.5;
const VETO_MIN_OPINION: f64 = 0.3;
const VETO_DAMPING: f64 = 0.5;

const STRONG_MIN_CONFIDENCE: f64 = 0.6;

const CHAOTIC_BUTTERFLY_LIMIT: f64 = 0.7;
const CHAOTIC_MIN_CONFIDENCE: f64 = 0.7;
const TRANSITION_MIN_CONFIDENCE: f64 = 0.8;

const MAX_HIGHLIGHTS: usize = 3;

// ─── Records ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineContribution {
    pub name: String,
    pub strength: f64,
    pub confidence: f64,
    pub weight: f64,
    pub key_insights: Vec<String>,
    pub risk_factors: Vec<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbitratedSignal {
    pub action: TradingAction,
    pub confidence: f64,
    pub strength: f64,
    pub echo: EngineContribution,
    pub singularity: EngineContribution,
    pub authority: EngineAuthority,
    pub phase: MarketPhase,
    /// A phase override or the swarm veto changed the outcome.
    pub phase_adjusted: bool,
    pub override_reasons: Vec<String>,
    pub swarm_opinion: f64,
    pub swarm_consensus: f64,
    pub dissent_reasons: Vec<String>,
}

impl ArbitratedSignal {
    pub fn override_reason(&self) -> Option<&str> {
        self.override_reasons.first().map(String::as_str)
    }
}

/// Result of folding the swarm into the engine strength.
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmAdjustment {
    pub strength: f64,
    pub blended: bool,
    pub veto_reason: Option<String>,
}

// ─── Arbiter ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SignalArbiter {
    config: ArbiterConfig,
}

impl SignalArbiter {
    pub fn new(config: ArbiterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Final weights for a phase given the two engine confidences. Always
    /// sums to one.
    pub fn weights(&self, phase: MarketPhase, echo_confidence: f64, singularity_confidence: f64) -> PhaseWeights {
        let base = self.config.weights.for_phase(phase);
        let ec = sanitize_confidence(echo_confidence);
        let sc = sanitize_confidence(singularity_confidence);
        let ratio = PhaseWeights::new(ec, sc).normalized();
        let b = self.config.confidence_blend.clamp(0.0, 1.0);
        PhaseWeights::new(
            (1.0 - b) * base.echo + b * ratio.echo,
            (1.0 - b) * base.singularity + b * ratio.singularity,
        )
        .normalized()
    }

    pub fn authority(&self, phase: MarketPhase, stability: Stability, weights: PhaseWeights) -> EngineAuthority {
        if stability == Stability::Critical && matches!(phase, MarketPhase::Critical | MarketPhase::Chaotic) {
            return EngineAuthority::NexusOverride;
        }
        let gap = weights.echo - weights.singularity;
        if gap > self.config.authority_gap {
            EngineAuthority::EchoDominant
        } else if -gap > self.config.authority_gap {
            EngineAuthority::SingularityDominant
        } else {
            EngineAuthority::Balanced
        }
    }

    /// Blend a consenting swarm into `strength`, then apply the veto when a
    /// confident swarm opposes the engines' direction.
    pub fn apply_swarm(&self, strength: f64, swarm: &CollectiveOpinion) -> SwarmAdjustment {
        let confidence = sanitize_confidence_or(swarm.collective_confidence, 0.0);
        let opinion = finite_or(swarm.opinion, 0.0).clamp(-1.0, 1.0);
        let engines = finite_or(strength, 0.0).clamp(-1.0, 1.0);

        let mut adjusted = engines;
        let blended = swarm.consensus_reached && confidence > SWARM_BLEND_MIN_CONFIDENCE;
        if blended {
            let k = self.config.swarm_weight.clamp(0.0, 1.0) * confidence;
            adjusted = adjusted * (1.0 - k) + opinion * k;
        }

        let opposed = engines != 0.0 && opinion.signum() != engines.signum();
        let veto_reason = if confidence > self.config.veto_threshold && opposed && opinion.abs() > VETO_MIN_OPINION {
            adjusted *= VETO_DAMPING;
            Some(format!(
                "Swarm veto: collective opinion {:+.2} at confidence {:.2} opposes strength {:+.2}",
                opinion, confidence, engines
            ))
        } else {
            None
        };

        SwarmAdjustment { strength: adjusted.clamp(-1.0, 1.0), blended, veto_reason }
    }

    fn action_for(&self, strength: f64, confidence: f64) -> TradingAction {
        let magnitude = strength.abs();
        if magnitude > self.config.strong_signal_threshold && confidence > STRONG_MIN_CONFIDENCE {
            if strength > 0.0 { TradingAction::StrongBuy } else { TradingAction::StrongSell }
        } else if magnitude > self.config.weak_signal_threshold {
            if strength > 0.0 { TradingAction::Buy } else { TradingAction::Sell }
        } else {
            TradingAction::Hold
        }
    }

    /// Downgrade-only phase overrides, in order.
    fn phase_overrides(
        &self,
        action: TradingAction,
        phase: MarketPhase,
        stability: Stability,
        butterfly: f64,
        confidence: f64,
        reasons: &mut Vec<String>,
    ) -> TradingAction {
        let mut action = action;
        if phase == MarketPhase::Critical && action.is_strong() {
            action = action.demoted();
            reasons.push("Critical phase: strong signal demoted".to_string());
        }
        if phase == MarketPhase::Chaotic
            && butterfly > CHAOTIC_BUTTERFLY_LIMIT
            && confidence < CHAOTIC_MIN_CONFIDENCE
            && action != TradingAction::Hold
        {
            action = TradingAction::Hold;
            reasons.push(format!("Chaotic phase with butterfly coefficient {:.2}: holding", butterfly));
        }
        if stability == Stability::Critical && action.is_bullish() {
            action = TradingAction::Hold;
            reasons.push("Upstream stability critical: buy suppressed".to_string());
        }
        if phase == MarketPhase::Transition && confidence < TRANSITION_MIN_CONFIDENCE && action.is_strong() {
            action = action.demoted();
            reasons.push("Transition phase: strong signal demoted pending confirmation".to_string());
        }
        action
    }

    pub fn arbitrate(
        &self,
        echo: &EchoResults,
        singularity: &SingularityResults,
        phase: MarketPhase,
        stability_score: f64,
        swarm: &CollectiveOpinion,
    ) -> ArbitratedSignal {
        let ec = sanitize_confidence(echo.confidence);
        let sc = sanitize_confidence(singularity.confidence);
        let weights = self.weights(phase, ec, sc);
        let stability = echo.stability_level();
        let authority = self.authority(phase, stability, weights);

        let echo_strength = echo.action().strength();
        let singularity_strength = singularity.strength();
        let engines = weights.echo * echo_strength + weights.singularity * singularity_strength;

        let adjustment = self.apply_swarm(engines, swarm);
        let mut override_reasons = Vec::new();
        if let Some(reason) = &adjustment.veto_reason {
            tracing::warn!(reason = %reason, "swarm veto applied");
            override_reasons.push(reason.clone());
        }
        let strength = adjustment.strength;

        let swarm_confidence = sanitize_confidence_or(swarm.collective_confidence, 0.0);
        let raw_confidence = ENGINE_CONFIDENCE_SHARE * (weights.echo * ec + weights.singularity * sc)
            + SWARM_CONFIDENCE_SHARE * swarm_confidence
            + STABILITY_SHARE * sanitize_confidence(stability_score);
        let confidence = self.clamp_confidence(raw_confidence);

        let proposed = self.action_for(strength, confidence);
        let butterfly = finite_or(echo.butterfly_coefficient, 0.0);
        let action = self.phase_overrides(proposed, phase, stability, butterfly, confidence, &mut override_reasons);

        let phase_adjusted = !override_reasons.is_empty();
        tracing::debug!(
            phase = %phase,
            action = %action,
            strength,
            confidence,
            adjusted = phase_adjusted,
            "signal arbitrated"
        );

        ArbitratedSignal {
            action,
            confidence,
            strength,
            echo: EngineContribution {
                name: "echo".to_string(),
                strength: echo_strength,
                confidence: ec,
                weight: weights.echo,
                key_insights: highlights(&echo.insights),
                risk_factors: highlights(&echo.risk_factors),
                raw: serde_json::to_value(echo).unwrap_or_default(),
            },
            singularity: EngineContribution {
                name: "singularity".to_string(),
                strength: singularity_strength,
                confidence: sc,
                weight: weights.singularity,
                key_insights: highlights(&singularity.insights),
                risk_factors: highlights(&singularity.risk_factors),
                raw: serde_json::to_value(singularity).unwrap_or_default(),
            },
            authority,
            phase,
            phase_adjusted,
            override_reasons,
            swarm_opinion: finite_or(swarm.opinion, 0.0).clamp(-1.0, 1.0),
            swarm_consensus: finite_or(swarm.consensus_score, 0.0).clamp(0.0, 1.0),
            dissent_reasons: swarm.dissent_reasons.clone(),
        }
    }

    fn clamp_confidence(&self, value: f64) -> f64 {
        let lo = self.config.min_confidence;
        let hi = self.config.max_confidence.max(lo);
        finite_or(value, lo).clamp(lo, hi)
    }
}

/// Missing or non-finite confidences read as the neutral 0.5.
fn sanitize_confidence(value: f64) -> f64 {
    sanitize_confidence_or(value, 0.5)
}

fn sanitize_confidence_or(value: f64, fallback: f64) -> f64 {
    finite_or(value, fallback).clamp(0.0, 1.0)
}

fn highlights(items: &[String]) -> Vec<String> {
    items.iter().take(MAX_HIGHLIGHTS).cloned().collect()
}
