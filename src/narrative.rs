// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Insight Narrative
//
// Derives the human-facing parts of an insight: risk level, narrative,
// recommendation, action items and watch list.

use serde::{Deserialize, Serialize};

use crate::arbiter::ArbitratedSignal;
use crate::field::SymmetryBreakingEvent;
use crate::phase::PhaseState;
use crate::types::{EchoResults, MarketPhase, RiskLevel, SingularityResults, TradingAction};

// ─── Constants ──────────────────────────────────────────────────────────────

const MAX_ACTION_ITEMS: usize = 5;
const MAX_WATCH_ITEMS: usize = 5;
const MAX_WATCHED_LOCATIONS: usize = 2;

const RISK_CRITICAL_POINTS: u32 = 7;
const RISK_HIGH_POINTS: u32 = 5;
const RISK_MEDIUM_POINTS: u32 = 3;

/// Pending transitions at or above this probability get an action item.
const ACTIONABLE_TRANSITION: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightSummary {
    pub narrative: String,
    pub risk_level: RiskLevel,
    pub risk_points: u32,
    pub recommendation: String,
    pub action_items: Vec<String>,
    pub watch_list: Vec<String>,
}

/// Everything the narrative reads from one tick.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeInput<'a> {
    pub phase: &'a PhaseState,
    pub symmetry_breaking: Option<&'a SymmetryBreakingEvent>,
    pub signal: &'a ArbitratedSignal,
    pub echo: &'a EchoResults,
    pub singularity: &'a SingularityResults,
}

pub fn summarize(input: &NarrativeInput<'_>) -> InsightSummary {
    let risk_points = risk_points(
        input.phase.current_phase,
        input.phase.stability_score,
        input.echo.butterfly_coefficient,
        input.signal.confidence,
    );
    let risk_level = risk_level(risk_points);
    InsightSummary {
        narrative: narrative(input),
        risk_level,
        risk_points,
        recommendation: recommendation(input.signal.action),
        action_items: action_items(input, risk_level),
        watch_list: watch_list(input),
    }
}

// ─── Risk ───────────────────────────────────────────────────────────────────

pub fn risk_points(phase: MarketPhase, stability: f64, butterfly: f64, confidence: f64) -> u32 {
    let phase_risk = match phase {
        MarketPhase::Symmetric => 0,
        MarketPhase::BrokenBullish | MarketPhase::BrokenBearish => 1,
        MarketPhase::Transition => 2,
        MarketPhase::Critical => 3,
        MarketPhase::Chaotic => 4,
    };
    // NaN lands in the riskiest bucket.
    let stability_risk = if !(stability >= 0.3) {
        3
    } else if stability < 0.5 {
        2
    } else if stability < 0.7 {
        1
    } else {
        0
    };
    let butterfly_risk = if butterfly > 0.8 {
        2
    } else if butterfly > 0.5 {
        1
    } else {
        0
    };
    let confidence_risk = if !(confidence >= 0.4) {
        2
    } else if confidence < 0.6 {
        1
    } else {
        0
    };
    phase_risk + stability_risk + butterfly_risk + confidence_risk
}

pub fn risk_level(points: u32) -> RiskLevel {
    if points >= RISK_CRITICAL_POINTS {
        RiskLevel::Critical
    } else if points >= RISK_HIGH_POINTS {
        RiskLevel::High
    } else if points >= RISK_MEDIUM_POINTS {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

// ─── Text ───────────────────────────────────────────────────────────────────

fn narrative(input: &NarrativeInput<'_>) -> String {
    let mut parts = vec![input.phase.current_phase.description().to_string()];

    if let Some(t) = &input.phase.pending_transition {
        let eta = t
            .eta_hours
            .map(|h| format!(", ETA {:.1}h", h))
            .unwrap_or_default();
        parts.push(format!(
            "A {} transition from {} to {} is in view ({:.0}% probability{}).",
            t.transition_type.label(),
            t.from_phase,
            t.to_phase,
            t.probability * 100.0,
            eta
        ));
    }

    if let Some(ev) = input.symmetry_breaking {
        parts.push(format!(
            "Symmetry breaking toward {} detected, triggered by {} ({:+.2}).",
            ev.to_phase, ev.trigger, ev.trigger_value
        ));
    }

    let s = input.signal;
    parts.push(format!(
        "Arbitrated signal: {} at {:.0}% confidence (strength {:+.2}, {}).",
        s.action,
        s.confidence * 100.0,
        s.strength,
        s.authority
    ));
    parts.join(" ")
}

pub fn recommendation(action: TradingAction) -> String {
    let advice = match action {
        TradingAction::StrongBuy => "accumulate with conviction",
        TradingAction::Buy => "build exposure gradually",
        TradingAction::Hold => "hold current exposure",
        TradingAction::Sell => "trim exposure",
        TradingAction::StrongSell => "exit or hedge positions",
    };
    format!("{}: {}", action, advice)
}

fn action_items(input: &NarrativeInput<'_>, risk: RiskLevel) -> Vec<String> {
    let mut items = vec![recommendation(input.signal.action)];

    if risk >= RiskLevel::High {
        items.push(format!("{} risk: tighten stops and cut position sizes", risk.as_str()));
    }
    if let Some(reason) = input.signal.override_reason() {
        items.push(format!("Review override: {}", reason));
    }
    if let Some(t) = &input.phase.pending_transition {
        if t.probability >= ACTIONABLE_TRANSITION && t.to_phase != input.phase.current_phase {
            let within = t.eta_hours.map(|h| format!(" within {:.1}h", h)).unwrap_or_default();
            items.push(format!("Prepare for a {} regime{}", t.to_phase, within));
        }
    }
    if let Some(dissent) = input.signal.dissent_reasons.first() {
        items.push(format!("Swarm dissent: {}", dissent));
    }
    if matches!(input.phase.current_phase, MarketPhase::Critical | MarketPhase::Chaotic) {
        items.push(format!("Avoid new leverage while the market is {}", input.phase.current_phase));
    }

    items.truncate(MAX_ACTION_ITEMS);
    items
}

fn watch_list(input: &NarrativeInput<'_>) -> Vec<String> {
    let mut items: Vec<String> = input
        .echo
        .critical_locations
        .iter()
        .filter(|l| !l.name.is_empty())
        .take(MAX_WATCHED_LOCATIONS)
        .map(|l| format!("Location {}", l.name))
        .collect();

    if let Some(ev) = input.symmetry_breaking {
        items.push(format!("Trigger {} ({:+.2})", ev.trigger, ev.trigger_value));
    }
    if let Some(t) = &input.phase.pending_transition {
        items.push(format!("Phase {} ({:.0}%)", t.to_phase, t.probability * 100.0));
    }
    for risk in input.echo.risk_factors.iter().chain(input.singularity.risk_factors.iter()) {
        if !items.iter().any(|i| i == risk) {
            items.push(risk.clone());
        }
    }

    items.truncate(MAX_WATCH_ITEMS);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_points_thresholds() {
        assert_eq!(risk_level(risk_points(MarketPhase::Symmetric, 0.9, 0.1, 0.9)), RiskLevel::Low);
        assert_eq!(risk_points(MarketPhase::Transition, 0.6, 0.1, 0.9), 3);
        assert_eq!(risk_level(3), RiskLevel::Medium);
        assert_eq!(risk_points(MarketPhase::Critical, 0.45, 0.1, 0.9), 5);
        assert_eq!(risk_level(5), RiskLevel::High);
        assert_eq!(risk_points(MarketPhase::Chaotic, 0.2, 0.9, 0.3), 11);
        assert_eq!(risk_level(11), RiskLevel::Critical);
    }

    #[test]
    fn nan_inputs_count_as_risky() {
        assert_eq!(risk_points(MarketPhase::Symmetric, f64::NAN, f64::NAN, f64::NAN), 5);
    }

    #[test]
    fn recommendation_names_action() {
        assert!(recommendation(TradingAction::Sell).starts_with("SELL:"));
    }
}
