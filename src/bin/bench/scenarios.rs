// Scenario Definitions - market regimes driven through the full engine
// All scenario logic lives in curve functions; the engine is used unmodified

use nexus_engine::{EchoResults, MarketPhase, SingularityResults};

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub ticks: u64,
    /// Std-dev of per-location / per-chain noise.
    pub noise: f64,
    pub sentiment_curve: fn(u64) -> f64,
    pub volatility_curve: fn(u64) -> f64,
    /// Upstream engine outputs for a tick.
    pub upstream_curve: fn(u64) -> (EchoResults, SingularityResults),
    /// Injected CPU reading; `None` keeps a quiet host.
    pub cpu_curve: Option<fn(u64) -> f64>,
    pub criteria: PassCriteria,
}

#[derive(Default)]
pub struct PassCriteria {
    /// Phase must be observed at least once.
    pub must_visit: Option<MarketPhase>,
    /// Phase at the last tick must be one of these.
    pub final_phase_in: Option<&'static [MarketPhase]>,
    pub max_strong_actions: Option<u32>,
    pub require_hibernation: bool,
    pub min_phase_changes: Option<u32>,
    pub max_phase_changes: Option<u32>,
}

// ─── Upstream Helpers ───────────────────────────────────────────────────────

fn echo(signal: &str, confidence: f64, chaos: f64, butterfly: f64, stability: &str) -> EchoResults {
    EchoResults {
        signal: signal.to_string(),
        confidence,
        chaos_index: chaos,
        butterfly_coefficient: butterfly,
        stability: stability.to_string(),
        ..EchoResults::default()
    }
}

fn singularity(action: &str, confidence: f64, strength: Option<f64>) -> SingularityResults {
    SingularityResults {
        trading_action: action.to_string(),
        confidence,
        signal_strength: strength,
        ..SingularityResults::default()
    }
}

// ─── Curve Functions ────────────────────────────────────────────────────────

fn flat_zero(_tick: u64) -> f64 {
    0.0
}

fn calm_volatility(tick: u64) -> f64 {
    0.05 + 0.01 * (tick as f64 / 12.0).sin()
}

fn calm_upstream(_tick: u64) -> (EchoResults, SingularityResults) {
    (echo("HOLD", 0.6, 0.1, 0.1, "stable"), singularity("HOLD", 0.6, None))
}

fn breakout_sentiment(tick: u64) -> f64 {
    let progress = tick as f64 / 48.0;
    0.5 / (1.0 + (-10.0 * (progress - 0.4)).exp())
}

fn breakout_upstream(tick: u64) -> (EchoResults, SingularityResults) {
    if tick < 16 {
        calm_upstream(tick)
    } else {
        (echo("BUY", 0.75, 0.2, 0.2, "stable"), singularity("STRONG_BUY", 0.7, None))
    }
}

fn spike_sentiment(tick: u64) -> f64 {
    if tick < 24 { 0.3 } else { -0.1 }
}

fn spike_volatility(tick: u64) -> f64 {
    if tick < 24 { 0.08 } else { 0.22 }
}

fn spike_upstream(tick: u64) -> (EchoResults, SingularityResults) {
    if tick < 24 {
        (echo("BUY", 0.7, 0.2, 0.2, "stable"), singularity("BUY", 0.65, None))
    } else {
        (echo("SELL", 0.6, 0.5, 0.4, "unstable"), singularity("HOLD", 0.55, None))
    }
}

fn storm_sentiment(tick: u64) -> f64 {
    0.4 * (tick as f64 / 3.0).sin()
}

fn storm_volatility(tick: u64) -> f64 {
    if tick < 20 { 0.1 } else { 0.35 }
}

fn storm_upstream(tick: u64) -> (EchoResults, SingularityResults) {
    if tick < 20 {
        (echo("HOLD", 0.6, 0.3, 0.3, "stable"), singularity("HOLD", 0.6, None))
    } else {
        (
            echo("STRONG_BUY", 0.9, 0.85, 0.9, "unstable"),
            singularity("STRONG_SELL", 0.85, Some(-0.9)),
        )
    }
}

fn conflict_upstream(_tick: u64) -> (EchoResults, SingularityResults) {
    (echo("STRONG_BUY", 0.8, 0.2, 0.2, "stable"), singularity("STRONG_SELL", 0.75, None))
}

fn squeeze_cpu(tick: u64) -> f64 {
    if (24..48).contains(&tick) { 95.0 } else { 30.0 }
}

// ─── Scenario Catalogue ─────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "CALM_MARKET",
            label: "Calm market, neutral engines",
            category: "baseline",
            ticks: 72,
            noise: 0.03,
            sentiment_curve: flat_zero,
            volatility_curve: calm_volatility,
            upstream_curve: calm_upstream,
            cpu_curve: None,
            criteria: PassCriteria {
                final_phase_in: Some(&[MarketPhase::Symmetric]),
                max_strong_actions: Some(0),
                max_phase_changes: Some(0),
                ..PassCriteria::default()
            },
        },
        Scenario {
            name: "BULL_BREAKOUT",
            label: "Sentiment breakout to the upside",
            category: "regime",
            ticks: 72,
            noise: 0.03,
            sentiment_curve: breakout_sentiment,
            volatility_curve: calm_volatility,
            upstream_curve: breakout_upstream,
            cpu_curve: None,
            criteria: PassCriteria {
                must_visit: Some(MarketPhase::BrokenBullish),
                min_phase_changes: Some(1),
                ..PassCriteria::default()
            },
        },
        Scenario {
            name: "VOLATILITY_SPIKE",
            label: "Bullish drift into a volatility spike",
            category: "regime",
            ticks: 48,
            noise: 0.02,
            sentiment_curve: spike_sentiment,
            volatility_curve: spike_volatility,
            upstream_curve: spike_upstream,
            cpu_curve: None,
            criteria: PassCriteria {
                final_phase_in: Some(&[MarketPhase::Transition, MarketPhase::Critical, MarketPhase::Chaotic]),
                min_phase_changes: Some(1),
                ..PassCriteria::default()
            },
        },
        Scenario {
            name: "CHAOS_STORM",
            label: "Chaotic upstream with conflicting engines",
            category: "stress",
            ticks: 48,
            noise: 0.1,
            sentiment_curve: storm_sentiment,
            volatility_curve: storm_volatility,
            upstream_curve: storm_upstream,
            cpu_curve: None,
            criteria: PassCriteria {
                must_visit: Some(MarketPhase::Chaotic),
                ..PassCriteria::default()
            },
        },
        Scenario {
            name: "ENGINE_CONFLICT",
            label: "Strong buy vs strong sell, flat market",
            category: "arbitration",
            ticks: 36,
            noise: 0.03,
            sentiment_curve: flat_zero,
            volatility_curve: calm_volatility,
            upstream_curve: conflict_upstream,
            cpu_curve: None,
            criteria: PassCriteria {
                max_strong_actions: Some(0),
                ..PassCriteria::default()
            },
        },
        Scenario {
            name: "RESOURCE_SQUEEZE",
            label: "Host CPU pinned mid-run",
            category: "swarm",
            ticks: 72,
            noise: 0.05,
            sentiment_curve: flat_zero,
            volatility_curve: calm_volatility,
            upstream_curve: calm_upstream,
            cpu_curve: Some(squeeze_cpu),
            criteria: PassCriteria {
                require_hibernation: true,
                ..PassCriteria::default()
            },
        },
    ]
}
