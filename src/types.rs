// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Type Definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{NexusError, Result};

// ─── Market Phase ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketPhase {
    Symmetric,
    Transition,
    BrokenBullish,
    BrokenBearish,
    Critical,
    Chaotic,
}

impl Default for MarketPhase {
    fn default() -> Self { MarketPhase::Symmetric }
}

impl MarketPhase {
    pub const ALL: [MarketPhase; 6] = [
        Self::Symmetric,
        Self::Transition,
        Self::BrokenBullish,
        Self::BrokenBearish,
        Self::Critical,
        Self::Chaotic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symmetric => "SYMMETRIC",
            Self::Transition => "TRANSITION",
            Self::BrokenBullish => "BROKEN_BULLISH",
            Self::BrokenBearish => "BROKEN_BEARISH",
            Self::Critical => "CRITICAL",
            Self::Chaotic => "CHAOTIC",
        }
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, Self::BrokenBullish | Self::BrokenBearish)
    }

    /// Phases in which the swarm is scaled up past its baseline.
    pub fn is_turbulent(&self) -> bool {
        matches!(self, Self::Critical | Self::Chaotic | Self::Transition)
    }

    /// One-sentence regime description used by the insight narrative.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Symmetric => "Market is in a symmetric, directionless regime with no dominant consensus.",
            Self::Transition => "Market is transitioning between regimes; consensus is forming or dissolving.",
            Self::BrokenBullish => "Symmetry is broken to the upside: a stable bullish consensus holds.",
            Self::BrokenBearish => "Symmetry is broken to the downside: a stable bearish consensus holds.",
            Self::Critical => "Market sits at a critical point where small shocks propagate widely.",
            Self::Chaotic => "Market is chaotic: consensus magnitude is swinging without a stable attractor.",
        }
    }
}

impl std::fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Trading Action ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingAction {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Default for TradingAction {
    fn default() -> Self { TradingAction::Hold }
}

impl TradingAction {
    /// Lenient parse of upstream signal strings. Unknown values map to HOLD.
    pub fn parse(raw: &str) -> Self {
        let norm = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "STRONG_BUY" => Self::StrongBuy,
            "BUY" => Self::Buy,
            "SELL" => Self::Sell,
            "STRONG_SELL" => Self::StrongSell,
            _ => Self::Hold,
        }
    }

    /// Numeric strength of a discrete signal.
    pub fn strength(&self) -> f64 {
        match self {
            Self::StrongBuy => 0.8,
            Self::Buy => 0.4,
            Self::Hold => 0.0,
            Self::Sell => -0.4,
            Self::StrongSell => -0.8,
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, Self::StrongBuy | Self::StrongSell)
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, Self::StrongBuy | Self::Buy)
    }

    /// STRONG_* demoted to the plain action; others unchanged.
    pub fn demoted(&self) -> Self {
        match self {
            Self::StrongBuy => Self::Buy,
            Self::StrongSell => Self::Sell,
            other => *other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        }
    }
}

impl std::fmt::Display for TradingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Upstream Stability ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Unstable,
    Critical,
}

impl Default for Stability {
    fn default() -> Self { Stability::Stable }
}

impl Stability {
    /// Lenient parse; unknown values are treated as stable.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "unstable" => Self::Unstable,
            _ => Self::Stable,
        }
    }
}

// ─── Enumerations shared across components ──────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineAuthority {
    EchoDominant,
    SingularityDominant,
    Balanced,
    NexusOverride,
}

impl EngineAuthority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EchoDominant => "ECHO_DOMINANT",
            Self::SingularityDominant => "SINGULARITY_DOMINANT",
            Self::Balanced => "BALANCED",
            Self::NexusOverride => "NEXUS_OVERRIDE",
        }
    }
}

impl std::fmt::Display for EngineAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Active,
    Hibernating,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionType {
    FirstOrder,
    SecondOrder,
    Crossover,
}

impl TransitionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FirstOrder => "first-order",
            Self::SecondOrder => "second-order",
            Self::Crossover => "crossover",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Stopped,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        }
    }
}

// ─── Upstream Inputs ─────────────────────────────────────────────────────────

fn default_confidence() -> f64 { 0.5 }

fn default_signal() -> String { "HOLD".to_string() }

fn default_stability() -> String { "stable".to_string() }

/// A location flagged by the Echo engine. Extra fields pass through.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CriticalLocation {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Output of the Echo propagation engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EchoResults {
    #[serde(default = "default_signal")]
    pub signal: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub chaos_index: f64,
    #[serde(default)]
    pub butterfly_coefficient: f64,
    #[serde(default = "default_stability")]
    pub stability: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub critical_locations: Vec<CriticalLocation>,
}

impl Default for EchoResults {
    fn default() -> Self {
        Self {
            signal: default_signal(),
            confidence: default_confidence(),
            chaos_index: 0.0,
            butterfly_coefficient: 0.0,
            stability: default_stability(),
            insights: Vec::new(),
            risk_factors: Vec::new(),
            critical_locations: Vec::new(),
        }
    }
}

impl EchoResults {
    pub fn from_value(value: &Value) -> Result<Self> {
        parse_payload(value, "echo_results")
    }

    pub fn action(&self) -> TradingAction {
        TradingAction::parse(&self.signal)
    }

    pub fn stability_level(&self) -> Stability {
        Stability::parse(&self.stability)
    }
}

/// Output of the Singularity pattern engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingularityResults {
    #[serde(default = "default_signal")]
    pub trading_action: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Absent strength falls back to the strength of `trading_action`.
    #[serde(default)]
    pub signal_strength: Option<f64>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for SingularityResults {
    fn default() -> Self {
        Self {
            trading_action: default_signal(),
            confidence: default_confidence(),
            signal_strength: None,
            insights: Vec::new(),
            risk_factors: Vec::new(),
            patterns: Vec::new(),
        }
    }
}

impl SingularityResults {
    pub fn from_value(value: &Value) -> Result<Self> {
        parse_payload(value, "singularity_results")
    }

    pub fn action(&self) -> TradingAction {
        TradingAction::parse(&self.trading_action)
    }

    pub fn strength(&self) -> f64 {
        match self.signal_strength {
            Some(s) if s.is_finite() => s.clamp(-1.0, 1.0),
            _ => self.action().strength(),
        }
    }

    /// Upstream flagged an anomaly or divergence pattern.
    pub fn has_disruptive_pattern(&self) -> bool {
        self.patterns.iter().any(|p| {
            let p = p.to_ascii_lowercase();
            p.contains("anomaly") || p.contains("divergence")
        })
    }
}

/// Raw market observables for one tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketData {
    #[serde(default)]
    pub location_sentiments: BTreeMap<String, f64>,
    #[serde(default)]
    pub chain_sentiments: BTreeMap<String, f64>,
    #[serde(default)]
    pub ratings: Vec<f64>,
    #[serde(default)]
    pub volatility: f64,
}

impl MarketData {
    pub fn from_value(value: &Value) -> Result<Self> {
        let data: Self = parse_payload(value, "market_data")?;
        data.validate()?;
        Ok(data)
    }

    /// Reject observables that cannot be fed to the field model.
    pub fn validate(&self) -> Result<()> {
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(NexusError::invalid_input(
                "volatility",
                format!("expected a finite non-negative number, got {}", self.volatility),
            ));
        }
        let sentiments = self.location_sentiments.iter().chain(self.chain_sentiments.iter());
        for (id, v) in sentiments {
            if !v.is_finite() {
                return Err(NexusError::invalid_input(
                    "sentiments",
                    format!("sentiment for `{}` is not finite", id),
                ));
            }
        }
        if let Some((i, r)) = self.ratings.iter().enumerate().find(|(_, r)| !r.is_finite()) {
            return Err(NexusError::invalid_input(
                "ratings",
                format!("rating at index {} is not finite ({})", i, r),
            ));
        }
        Ok(())
    }

    pub fn location_values(&self) -> Vec<f64> {
        self.location_sentiments.values().copied().collect()
    }

    pub fn chain_values(&self) -> Vec<f64> {
        self.chain_sentiments.values().copied().collect()
    }
}

fn parse_payload<T>(value: &Value, field: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match value {
        Value::Null => Ok(T::default()),
        Value::Object(_) => serde_json::from_value(value.clone())
            .map_err(|e| NexusError::invalid_input(field, e.to_string())),
        other => Err(NexusError::invalid_input(
            field,
            format!("expected an object, got {}", json_kind(other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trading_action_parse_is_lenient() {
        assert_eq!(TradingAction::parse("strong_buy"), TradingAction::StrongBuy);
        assert_eq!(TradingAction::parse("Strong Sell"), TradingAction::StrongSell);
        assert_eq!(TradingAction::parse("SELL"), TradingAction::Sell);
        assert_eq!(TradingAction::parse("moon"), TradingAction::Hold);
    }

    #[test]
    fn strength_mapping_is_symmetric() {
        assert!((TradingAction::StrongBuy.strength() - 0.8).abs() < 1e-12);
        assert!((TradingAction::StrongSell.strength() + 0.8).abs() < 1e-12);
        assert_eq!(TradingAction::Hold.strength(), 0.0);
    }

    #[test]
    fn echo_defaults_fill_missing_fields() {
        let echo = EchoResults::from_value(&json!({ "signal": "BUY" })).unwrap();
        assert_eq!(echo.action(), TradingAction::Buy);
        assert!((echo.confidence - 0.5).abs() < 1e-12);
        assert_eq!(echo.stability_level(), Stability::Stable);
        assert!(echo.insights.is_empty());
    }

    #[test]
    fn null_payload_uses_defaults() {
        let sing = SingularityResults::from_value(&Value::Null).unwrap();
        assert_eq!(sing.action(), TradingAction::Hold);
        assert_eq!(sing.strength(), 0.0);
    }

    #[test]
    fn critical_locations_keep_extra_fields() {
        let echo = EchoResults::from_value(&json!({
            "critical_locations": [{ "name": "Austin", "score": 0.9 }]
        }))
        .unwrap();
        assert_eq!(echo.critical_locations[0].name, "Austin");
        assert_eq!(echo.critical_locations[0].extra["score"], json!(0.9));
    }

    #[test]
    fn non_numeric_volatility_is_rejected() {
        let err = MarketData::from_value(&json!({ "volatility": "high" })).unwrap_err();
        assert!(matches!(err, NexusError::InvalidInput { ref field, .. } if field == "market_data"));
    }

    #[test]
    fn negative_volatility_is_rejected() {
        let err = MarketData::from_value(&json!({ "volatility": -0.2 })).unwrap_err();
        assert!(matches!(err, NexusError::InvalidInput { ref field, .. } if field == "volatility"));
    }

    #[test]
    fn non_finite_rating_is_rejected() {
        let data = MarketData {
            ratings: vec![4.0, f64::NAN],
            ..MarketData::default()
        };
        let err = data.validate().unwrap_err();
        assert!(matches!(err, NexusError::InvalidInput { ref field, .. } if field == "ratings"));

        let data = MarketData {
            ratings: vec![f64::INFINITY],
            ..MarketData::default()
        };
        assert!(data.validate().is_err());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(EchoResults::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn disruptive_patterns_match_case_insensitively() {
        let sing = SingularityResults {
            patterns: vec!["Volume Divergence".into()],
            ..SingularityResults::default()
        };
        assert!(sing.has_disruptive_pattern());
    }

    #[test]
    fn turbulent_phases_exclude_ordered_and_symmetric() {
        let turbulent: Vec<MarketPhase> = MarketPhase::ALL.iter().copied().filter(|p| p.is_turbulent()).collect();
        assert_eq!(turbulent, vec![MarketPhase::Transition, MarketPhase::Critical, MarketPhase::Chaotic]);
    }

    #[test]
    fn phase_serializes_screaming_case() {
        let s = serde_json::to_string(&MarketPhase::BrokenBullish).unwrap();
        assert_eq!(s, "\"BROKEN_BULLISH\"");
    }
}
