// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Field Dynamics
//
// Quartic double-well potential over a D-dimensional order parameter:
//
//   V(φ)  = -μ²|φ|² + λ|φ|⁴
//   ∇V    = -2μ²φ + 4λ|φ|²φ
//   m²    = -2μ² + 12λ|φ|²
//
// Aggregated sentiment places the market at a point φ; temperature is
// mapped from volatility. The origin is a local maximum (m² < 0) and the
// shell |φ| = v is the stable vacuum (m² > 0).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::config::FieldConfig;
use crate::stats::{self, push_and_trim};
use crate::types::MarketPhase;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Sentiment dispersion at which consensus is considered lost entirely.
const CONSENSUS_STD_SCALE: f64 = 0.5;

/// Share of the rating bias in the padded mean sentiment.
const RATING_BLEND: f64 = 0.2;
const RATING_MIDPOINT: f64 = 3.0;
const RATING_HALF_RANGE: f64 = 2.0;

/// Positions are clamped to this multiple of the vacuum radius.
const MAX_RADIUS_FACTOR: f64 = 2.0;

/// Chaotic when recent magnitude std exceeds this fraction of v.
const CHAOS_STD_FACTOR: f64 = 0.3;
const CHAOS_MIN_SAMPLES: usize = 5;

/// Vectors averaged to decide the direction of a broken phase.
const DIRECTION_WINDOW: usize = 3;

const SUSCEPTIBILITY_SCALE: f64 = 0.05;
const SUSCEPTIBILITY_MAX: f64 = 1.0;
const CORRELATION_MAX: f64 = 10.0;
const DIVERGENCE_EPS: f64 = 1e-6;

/// Reduced temperature distance at which thermal stability saturates.
const THERMAL_STABILITY_SPAN: f64 = 0.5;

const SYMMETRY_WINDOW: usize = 5;
const BROKEN_ONSET_FACTOR: f64 = 0.5;
const SYMMETRIC_PRIOR_FACTOR: f64 = 0.3;

/// Trends smaller than this are treated as flat.
const TREND_EPSILON: f64 = 0.005;
const PREDICTION_BASE: f64 = 0.3;
const PREDICTION_TREND_GAIN: f64 = 5.0;
const PREDICTION_CAP: f64 = 0.9;
const PREDICTION_DEFAULT: f64 = 0.1;

// ─── Snapshots ──────────────────────────────────────────────────────────────

/// Immutable evaluation of the potential at one position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldPotential {
    pub position: Vec<f64>,
    pub potential: f64,
    pub gradient: Vec<f64>,
    pub curvature: f64,
    /// |φ| - v
    pub distance_from_vacuum: f64,
    pub vacuum_radius: f64,
}

impl FieldPotential {
    pub fn magnitude(&self) -> f64 {
        norm(&self.position)
    }
}

/// Thermodynamic view of the field for one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldState {
    pub potential: FieldPotential,
    pub temperature: f64,
    pub critical_temperature: f64,
    /// 0 = disordered, 1 = fully ordered.
    pub order_parameter: f64,
    pub susceptibility: f64,
    pub correlation_length: f64,
    /// Raw phase read from the field before upstream overrides.
    pub phase: MarketPhase,
    pub is_critical: bool,
    pub phase_stability: f64,
}

impl FieldState {
    /// T/Tc - 1
    pub fn reduced_temperature(&self) -> f64 {
        if self.critical_temperature.abs() < f64::EPSILON {
            0.0
        } else {
            self.temperature / self.critical_temperature - 1.0
        }
    }
}

/// Move from a near-zero consensus to a large directional one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymmetryBreakingEvent {
    pub timestamp: DateTime<Utc>,
    pub from_phase: MarketPhase,
    pub to_phase: MarketPhase,
    pub order_before: f64,
    pub order_after: f64,
    pub magnitude: f64,
    /// `location:<id>`, `chain:<id>` or `market`.
    pub trigger: String,
    pub trigger_value: f64,
}

// ─── Field Dynamics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FieldDynamics {
    config: FieldConfig,
    vacuum_radius: f64,
    positions: VecDeque<Vec<f64>>,
    magnitudes: VecDeque<f64>,
    last_phase: MarketPhase,
    last_order: f64,
}

impl FieldDynamics {
    pub fn new(config: FieldConfig) -> Self {
        let vacuum_radius = (config.mu_squared / (2.0 * config.lambda)).sqrt();
        Self {
            positions: VecDeque::with_capacity(config.history_size),
            magnitudes: VecDeque::with_capacity(config.history_size),
            config,
            vacuum_radius,
            last_phase: MarketPhase::Symmetric,
            last_order: 0.0,
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn vacuum_radius(&self) -> f64 {
        self.vacuum_radius
    }

    pub fn last_phase(&self) -> MarketPhase {
        self.last_phase
    }

    pub fn history_len(&self) -> usize {
        self.positions.len()
    }

    // --- Potential surface ---------------------------------------------------

    pub fn potential(&self, phi: &[f64]) -> f64 {
        let r2 = norm_sq(phi);
        -self.config.mu_squared * r2 + self.config.lambda * r2 * r2
    }

    pub fn gradient(&self, phi: &[f64]) -> Vec<f64> {
        let r2 = norm_sq(phi);
        let k = -2.0 * self.config.mu_squared + 4.0 * self.config.lambda * r2;
        phi.iter().map(|x| k * x).collect()
    }

    /// Effective mass squared.
    pub fn curvature(&self, phi: &[f64]) -> f64 {
        -2.0 * self.config.mu_squared + 12.0 * self.config.lambda * norm_sq(phi)
    }

    pub fn evaluate(&self, phi: &[f64]) -> FieldPotential {
        FieldPotential {
            position: phi.to_vec(),
            potential: self.potential(phi),
            gradient: self.gradient(phi),
            curvature: self.curvature(phi),
            distance_from_vacuum: norm(phi) - self.vacuum_radius,
            vacuum_radius: self.vacuum_radius,
        }
    }

    // --- Tick update -----------------------------------------------------------

    /// Place the market in order-parameter space and classify its phase.
    pub fn update(
        &mut self,
        sentiments: &[f64],
        ratings: &[f64],
        volatility: f64,
        chain_sentiments: &[f64],
    ) -> FieldState {
        let volatility = stats::finite_or(volatility, 0.0).max(0.0);
        let temperature = volatility * self.config.temperature_scale;
        let critical_temperature = self.config.critical_volatility * self.config.temperature_scale;

        let position = self.build_position(sentiments, ratings, chain_sentiments);
        let magnitude = norm(&position);
        push_and_trim(&mut self.positions, position.clone(), self.config.history_size);
        push_and_trim(&mut self.magnitudes, magnitude, self.config.history_size);

        let v = self.vacuum_radius;
        let reduced_t = temperature / critical_temperature - 1.0;
        let reduced_d = (magnitude - v) / v;
        let r = reduced_t.abs().min(reduced_d.abs());
        let susceptibility = (SUSCEPTIBILITY_SCALE / (r + DIVERGENCE_EPS)).min(SUSCEPTIBILITY_MAX);
        let correlation_length = (1.0 / (r + DIVERGENCE_EPS).sqrt()).min(CORRELATION_MAX);

        let phase = self.classify(temperature, critical_temperature, magnitude);
        let is_critical = reduced_t.abs() < self.config.critical_band;
        let thermal = (reduced_t.abs() / THERMAL_STABILITY_SPAN).min(1.0);
        let phase_stability = (0.5 * thermal + 0.5 * (1.0 - susceptibility)).clamp(0.0, 1.0);
        let order_parameter = (magnitude / v).min(1.0);

        self.last_phase = phase;
        self.last_order = order_parameter;

        FieldState {
            potential: self.evaluate(&position),
            temperature,
            critical_temperature,
            order_parameter,
            susceptibility,
            correlation_length,
            phase,
            is_critical,
            phase_stability,
        }
    }

    fn build_position(&self, sentiments: &[f64], ratings: &[f64], chain_sentiments: &[f64]) -> Vec<f64> {
        let dim = self.config.dimension;
        let v = self.vacuum_radius;
        // Non-finite observables are dropped, never averaged.
        let sentiments = finite_only(sentiments);
        let ratings = finite_only(ratings);
        let chain_sentiments = finite_only(chain_sentiments);
        let source: Vec<f64> = if chain_sentiments.is_empty() {
            sentiments.iter().map(|s| s.clamp(-1.0, 1.0)).collect()
        } else {
            chain_sentiments.iter().map(|s| s.clamp(-1.0, 1.0)).collect()
        };

        let consensus = 1.0 - (stats::std_dev(&source) / CONSENSUS_STD_SCALE).min(1.0);

        let mut mean_sentiment = if sentiments.is_empty() {
            stats::mean(&source)
        } else {
            stats::mean(&sentiments).clamp(-1.0, 1.0)
        };
        if !ratings.is_empty() {
            let bias = ((stats::mean(&ratings) - RATING_MIDPOINT) / RATING_HALF_RANGE).clamp(-1.0, 1.0);
            mean_sentiment = (1.0 - RATING_BLEND) * mean_sentiment + RATING_BLEND * bias;
        }

        // Chains beyond D fold onto dimension i mod D.
        let mut sums = vec![0.0; dim];
        let mut counts = vec![0usize; dim];
        for (i, s) in source.iter().enumerate() {
            sums[i % dim] += s;
            counts[i % dim] += 1;
        }
        let mut phi: Vec<f64> = (0..dim)
            .map(|i| {
                let base = if counts[i] > 0 { sums[i] / counts[i] as f64 } else { mean_sentiment };
                base * consensus * v
            })
            .collect();

        let max_radius = MAX_RADIUS_FACTOR * v;
        let magnitude = norm(&phi);
        if magnitude > max_radius {
            let k = max_radius / magnitude;
            phi.iter_mut().for_each(|x| *x *= k);
        }
        phi
    }

    fn classify(&self, temperature: f64, critical_temperature: f64, magnitude: f64) -> MarketPhase {
        let v = self.vacuum_radius;
        let band = self.config.critical_band;

        let recent = stats::tail(&self.magnitudes, self.config.chaos_window);
        if recent.len() >= CHAOS_MIN_SAMPLES.min(self.config.chaos_window)
            && stats::std_dev(&recent) > CHAOS_STD_FACTOR * v
        {
            return MarketPhase::Chaotic;
        }

        if (temperature / critical_temperature - 1.0).abs() < band {
            return MarketPhase::Critical;
        }

        let ratio = magnitude / v;
        if temperature > critical_temperature * (1.0 + band) {
            return if ratio < self.config.symmetric_threshold {
                MarketPhase::Symmetric
            } else {
                MarketPhase::Transition
            };
        }

        if ratio > self.config.vacuum_threshold {
            return if self.recent_direction(DIRECTION_WINDOW) >= 0.0 {
                MarketPhase::BrokenBullish
            } else {
                MarketPhase::BrokenBearish
            };
        }

        MarketPhase::Transition
    }

    /// Mean component of the last `n` position vectors.
    fn recent_direction(&self, n: usize) -> f64 {
        let skip = self.positions.len().saturating_sub(n);
        let (sum, count) = self
            .positions
            .iter()
            .skip(skip)
            .flat_map(|p| p.iter())
            .fold((0.0_f64, 0usize), |(s, c), x| (s + *x, c + 1));
        if count == 0 { 0.0 } else { sum / count as f64 }
    }

    // --- Symmetry breaking -------------------------------------------------------

    /// Fires when the mean magnitude over the last five ticks reaches half the
    /// vacuum radius after five ticks spent below 0.3v.
    pub fn detect_symmetry_breaking(
        &self,
        location_sentiments: &BTreeMap<String, f64>,
        chain_sentiments: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Option<SymmetryBreakingEvent> {
        if self.magnitudes.len() < 2 * SYMMETRY_WINDOW {
            return None;
        }
        let window = stats::tail(&self.magnitudes, 2 * SYMMETRY_WINDOW);
        let prior = stats::mean(&window[..SYMMETRY_WINDOW]);
        let recent = stats::mean(&window[SYMMETRY_WINDOW..]);
        let v = self.vacuum_radius;
        if recent < BROKEN_ONSET_FACTOR * v || prior >= SYMMETRIC_PRIOR_FACTOR * v {
            return None;
        }

        let to_phase = if self.recent_direction(SYMMETRY_WINDOW) >= 0.0 {
            MarketPhase::BrokenBullish
        } else {
            MarketPhase::BrokenBearish
        };
        let (trigger, trigger_value) = attribute_trigger(location_sentiments, chain_sentiments);

        Some(SymmetryBreakingEvent {
            timestamp: now,
            from_phase: MarketPhase::Symmetric,
            to_phase,
            order_before: (prior / v).min(1.0),
            order_after: (recent / v).min(1.0),
            magnitude: recent - prior,
            trigger,
            trigger_value,
        })
    }

    // --- Prediction ------------------------------------------------------------

    /// Extrapolate where the field is heading from volatility and sentiment
    /// trends. Returns `(probability, predicted_phase)`.
    pub fn predict_transition(&self, volatility_trend: f64, sentiment_momentum: f64) -> (f64, MarketPhase) {
        let vt = stats::finite_or(volatility_trend, 0.0);
        let sm = stats::finite_or(sentiment_momentum, 0.0);
        let near_symmetric = self.last_phase == MarketPhase::Symmetric
            || self.last_order < self.config.symmetric_threshold;

        if self.last_phase.is_broken() && vt > TREND_EPSILON {
            let p = (PREDICTION_BASE + vt * PREDICTION_TREND_GAIN).min(PREDICTION_CAP);
            return (p, MarketPhase::Transition);
        }
        if near_symmetric && vt < -TREND_EPSILON {
            let p = (PREDICTION_BASE + vt.abs() * PREDICTION_TREND_GAIN + sm.abs()).min(PREDICTION_CAP);
            let phase = if sm >= 0.0 { MarketPhase::BrokenBullish } else { MarketPhase::BrokenBearish };
            return (p, phase);
        }
        (PREDICTION_DEFAULT, MarketPhase::Symmetric)
    }
}

/// Largest absolute chain or location sentiment; a location wins only when
/// its deviation is strictly larger.
fn attribute_trigger(
    location_sentiments: &BTreeMap<String, f64>,
    chain_sentiments: &BTreeMap<String, f64>,
) -> (String, f64) {
    match (max_abs_entry(location_sentiments), max_abs_entry(chain_sentiments)) {
        (Some((lk, lv)), Some((_, cv))) if lv.abs() > cv.abs() => (format!("location:{}", lk), lv),
        (_, Some((ck, cv))) => (format!("chain:{}", ck), cv),
        (Some((lk, lv)), None) => (format!("location:{}", lk), lv),
        (None, None) => ("market".to_string(), 0.0),
    }
}

fn max_abs_entry(m: &BTreeMap<String, f64>) -> Option<(&String, f64)> {
    m.iter()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(&String, f64)>, (k, v)| match best {
            Some((_, b)) if b.abs() >= v.abs() => best,
            _ => Some((k, *v)),
        })
}

fn norm_sq(phi: &[f64]) -> f64 {
    phi.iter().map(|x| x * x).sum()
}

fn finite_only(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|x| x.is_finite()).collect()
}

fn norm(phi: &[f64]) -> f64 {
    norm_sq(phi).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> FieldDynamics {
        FieldDynamics::new(FieldConfig::default())
    }

    fn on_shell(dim: usize, radius: f64) -> Vec<f64> {
        let c = radius / (dim as f64).sqrt();
        vec![c; dim]
    }

    fn chains(values: &[f64]) -> Vec<f64> {
        values.to_vec()
    }

    #[test]
    fn curvature_flips_sign_between_origin_and_vacuum() {
        let f = field();
        let origin = vec![0.0; 8];
        let vacuum = on_shell(8, f.vacuum_radius());
        assert!(f.curvature(&origin) < 0.0);
        assert!(f.curvature(&vacuum) > 0.0);
    }

    #[test]
    fn vacuum_lies_below_origin() {
        let f = field();
        assert_eq!(f.potential(&vec![0.0; 8]), 0.0);
        for dim in [1usize, 3, 8] {
            let fd = FieldDynamics::new(FieldConfig { dimension: dim, ..FieldConfig::default() });
            let phi = on_shell(dim, fd.vacuum_radius());
            assert!(fd.potential(&phi) < 0.0, "dim {}", dim);
        }
    }

    #[test]
    fn gradient_vanishes_on_vacuum_shell() {
        let f = field();
        let g = f.gradient(&on_shell(8, f.vacuum_radius()));
        assert!(g.iter().all(|x| x.abs() < 1e-9));
    }

    #[test]
    fn potential_is_rotationally_symmetric() {
        let f = field();
        let a = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let b = on_shell(8, 1.0);
        let c = vec![0.0, 0.0, -0.6, 0.0, 0.8, 0.0, 0.0, 0.0];
        assert!((f.potential(&a) - f.potential(&b)).abs() < 1e-12);
        assert!((f.potential(&a) - f.potential(&c)).abs() < 1e-12);
    }

    #[test]
    fn position_norm_clamped_to_twice_vacuum() {
        let mut f = FieldDynamics::new(FieldConfig { lambda: 2.0, ..FieldConfig::default() });
        let state = f.update(&[1.0], &[], 0.05, &chains(&[1.0, 1.0, 1.0, 1.0]));
        let v = f.vacuum_radius();
        assert!(state.potential.magnitude() <= 2.0 * v + 1e-9);
    }

    #[test]
    fn consensus_shrinks_position_when_chains_disagree() {
        let mut agree = field();
        let mut split = field();
        let a = agree.update(&[0.0], &[], 0.05, &chains(&[0.4, 0.4, 0.4, 0.4]));
        let s = split.update(&[0.0], &[], 0.05, &chains(&[0.9, -0.9, 0.9, -0.9]));
        assert!(a.potential.magnitude() > s.potential.magnitude());
        assert!(s.potential.magnitude() < 1e-9, "full dispersion kills consensus");
    }

    #[test]
    fn hot_flat_market_is_symmetric() {
        let mut f = field();
        let state = f.update(&[0.02, -0.01], &[], 0.40, &chains(&[0.01, 0.0, -0.02]));
        assert_eq!(state.phase, MarketPhase::Symmetric);
    }

    #[test]
    fn hot_directional_market_is_transition() {
        let mut f = field();
        let state = f.update(&[0.3], &[], 0.40, &chains(&[0.3, 0.3, 0.3]));
        assert_eq!(state.phase, MarketPhase::Transition);
    }

    #[test]
    fn cold_ordered_market_breaks_by_direction() {
        let mut bull = field();
        let mut bear = field();
        assert_eq!(bull.update(&[0.3], &[], 0.05, &chains(&[0.3; 4])).phase, MarketPhase::BrokenBullish);
        assert_eq!(bear.update(&[-0.3], &[], 0.05, &chains(&[-0.3; 4])).phase, MarketPhase::BrokenBearish);
    }

    #[test]
    fn cold_weak_market_is_transition() {
        let mut f = field();
        let state = f.update(&[0.05], &[], 0.05, &chains(&[0.05; 4]));
        assert_eq!(state.phase, MarketPhase::Transition);
    }

    #[test]
    fn volatility_near_critical_is_critical() {
        let mut f = field();
        let state = f.update(&[0.3], &[], 0.21, &chains(&[0.3; 4]));
        assert_eq!(state.phase, MarketPhase::Critical);
        assert!(state.is_critical);
    }

    #[test]
    fn swinging_magnitudes_are_chaotic() {
        let mut f = field();
        let mut last = None;
        for i in 0..10 {
            let s = if i % 2 == 0 { 0.5 } else { 0.0 };
            last = Some(f.update(&[s], &[], 0.05, &chains(&[s; 4])));
        }
        assert_eq!(last.unwrap().phase, MarketPhase::Chaotic);
    }

    #[test]
    fn susceptibility_diverges_near_critical_temperature() {
        let mut near = field();
        let mut far = field();
        let n = near.update(&[0.0], &[], 0.2001, &chains(&[0.0; 4]));
        let f = far.update(&[0.0], &[], 0.05, &chains(&[0.0; 4]));
        assert!((n.susceptibility - 1.0).abs() < 1e-9);
        assert!((n.correlation_length - 10.0).abs() < 1e-9);
        assert!(f.susceptibility < 0.2);
        assert!(f.correlation_length < 10.0);
    }

    #[test]
    fn susceptibility_diverges_near_vacuum_shell() {
        let mut f = field();
        let v = f.vacuum_radius();
        // all eight dimensions equal → |φ| = s·v·√8; pick s so |φ| = v
        let s = 1.0 / (8.0f64).sqrt();
        let state = f.update(&[s], &[], 0.01, &chains(&[s; 8]));
        assert!((state.potential.magnitude() - v).abs() < 1e-9);
        assert!((state.susceptibility - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ratings_shift_padded_dimensions() {
        let mut plain = field();
        let mut rated = field();
        let a = plain.update(&[], &[], 0.05, &[]);
        let b = rated.update(&[], &[5.0, 5.0], 0.05, &[]);
        assert!(a.potential.magnitude() < 1e-12);
        assert!(b.potential.position.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn non_finite_ratings_do_not_poison_the_field() {
        let mut f = field();
        let state = f.update(&[0.3], &[f64::NAN, 5.0], 0.05, &chains(&[0.3; 4]));
        assert!(state.potential.potential.is_finite());
        assert!(state.potential.magnitude().is_finite());
        assert_eq!(state.phase, MarketPhase::BrokenBullish);

        let next = f.update(&[0.3], &[4.0], 0.05, &chains(&[0.3; 4]));
        assert_eq!(next.phase, MarketPhase::BrokenBullish);
    }

    #[test]
    fn chaos_needs_a_minimum_sample_count() {
        let mut f = field();
        let mut phases = Vec::new();
        for i in 0..4 {
            let s = if i % 2 == 0 { 0.5 } else { 0.0 };
            phases.push(f.update(&[s], &[], 0.05, &chains(&[s; 4])).phase);
        }
        assert!(phases.iter().all(|p| *p != MarketPhase::Chaotic));
        let fifth = f.update(&[0.5], &[], 0.05, &chains(&[0.5; 4]));
        assert_eq!(fifth.phase, MarketPhase::Chaotic);
    }

    #[test]
    fn symmetry_breaking_fires_after_quiet_then_ordered() {
        let mut f = field();
        for _ in 0..5 {
            f.update(&[0.0], &[], 0.05, &chains(&[0.0; 4]));
        }
        for _ in 0..5 {
            f.update(&[0.3], &[], 0.05, &chains(&[0.3; 4]));
        }
        let mut locs = BTreeMap::new();
        locs.insert("austin".to_string(), 0.2);
        let mut chs = BTreeMap::new();
        chs.insert("acme".to_string(), 0.3);
        let ev = f.detect_symmetry_breaking(&locs, &chs, Utc::now()).expect("event");
        assert_eq!(ev.to_phase, MarketPhase::BrokenBullish);
        assert_eq!(ev.trigger, "chain:acme");
        assert!(ev.order_after > ev.order_before);
    }

    #[test]
    fn symmetry_breaking_silent_when_already_ordered() {
        let mut f = field();
        for _ in 0..10 {
            f.update(&[0.3], &[], 0.05, &chains(&[0.3; 4]));
        }
        assert!(f.detect_symmetry_breaking(&BTreeMap::new(), &BTreeMap::new(), Utc::now()).is_none());
    }

    #[test]
    fn trigger_prefers_location_only_when_strictly_larger() {
        let mut locs = BTreeMap::new();
        let mut chs = BTreeMap::new();
        locs.insert("paris".to_string(), -0.6);
        chs.insert("brew".to_string(), 0.6);
        assert_eq!(attribute_trigger(&locs, &chs).0, "chain:brew");
        locs.insert("oslo".to_string(), 0.7);
        let (trigger, value) = attribute_trigger(&locs, &chs);
        assert_eq!(trigger, "location:oslo");
        assert!((value - 0.7).abs() < 1e-12);
        assert_eq!(attribute_trigger(&BTreeMap::new(), &BTreeMap::new()).0, "market");
    }

    #[test]
    fn rising_volatility_in_broken_phase_predicts_transition() {
        let mut f = field();
        f.update(&[0.3], &[], 0.05, &chains(&[0.3; 4]));
        let (p, phase) = f.predict_transition(0.05, 0.0);
        assert_eq!(phase, MarketPhase::Transition);
        assert!(p > 0.5 && p <= 0.9);
    }

    #[test]
    fn falling_volatility_near_symmetric_predicts_breaking_by_momentum() {
        let mut f = field();
        f.update(&[0.0], &[], 0.40, &chains(&[0.0; 4]));
        assert_eq!(f.predict_transition(-0.05, -0.1).1, MarketPhase::BrokenBearish);
        assert_eq!(f.predict_transition(-0.05, 0.1).1, MarketPhase::BrokenBullish);
    }

    #[test]
    fn flat_trends_default_to_low_probability_symmetric() {
        let f = field();
        let (p, phase) = f.predict_transition(0.0, 0.0);
        assert_eq!(phase, MarketPhase::Symmetric);
        assert!((p - 0.1).abs() < 1e-12);
    }
}
