// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Rolling Window Statistics

use std::collections::VecDeque;

/// Push onto a bounded window, evicting the oldest sample once `cap` is
/// exceeded.
pub(crate) fn push_and_trim<T>(window: &mut VecDeque<T>, value: T, cap: usize) {
    window.push_back(value);
    while window.len() > cap {
        window.pop_front();
    }
}

pub(crate) fn mean<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, n) = values
        .into_iter()
        .fold((0.0_f64, 0usize), |(s, n), v| (s + *v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Population variance.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Last `n` samples of a window, oldest first.
pub(crate) fn tail(window: &VecDeque<f64>, n: usize) -> Vec<f64> {
    let skip = window.len().saturating_sub(n);
    window.iter().skip(skip).copied().collect()
}

/// Mean of the newer half minus mean of the older half over the last
/// `lookback` samples. Zero until at least `min_samples` are available.
pub(crate) fn half_trend(window: &VecDeque<f64>, lookback: usize, min_samples: usize) -> f64 {
    let recent = tail(window, lookback);
    if recent.len() < min_samples.max(2) {
        return 0.0;
    }
    let mid = recent.len() / 2;
    mean(&recent[mid..]) - mean(&recent[..mid])
}

/// Replace non-finite values with `fallback`.
pub(crate) fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_trim_keeps_newest() {
        let mut w = VecDeque::new();
        for i in 0..15 {
            push_and_trim(&mut w, i as f64, 10);
        }
        assert_eq!(w.len(), 10);
        assert_eq!(w.front().copied(), Some(5.0));
        assert_eq!(w.back().copied(), Some(14.0));
    }

    #[test]
    fn std_dev_of_constant_is_zero() {
        assert!(std_dev(&[0.4, 0.4, 0.4]).abs() < 1e-12);
        assert!((std_dev(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn half_trend_detects_rise() {
        let w: VecDeque<f64> = (0..8).map(|i| i as f64 * 0.1).collect();
        assert!(half_trend(&w, 8, 4) > 0.0);
        assert_eq!(half_trend(&w, 8, 10), 0.0);
    }

    #[test]
    fn finite_or_guards_nan() {
        assert_eq!(finite_or(f64::NAN, 0.5), 0.5);
        assert_eq!(finite_or(0.7, 0.5), 0.7);
    }
}
