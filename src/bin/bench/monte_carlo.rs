// Monte Carlo Infrastructure - N runs per scenario with statistical aggregation
// Run i uses seed base+i for both the market noise and the engine itself

use chrono::Duration;
use nexus_engine::swarm::SharedResourceMonitor;
use nexus_engine::{ManualClock, MarketPhase, Nexus, NexusConfig, RiskLevel};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::market::MarketGenerator;
use crate::report::*;
use crate::scenarios::Scenario;
use crate::time_series::{TickSnapshot, TimeSeriesRecorder};

use std::time::Instant;

/// Quiet host reading used when a scenario has no CPU curve.
const IDLE_CPU_PERCENT: f64 = 30.0;
const IDLE_RAM_GB: f64 = 1.0;

/// Run a single scenario iteration with a specific seed.
pub fn run_single(
    scenario: &Scenario,
    seed: u64,
    time_series_dir: Option<&std::path::Path>,
) -> Result<BenchResult, nexus_engine::NexusError> {
    let start = Instant::now();

    let clock = ManualClock::default();
    let monitor = SharedResourceMonitor::new(IDLE_CPU_PERCENT, IDLE_RAM_GB);
    let config = NexusConfig { seed, ..NexusConfig::default() };
    let mut nexus = Nexus::with_parts(config, Box::new(clock.clone()), Box::new(monitor.clone()))?;
    let check_every = Duration::seconds(nexus.config().swarm.resource_check_interval_secs.max(1));

    let mut market = MarketGenerator::new(ChaCha8Rng::seed_from_u64(seed), scenario.noise);
    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new());

    let mut phases_seen = vec![nexus.get_current_phase()];
    let mut phase_changes = 0u32;
    let mut symmetry_events = 0u32;
    let mut strong_actions = 0u32;
    let mut phase_adjusted = 0u32;
    let mut high_risk_ticks = 0u32;
    let mut confidence_sum = 0.0;
    let mut strength_sum = 0.0;
    let mut min_active = usize::MAX;
    let mut max_active = 0usize;
    let mut max_hibernating = 0usize;
    let mut final_phase = MarketPhase::Symmetric;

    for tick in 0..scenario.ticks {
        let cpu = scenario.cpu_curve.map(|c| c(tick)).unwrap_or(IDLE_CPU_PERCENT);
        monitor.set(cpu, IDLE_RAM_GB);

        let sentiment = (scenario.sentiment_curve)(tick);
        let volatility = (scenario.volatility_curve)(tick);
        let data = market.generate_tick(sentiment, volatility);
        let (echo, singularity) = (scenario.upstream_curve)(tick);

        let insight = nexus.analyze(&echo, &singularity, &data)?;

        let phase = insight.phase_state.current_phase;
        if insight.phase_state.changed {
            phase_changes += 1;
        }
        if !phases_seen.contains(&phase) {
            phases_seen.push(phase);
        }
        if insight.symmetry_breaking.is_some() {
            symmetry_events += 1;
        }
        if insight.signal.action.is_strong() {
            strong_actions += 1;
        }
        if insight.signal.phase_adjusted {
            phase_adjusted += 1;
        }
        if insight.risk_level >= RiskLevel::High {
            high_risk_ticks += 1;
        }
        confidence_sum += insight.signal.confidence;
        strength_sum += insight.signal.strength.abs();
        min_active = min_active.min(insight.swarm.active_nodes);
        max_active = max_active.max(insight.swarm.active_nodes);
        max_hibernating = max_hibernating.max(insight.swarm.hibernating_nodes);
        final_phase = phase;

        if let Some(ts) = time_series.as_mut() {
            ts.record(TickSnapshot::from_insight(tick, sentiment, volatility, &insight));
        }

        // One resource cycle per tick.
        clock.advance(check_every);
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{}.jsonl", seed));
        if let Err(e) = ts.write_jsonl(&path) {
            eprintln!("  Warning: failed to write time series: {}", e);
        }
    }

    let elapsed = start.elapsed();
    let elapsed_secs = elapsed.as_secs_f64().max(0.001);
    let ticks = scenario.ticks.max(1) as f64;

    // Evaluate pass/fail
    let criteria = &scenario.criteria;
    let mut failures = Vec::new();
    if let Some(phase) = criteria.must_visit {
        if !phases_seen.contains(&phase) {
            failures.push(format!("never reached {}", phase));
        }
    }
    if let Some(allowed) = criteria.final_phase_in {
        if !allowed.contains(&final_phase) {
            failures.push(format!("ended in {}", final_phase));
        }
    }
    if let Some(max) = criteria.max_strong_actions {
        if strong_actions > max {
            failures.push(format!("{} strong actions (max {})", strong_actions, max));
        }
    }
    if criteria.require_hibernation && max_hibernating == 0 {
        failures.push("swarm never hibernated".to_string());
    }
    if let Some(min) = criteria.min_phase_changes {
        if phase_changes < min {
            failures.push(format!("{} phase changes (min {})", phase_changes, min));
        }
    }
    if let Some(max) = criteria.max_phase_changes {
        if phase_changes > max {
            failures.push(format!("{} phase changes (max {})", phase_changes, max));
        }
    }

    Ok(BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass: failures.is_empty(),
        failures,
        ticks: scenario.ticks,
        final_phase,
        phases_seen,
        phase_changes,
        symmetry_events,
        strong_actions,
        phase_adjusted,
        mean_confidence: confidence_sum / ticks,
        mean_abs_strength: strength_sum / ticks,
        high_risk_ticks,
        min_active_nodes: if min_active == usize::MAX { 0 } else { min_active },
        max_active_nodes: max_active,
        max_hibernating_nodes: max_hibernating,
        elapsed_ms: elapsed.as_millis(),
        throughput_per_sec: scenario.ticks as f64 / elapsed_secs,
    })
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    n_runs: usize,
    base_seed: u64,
    time_series_base: Option<&std::path::Path>,
) -> Result<MonteCarloReport, nexus_engine::NexusError> {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));

    let mut results = Vec::with_capacity(n_runs);
    for i in 0..n_runs {
        let seed = base_seed + i as u64;
        results.push(run_single(scenario, seed, ts_dir.as_deref())?);
    }

    Ok(aggregate(scenario, results))
}

fn stat_of<F: Fn(&BenchResult) -> f64>(results: &[BenchResult], f: F) -> Stats {
    Stats::from_samples(&results.iter().map(f).collect::<Vec<_>>())
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate: if n == 0 { 0.0 } else { passed as f64 / n as f64 },
        phase_changes: stat_of(&results, |r| r.phase_changes as f64),
        symmetry_events: stat_of(&results, |r| r.symmetry_events as f64),
        strong_actions: stat_of(&results, |r| r.strong_actions as f64),
        phase_adjusted: stat_of(&results, |r| r.phase_adjusted as f64),
        mean_confidence: stat_of(&results, |r| r.mean_confidence),
        high_risk_ticks: stat_of(&results, |r| r.high_risk_ticks as f64),
        min_active_nodes: stat_of(&results, |r| r.min_active_nodes as f64),
        elapsed_ms: stat_of(&results, |r| r.elapsed_ms as f64),
        throughput_per_sec: stat_of(&results, |r| r.throughput_per_sec),
        individual_runs: results,
    }
}
