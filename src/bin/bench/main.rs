// Nexus Benchmark Runner - scenario sweep over the full analysis pipeline
// Monte Carlo (N=10), seeded market noise, seeded swarm, per-tick audit trail
//
// Usage:
//   cargo run --release --bin bench                     # Run all scenarios (10 runs each)
//   cargo run --release --bin bench -- --runs 3         # Quick mode
//   cargo run --release --bin bench -- CHAOS            # Filter by name
//   cargo run --release --bin bench -- --time-series    # Enable JSONL output
//   cargo run --release --bin bench -- --seed 42        # Custom base seed

mod market;
mod monte_carlo;
mod report;
mod scenarios;
mod time_series;

use report::*;
use scenarios::*;
use std::time::Instant;

const PASS_RATE_REQUIRED: f64 = 0.9;

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    time_series: bool,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 10,
        seed: 0,
        time_series: false,
        filter: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(10);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            "--time-series" => {
                cli.time_series = true;
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios.iter()
                .filter(|s| s.name.to_lowercase().contains(&f_lower)
                          || s.label.to_lowercase().contains(&f_lower)
                          || s.category.to_lowercase().contains(&f_lower))
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    let ts_dir = if cli.time_series {
        Some(std::path::Path::new("benchmark-results/time-series").to_path_buf())
    } else {
        None
    };

    println!("\n  Nexus Benchmark Runner v{}", env!("CARGO_PKG_VERSION"));
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!("  {:<42} {:>5} {:>9} {:>8} {:>8} {:>7} {:>7}",
        "Scenario", "Pass%", "Changes", "Strong", "Conf", "MinAct", "Time");
    println!("  {}", "-".repeat(94));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(scenario, cli.runs, cli.seed, ts_dir.as_deref())?;

        let pass_pct = report.pass_rate * 100.0;
        let status = if report.pass_rate >= PASS_RATE_REQUIRED { "PASS" } else { "FAIL" };

        println!("  {:<42} {:>4}% {:>5.1}±{:<3.1} {:>8.1} {:>8.2} {:>7.0} {:>5.0}ms  {}",
            report.label,
            pass_pct as u32,
            report.phase_changes.mean, report.phase_changes.half_width(),
            report.strong_actions.mean,
            report.mean_confidence.mean,
            report.min_active_nodes.min,
            report.elapsed_ms.mean,
            status,
        );
        if report.pass_rate < PASS_RATE_REQUIRED {
            if let Some(run) = report.individual_runs.iter().find(|r| !r.pass) {
                println!("      seed {}: {}", run.seed, run.failures.join("; "));
            }
        }

        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= PASS_RATE_REQUIRED).count();
    let failed = total - passed;

    println!("  {}", "-".repeat(94));
    println!("  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total, passed, failed, suite_elapsed.as_secs_f64());

    // ─── Write JSON Report ──────────────────────────────────────────────

    let timestamp = chrono::Utc::now().timestamp_millis().to_string();

    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        n_runs_per_scenario: cli.runs,
        summary: Summary {
            total,
            passed,
            failed,
            pass_rate: passed as f64 / total as f64,
        },
        scenarios: mc_reports,
    };

    let dir = std::path::Path::new("benchmark-results");
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("bench-{}.json", timestamp));
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    println!("  Results saved to: {}\n", path.display());

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
