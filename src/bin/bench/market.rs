// Noisy Market Generator - seedable per-location / per-chain sentiment
// Scenario curves give the regime; each observable gets Gaussian noise around it

use nexus_engine::MarketData;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub const LOCATIONS: [&str; 6] = ["us-east", "us-west", "eu-central", "uk", "apac-sg", "apac-jp"];
pub const CHAINS: [&str; 4] = ["ethereum", "solana", "arbitrum", "base"];

/// Relative jitter applied to the volatility reading itself.
const VOLATILITY_JITTER: f64 = 0.1;

pub struct MarketGenerator {
    rng: ChaCha8Rng,
    noise: f64,
    pub ticks_generated: u64,
}

impl MarketGenerator {
    pub fn new(rng: ChaCha8Rng, noise: f64) -> Self {
        Self { rng, noise: noise.max(0.0), ticks_generated: 0 }
    }

    /// One tick of observables centred on `sentiment` and `volatility`.
    pub fn generate_tick(&mut self, sentiment: f64, volatility: f64) -> MarketData {
        let mut data = MarketData::default();
        for loc in LOCATIONS {
            let v = sentiment + self.noise * gaussian(&mut self.rng);
            data.location_sentiments.insert(loc.to_string(), v.clamp(-1.0, 1.0));
        }
        for chain in CHAINS {
            let v = sentiment + self.noise * gaussian(&mut self.rng);
            data.chain_sentiments.insert(chain.to_string(), v.clamp(-1.0, 1.0));
        }
        let jitter = 1.0 + VOLATILITY_JITTER * gaussian(&mut self.rng);
        data.volatility = (volatility * jitter).max(0.0);
        self.ticks_generated += 1;
        data
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
