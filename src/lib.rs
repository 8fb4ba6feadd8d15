// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine

pub mod types;
pub mod config;
pub mod error;
pub mod clock;
pub mod field;
pub mod phase;
pub mod swarm;
pub mod arbiter;
pub mod narrative;
pub mod nexus;

mod stats;

pub use types::*;
pub use config::{ArbiterConfig, FieldConfig, NexusConfig, PhaseConfig, PhaseWeights, SwarmConfig, WeightTable};
pub use error::{NexusError, Result};
pub use clock::{Clock, ManualClock, SystemClock};
pub use field::{FieldDynamics, FieldPotential, FieldState, SymmetryBreakingEvent};
pub use phase::{PhaseDetector, PhaseState, PhaseTransition, UpstreamSignals};
pub use swarm::{CollectiveOpinion, SwarmCoordinator, SwarmMetrics};
pub use arbiter::{ArbitratedSignal, EngineContribution, SignalArbiter};
pub use narrative::InsightSummary;
pub use nexus::{HealthReport, InsightRecord, Nexus, NexusInsight, PhaseChangeEvent, SharedNexus};

use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

/// Browser-facing handle. Payloads cross the boundary as plain JS objects.
#[wasm_bindgen]
pub struct NexusHandle {
    inner: Nexus,
}

fn to_js_error(err: NexusError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> std::result::Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
impl NexusHandle {
    /// `config` may be `undefined`/`null` for defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> std::result::Result<NexusHandle, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config: NexusConfig = if config.is_null() || config.is_undefined() {
            NexusConfig::default()
        } else {
            from_js(config)?
        };
        let inner = Nexus::new(config).map_err(to_js_error)?;
        log(&format!("nexus ready, {} nodes", inner.swarm().pool().active_count()));
        Ok(Self { inner })
    }

    /// One tick. Returns the flat insight record.
    pub fn analyze(&mut self, echo: JsValue, singularity: JsValue, market: JsValue) -> std::result::Result<JsValue, JsValue> {
        let echo: serde_json::Value = from_js(echo)?;
        let singularity: serde_json::Value = from_js(singularity)?;
        let market: serde_json::Value = from_js(market)?;
        let insight = self
            .inner
            .analyze_json(&echo, &singularity, &market)
            .map_err(to_js_error)?;
        Ok(serde_wasm_bindgen::to_value(&insight.to_record()).unwrap_or(JsValue::NULL))
    }

    pub fn health(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.inner.get_health()).unwrap_or(JsValue::NULL)
    }

    pub fn current_phase(&self) -> String {
        self.inner.get_current_phase().as_str().to_string()
    }

    pub fn recent_insights(&self, n: usize) -> JsValue {
        let records: Vec<InsightRecord> = self
            .inner
            .get_recent_insights(n)
            .iter()
            .map(NexusInsight::to_record)
            .collect();
        serde_wasm_bindgen::to_value(&records).unwrap_or(JsValue::NULL)
    }

    pub fn stop(&mut self) {
        self.inner.stop();
    }
}
