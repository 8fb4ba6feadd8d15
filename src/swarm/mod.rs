// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Swarm

//! In-process worker swarm: node lifecycle, resource-bounded pool scaling
//! and collective opinion.

pub mod coordinator;
pub mod node;
pub mod pool;
pub mod resources;

pub use coordinator::{CollectiveOpinion, ResourceCheck, ScaleDecision, SwarmCoordinator, SwarmMetrics};
pub use node::{NexusNode, Specialization};
pub use pool::NodePool;
pub use resources::{FixedResourceMonitor, ProcResourceMonitor, ResourceMonitor, ResourceSample, SharedResourceMonitor};
