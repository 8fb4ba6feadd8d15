// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Node Pool
//
// Owns every node. A node id lives in exactly one of the two maps; moving
// between them is the only way a node changes lifecycle state.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::node::{NexusNode, Specialization};

#[derive(Debug, Clone)]
pub struct NodePool {
    active: BTreeMap<String, NexusNode>,
    hibernating: BTreeMap<String, NexusNode>,
    max_active: usize,
    max_total: usize,
}

impl NodePool {
    pub fn new(max_active: usize, max_total: usize) -> Self {
        Self {
            active: BTreeMap::new(),
            hibernating: BTreeMap::new(),
            max_active,
            max_total,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn hibernating_count(&self) -> usize {
        self.hibernating.len()
    }

    pub fn total_count(&self) -> usize {
        self.active.len() + self.hibernating.len()
    }

    pub fn active(&self) -> impl Iterator<Item = &NexusNode> {
        self.active.values()
    }

    /// Active nodes in id order, mutably.
    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut NexusNode> {
        self.active.values_mut()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active.contains_key(id) || self.hibernating.contains_key(id)
    }

    /// Add a fresh active node. `None` once either capacity is reached or
    /// the id is already taken.
    pub fn spawn(&mut self, id: String, specialization: Specialization, now: DateTime<Utc>) -> Option<&NexusNode> {
        if self.total_count() >= self.max_total || self.active.len() >= self.max_active || self.contains(&id) {
            return None;
        }
        let node = NexusNode::new(id.clone(), specialization, now);
        Some(self.active.entry(id).or_insert(node))
    }

    pub fn hibernate(&mut self, id: &str) -> bool {
        match self.active.remove(id) {
            Some(mut node) => {
                node.hibernate();
                self.hibernating.insert(node.id.clone(), node);
                true
            }
            None => false,
        }
    }

    pub fn wake(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        if self.active.len() >= self.max_active {
            return false;
        }
        match self.hibernating.remove(id) {
            Some(mut node) => {
                node.wake(now);
                self.active.insert(node.id.clone(), node);
                true
            }
            None => false,
        }
    }

    /// Active ids ordered by ascending energy (ties by id).
    pub fn active_by_energy(&self) -> Vec<String> {
        by_energy(&self.active)
    }

    /// Hibernating ids ordered by descending energy (ties by id).
    pub fn hibernating_by_energy_desc(&self) -> Vec<String> {
        let mut ids = by_energy(&self.hibernating);
        ids.reverse();
        ids
    }

    /// Active nodes whose last activity is older than `cutoff`.
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.active
            .values()
            .filter(|n| n.last_active < cutoff)
            .map(|n| n.id.clone())
            .collect()
    }

    pub(crate) fn check_disjoint(&self) -> bool {
        self.active.keys().all(|k| !self.hibernating.contains_key(k))
    }
}

fn by_energy(nodes: &BTreeMap<String, NexusNode>) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = nodes.iter().map(|(id, n)| (id, n.energy)).collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().map(|(id, _)| id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketPhase;

    fn spawn_n(pool: &mut NodePool, n: usize) {
        let now = Utc::now();
        for i in 0..n {
            pool.spawn(format!("node-{:08x}", i), Specialization::Generalist, now);
        }
    }

    #[test]
    fn spawn_respects_caps() {
        let mut pool = NodePool::new(3, 4);
        spawn_n(&mut pool, 10);
        assert_eq!(pool.active_count(), 3);
        assert!(pool.hibernate("node-00000000"));
        assert!(pool.spawn("node-extra".into(), Specialization::Momentum, Utc::now()).is_some());
        assert_eq!(pool.total_count(), 4);
        assert!(pool.hibernate("node-00000001"));
        assert!(pool.spawn("node-over".into(), Specialization::Momentum, Utc::now()).is_none());
    }

    #[test]
    fn hibernate_and_wake_keep_maps_disjoint() {
        let mut pool = NodePool::new(10, 20);
        spawn_n(&mut pool, 6);
        for id in ["node-00000001", "node-00000003", "node-00000001"] {
            pool.hibernate(id);
            assert!(pool.check_disjoint());
            assert_eq!(pool.total_count(), pool.active_count() + pool.hibernating_count());
        }
        assert_eq!(pool.hibernating_count(), 2);
        assert!(pool.wake("node-00000003", Utc::now()));
        assert!(!pool.wake("node-00000003", Utc::now()));
        assert!(pool.check_disjoint());
        assert_eq!(pool.total_count(), 6);
    }

    #[test]
    fn energy_ordering() {
        let mut pool = NodePool::new(10, 20);
        spawn_n(&mut pool, 3);
        let now = Utc::now();
        for node in pool.active_mut() {
            if node.id == "node-00000002" {
                for _ in 0..5 {
                    node.process(&[0.1], MarketPhase::Symmetric, now);
                }
            }
        }
        assert_eq!(pool.active_by_energy()[0], "node-00000002");
    }
}
